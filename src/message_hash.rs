// streamdkim – streaming DKIM signer
// Copyright © 2023 The streamdkim authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! Computation of the message hashes.

use crate::{
    canonicalize::{self, BodyCanonicalizer},
    crypto::{self, CountingHasher, HashAlgorithm},
    util,
};

/// The name of the signature header, as used in the header hash.
pub const DKIM_SIGNATURE_NAME: &str = "DKIM-Signature";

/// Computes the hash of the data to be signed: the canonicalised selected
/// header fields, followed by the canonicalised signature header itself
/// (with an empty *b=* tag value and without a final line terminator).
pub fn compute_data_hash(
    hash_alg: HashAlgorithm,
    mut canonicalized_headers: Vec<u8>,
    dkim_sig_header_name: &str,
    formatted_dkim_sig_header_value: &str,
) -> Box<[u8]> {
    debug_assert!(dkim_sig_header_name.eq_ignore_ascii_case(DKIM_SIGNATURE_NAME));

    canonicalize::canonicalize_header(
        &mut canonicalized_headers,
        dkim_sig_header_name,
        formatted_dkim_sig_header_value.as_bytes(),
    );

    crypto::digest(hash_alg, &canonicalized_headers)
}

/// The result of hashing the canonicalised body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BodyHash {
    pub hash_alg: HashAlgorithm,
    pub digest: Box<[u8]>,
    /// The length of the canonicalised body.
    pub length: u64,
}

impl BodyHash {
    /// Returns the Base64 form used in the *bh=* tag.
    pub fn to_base64(&self) -> String {
        util::encode_base64(&self.digest)
    }
}

/// A producer of the canonical body and its hash.
///
/// Each chunk is canonicalised and digested; the canonical bytes are handed
/// back to the caller for further processing and are not retained here.
pub struct BodyHasher {
    hash_alg: HashAlgorithm,
    canonicalizer: BodyCanonicalizer,
    hasher: CountingHasher,
}

impl BodyHasher {
    pub fn new(hash_alg: HashAlgorithm, normalize_line_endings: bool) -> Self {
        let canonicalizer = if normalize_line_endings {
            BodyCanonicalizer::relaxed_normalizing()
        } else {
            BodyCanonicalizer::relaxed()
        };

        Self {
            hash_alg,
            canonicalizer,
            hasher: CountingHasher::new(hash_alg),
        }
    }

    pub fn hash_chunk(&mut self, chunk: &[u8]) -> Vec<u8> {
        let canonicalized_chunk = self.canonicalizer.canonicalize_chunk(chunk);
        self.hasher.update(&canonicalized_chunk);
        canonicalized_chunk
    }

    /// Finishes canonicalisation. Returns the final piece of canonical body,
    /// which is never empty, and the body hash.
    pub fn finish(self) -> (Vec<u8>, BodyHash) {
        let Self { hash_alg, canonicalizer, mut hasher } = self;

        let final_chunk = canonicalizer.finish();
        hasher.update(&final_chunk);

        let (digest, length) = hasher.finish();

        (final_chunk, BodyHash { hash_alg, digest, length })
    }
}
