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

use crate::crypto::HashAlgorithm;
#[cfg(feature = "pre-rfc8301")]
use sha1::Sha1;
use sha2::Sha256;

/// Produces the digest of the given input slices.
pub fn digest_slices<I, T>(hash_alg: HashAlgorithm, slices: I) -> Box<[u8]>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    use ::digest::Digest;

    match hash_alg {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            for bytes in slices {
                hasher.update(bytes.as_ref());
            }
            Box::from(&hasher.finalize()[..])
        }
        #[cfg(feature = "pre-rfc8301")]
        HashAlgorithm::Sha1 => {
            let mut hasher = Sha1::new();
            for bytes in slices {
                hasher.update(bytes.as_ref());
            }
            Box::from(&hasher.finalize()[..])
        }
    }
}

pub fn digest(hash_alg: HashAlgorithm, bytes: &[u8]) -> Box<[u8]> {
    digest_slices(hash_alg, [bytes])
}

/// An incremental hasher that also counts the bytes it digested.
pub struct CountingHasher {
    digest: Box<dyn ::digest::DynDigest + Send>,
    bytes_written: u64,
}

impl CountingHasher {
    pub fn new(hash_alg: HashAlgorithm) -> Self {
        let digest: Box<dyn ::digest::DynDigest + Send> = match hash_alg {
            HashAlgorithm::Sha256 => Box::new(Sha256::default()),
            #[cfg(feature = "pre-rfc8301")]
            HashAlgorithm::Sha1 => Box::new(Sha1::default()),
        };

        Self {
            digest,
            bytes_written: 0,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
        self.bytes_written += bytes.len() as u64;
    }

    pub fn finish(self) -> (Box<[u8]>, u64) {
        (self.digest.finalize(), self.bytes_written)
    }
}
