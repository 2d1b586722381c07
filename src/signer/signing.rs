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

use crate::{
    crypto::{HashAlgorithm, SigningKey},
    header::FieldName,
    message_hash::{self, BodyHash, DKIM_SIGNATURE_NAME},
    signer::{
        config::KeyConfig,
        format::{self, UnsignedDkimSignature},
        SigningError,
    },
};
use tracing::trace;

/// Converts a signing domain to its ASCII (A-label) form.
pub fn domain_to_ascii(name: &str) -> Result<String, SigningError> {
    let name = name.trim();
    let name = name.strip_suffix('.').unwrap_or(name);

    if name.is_empty() {
        return Err(SigningError::InvalidDomain);
    }

    let ascii = idna::domain_to_ascii(name).map_err(|_| SigningError::InvalidDomain)?;

    if ascii.is_empty() || ascii.split('.').any(|label| label.is_empty()) {
        return Err(SigningError::InvalidDomain);
    }

    Ok(ascii)
}

/// Produces the complete *DKIM-Signature* header for one key, without a
/// final line terminator.
///
/// `canonicalized_headers` are the canonicalised selected header fields,
/// `signed_headers` the names of the fields actually present, in order.
pub fn sign_header(
    key: &KeyConfig,
    hash_alg: HashAlgorithm,
    canonicalized_headers: &[u8],
    signed_headers: &[FieldName],
    body_hash: &BodyHash,
) -> Result<String, SigningError> {
    let domain = domain_to_ascii(&key.domain_name)?;

    let signing_key = SigningKey::from_pem(&key.private_key).map_err(|e| {
        trace!(domain = %domain, selector = %key.key_selector, "cannot read signing key: {e}");
        SigningError::InvalidKey
    })?;

    let sig = UnsignedDkimSignature {
        hash_alg,
        domain: &domain,
        selector: &key.key_selector,
        body_hash,
        signed_headers,
    };

    let mut formatted_header = sig.format_without_signature();

    // the value follows "DKIM-Signature:"
    let header_value = &formatted_header[(DKIM_SIGNATURE_NAME.len() + 1)..];

    let data_hash = message_hash::compute_data_hash(
        hash_alg,
        canonicalized_headers.to_vec(),
        DKIM_SIGNATURE_NAME,
        header_value,
    );

    let signature_data = signing_key
        .sign(hash_alg, &data_hash)
        .map_err(|_| SigningError::SigningFailure)?;

    format::append_signature_data(&mut formatted_header, &signature_data);

    Ok(formatted_header)
}
