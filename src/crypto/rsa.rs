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

use crate::crypto::{HashAlgorithm, KeyError};
use pkcs8::{der::pem::PemLabel, Document, ObjectIdentifier, PrivateKeyInfo};
use rsa::{pkcs1::DecodeRsaPrivateKey, Pkcs1v15Sign, RsaPrivateKey};
#[cfg(feature = "pre-rfc8301")]
use sha1::Sha1;
use sha2::Sha256;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

const PKCS1_LABEL: &str = "RSA PRIVATE KEY";

/// Reads an RSA private key from a PEM document, either in PKCS#8 format
/// (`PRIVATE KEY`) or in PKCS#1 format (`RSA PRIVATE KEY`).
pub fn read_rsa_private_key(pem: &str) -> Result<RsaPrivateKey, KeyError> {
    let (label, der) = Document::from_pem(pem.trim()).map_err(|_| KeyError::NotPem)?;

    if label == PKCS1_LABEL {
        return RsaPrivateKey::from_pkcs1_der(der.as_bytes()).map_err(|_| KeyError::InvalidKey);
    }

    PrivateKeyInfo::validate_pem_label(label).map_err(|_| KeyError::NotPem)?;

    let pk = PrivateKeyInfo::try_from(der.as_bytes()).map_err(|_| KeyError::InvalidKey)?;

    if pk.algorithm.oid != RSA_ENCRYPTION {
        return Err(KeyError::UnsupportedKeyType);
    }

    RsaPrivateKey::try_from(pk).map_err(|_| KeyError::InvalidKey)
}

/// Signs a message digest using RSASSA-PKCS1-v1_5.
///
/// The signature scheme is deterministic: the same key and digest always yield
/// the same signature.
pub fn sign_rsa(
    hash_alg: HashAlgorithm,
    private_key: &RsaPrivateKey,
    msg_digest: &[u8],
) -> Result<Vec<u8>, rsa::Error> {
    match hash_alg {
        HashAlgorithm::Sha256 => private_key.sign(Pkcs1v15Sign::new::<Sha256>(), msg_digest),
        #[cfg(feature = "pre-rfc8301")]
        HashAlgorithm::Sha1 => private_key.sign(Pkcs1v15Sign::new::<Sha1>(), msg_digest),
    }
}
