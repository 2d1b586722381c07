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

//! Cryptographic utilities.
//!
//! Only RSA keys are supported for signing: the signature header always
//! carries an `rsa-<hash>` algorithm. Keys are read from PEM text, in PKCS#8
//! or PKCS#1 format.

mod hash;
mod rsa;

pub use self::{
    hash::{digest, digest_slices, CountingHasher},
    rsa::{read_rsa_private_key, sign_rsa},
};

use crate::util::CanonicalStr;
use ::rsa::RsaPrivateKey;
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// A private key usable for signing.
#[derive(Debug)]
pub struct SigningKey(RsaPrivateKey);

impl SigningKey {
    /// Reads a signing key from a PEM document.
    pub fn from_pem(s: &str) -> Result<Self, KeyError> {
        read_rsa_private_key(s).map(Self)
    }

    /// Signs the digest of some message data.
    pub fn sign(&self, hash_alg: HashAlgorithm, msg_digest: &[u8]) -> Result<Vec<u8>, KeyError> {
        sign_rsa(hash_alg, &self.0, msg_digest).map_err(|_| KeyError::SigningFailure)
    }
}

impl AsRef<RsaPrivateKey> for SigningKey {
    fn as_ref(&self) -> &RsaPrivateKey {
        &self.0
    }
}

/// An error that occurs when reading or using a private key.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyError {
    NotPem,
    UnsupportedKeyType,
    InvalidKey,
    SigningFailure,
}

impl Display for KeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPem => write!(f, "not a PEM document"),
            Self::UnsupportedKeyType => write!(f, "unsupported key type"),
            Self::InvalidKey => write!(f, "invalid private key"),
            Self::SigningFailure => write!(f, "signing failed"),
        }
    }
}

impl Error for KeyError {}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    #[cfg(feature = "pre-rfc8301")]
    Sha1,
}

impl HashAlgorithm {
    pub fn all() -> Vec<Self> {
        let mut algs = vec![Self::Sha256];
        #[cfg(feature = "pre-rfc8301")]
        algs.push(Self::Sha1);
        algs
    }
}

impl CanonicalStr for HashAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            #[cfg(feature = "pre-rfc8301")]
            Self::Sha1 => "sha1",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseHashAlgorithmError;

impl Display for ParseHashAlgorithmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported hash algorithm")
    }
}

impl Error for ParseHashAlgorithmError {}

impl FromStr for HashAlgorithm {
    type Err = ParseHashAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::all()
            .into_iter()
            .find(|alg| alg.canonical_str().eq_ignore_ascii_case(s))
            .ok_or(ParseHashAlgorithmError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_algorithm_from_str() {
        assert_eq!("sha256".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha256));
        assert_eq!(" SHA256".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha256));
        assert_eq!("md5".parse::<HashAlgorithm>(), Err(ParseHashAlgorithmError));
        #[cfg(not(feature = "pre-rfc8301"))]
        assert_eq!("sha1".parse::<HashAlgorithm>(), Err(ParseHashAlgorithmError));
    }
}
