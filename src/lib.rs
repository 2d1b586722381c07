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

//! A streaming signer for *DomainKeys Identified Mail* (DKIM) signatures as
//! described in [RFC 6376].
//!
//! Messages are read from an asynchronous input stream and written to an
//! asynchronous output stream. While the message is read, the body is
//! canonicalised with the *relaxed* body canonicalisation algorithm and
//! hashed incrementally. The canonical body is retained until all signatures
//! have been computed: in memory, or past a configurable threshold in a
//! temporary file. The output consists of one *DKIM-Signature* header per
//! signing key, the original header block byte for byte, and the canonical
//! body.
//!
//! Signatures always use the `rsa-sha256` algorithm (or `rsa-sha1`, see
//! below) and `relaxed/relaxed` canonicalisation.
//!
//! # Usage
//!
//! The type [`Signer`] is the entry point for signing. For messages held in
//! memory, the function [`sign`] is a shortcut.
//!
//! ```no_run
//! use streamdkim::{SignOptions, Signer};
//!
//! # async fn f() -> Result<(), Box<dyn std::error::Error>> {
//! let private_key = std::fs::read_to_string("private.pem")?;
//!
//! let signer = Signer::new(SignOptions::with_key("example.com", "sel1", private_key));
//!
//! let input = tokio::fs::File::open("message.eml").await?;
//! let output = tokio::fs::File::create("signed.eml").await?;
//!
//! let results = signer.sign(input, output).await?;
//!
//! for result in results {
//!     if let Err(e) = result.status {
//!         eprintln!("no signature for {}: {e}", result.domain_name);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Cargo features
//!
//! The feature **`pre-rfc8301`** enables dependency `sha1` and thereby the
//! insecure, historic SHA-1 hash algorithm, selected with hash algorithm name
//! `sha1`. This is a legacy compatibility feature, its use is strongly
//! discouraged.
//!
//! [RFC 6376]: https://www.rfc-editor.org/rfc/rfc6376

pub mod cache;
pub mod canonicalize;
pub mod crypto;
pub mod header;
pub mod message_hash;
pub mod signer;
pub mod split;
mod util;

pub use crate::{
    crypto::{HashAlgorithm, SigningKey},
    header::{FieldName, HeaderField, HeaderFields},
    signer::{
        domain_to_ascii, sign, ConfigError, KeyConfig, SignError, SignOptions, SignedMessage,
        Signer, SigningError, SigningResult,
    },
    util::{encode_base64, CanonicalStr},
};
