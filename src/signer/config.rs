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
    cache::DEFAULT_CACHE_THRESHOLD,
    crypto::HashAlgorithm,
    header::FieldName,
};
use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    path::PathBuf,
};

/// The signing domain, selector and private key for one signature.
#[derive(Clone, Eq, PartialEq)]
pub struct KeyConfig {
    /// The signing domain to use in the *d=* tag. Internationalised domain
    /// names are converted to ASCII form.
    pub domain_name: String,
    /// The selector to use in the *s=* tag.
    pub key_selector: String,
    /// The RSA private key, as a PKCS#8 or PKCS#1 PEM document.
    pub private_key: String,
}

impl KeyConfig {
    pub fn new(
        domain_name: impl Into<String>,
        key_selector: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            domain_name: domain_name.into(),
            key_selector: key_selector.into(),
            private_key: private_key.into(),
        }
    }
}

impl Debug for KeyConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("domain_name", &self.domain_name)
            .field("key_selector", &self.key_selector)
            .finish_non_exhaustive()
    }
}

/// Signing options.
///
/// All fields are optional. Options can be layered with
/// [`SignOptions::merge_absent`]: a field set in the base is never replaced,
/// a field absent from the base is taken from the other options. This is a
/// shallow merge; in particular `keys` is taken over as a whole.
///
/// When resolved, `keys` takes precedence over the single key given with
/// `domain_name`, `key_selector` and `private_key`.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct SignOptions {
    pub domain_name: Option<String>,
    pub key_selector: Option<String>,
    pub private_key: Option<String>,
    /// One signature is produced for each key, in this order.
    pub keys: Option<Vec<KeyConfig>>,
    /// The hash algorithm name, `sha256` by default.
    pub hash_algo: Option<String>,
    /// Colon-separated names of the header fields to sign. By default the
    /// fields suggested in RFC 6376, section 5.4.1 are signed.
    pub header_field_names: Option<String>,
    /// Colon-separated names of header fields never to sign.
    pub skip_fields: Option<String>,
    /// Directory for temporary files; enables spilling large bodies to disk.
    pub cache_dir: Option<PathBuf>,
    /// Body bytes kept in memory before spilling to disk, 2 MiB by default.
    pub cache_threshold: Option<usize>,
    /// Whether to rewrite bare LF line endings in the body to CRLF. The
    /// default is to keep each line's terminator as found.
    pub normalize_line_endings: Option<bool>,
}

impl Debug for SignOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignOptions")
            .field("domain_name", &self.domain_name)
            .field("key_selector", &self.key_selector)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("keys", &self.keys)
            .field("hash_algo", &self.hash_algo)
            .field("header_field_names", &self.header_field_names)
            .field("skip_fields", &self.skip_fields)
            .field("cache_dir", &self.cache_dir)
            .field("cache_threshold", &self.cache_threshold)
            .field("normalize_line_endings", &self.normalize_line_endings)
            .finish()
    }
}

impl SignOptions {
    /// Options signing with a single key.
    pub fn with_key(
        domain_name: impl Into<String>,
        key_selector: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            domain_name: Some(domain_name.into()),
            key_selector: Some(key_selector.into()),
            private_key: Some(private_key.into()),
            ..Default::default()
        }
    }

    /// Options signing with several keys.
    pub fn with_keys(keys: impl IntoIterator<Item = KeyConfig>) -> Self {
        Self {
            keys: Some(keys.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Fills every field absent from `self` with the value from `other`.
    pub fn merge_absent(self, other: SignOptions) -> Self {
        Self {
            domain_name: self.domain_name.or(other.domain_name),
            key_selector: self.key_selector.or(other.key_selector),
            private_key: self.private_key.or(other.private_key),
            keys: self.keys.or(other.keys),
            hash_algo: self.hash_algo.or(other.hash_algo),
            header_field_names: self.header_field_names.or(other.header_field_names),
            skip_fields: self.skip_fields.or(other.skip_fields),
            cache_dir: self.cache_dir.or(other.cache_dir),
            cache_threshold: self.cache_threshold.or(other.cache_threshold),
            normalize_line_endings: self.normalize_line_endings.or(other.normalize_line_endings),
        }
    }

    pub fn resolve(&self) -> Result<ResolvedOptions, ConfigError> {
        let keys = match (&self.keys, &self.domain_name, &self.key_selector, &self.private_key) {
            (Some(keys), ..) => keys.clone(),
            (None, Some(d), Some(s), Some(k)) => vec![KeyConfig::new(d, s, k)],
            _ => return Err(ConfigError::MissingKey),
        };

        if keys.is_empty() {
            return Err(ConfigError::MissingKey);
        }

        let hash_alg = match &self.hash_algo {
            Some(name) => name
                .parse()
                .map_err(|_| ConfigError::UnsupportedHashAlgorithm(name.clone()))?,
            None => HashAlgorithm::default(),
        };

        let signed = match &self.header_field_names {
            Some(names) => parse_field_names(names),
            None => default_signed_headers(),
        };
        let skipped = self.skip_fields.as_deref().map(parse_field_names).unwrap_or_default();

        let header_field_names = signed
            .into_iter()
            .filter(|name| !skipped.contains(name))
            .collect();

        Ok(ResolvedOptions {
            keys,
            hash_alg,
            header_field_names,
            cache_dir: self.cache_dir.clone(),
            cache_threshold: self.cache_threshold.unwrap_or(DEFAULT_CACHE_THRESHOLD),
            normalize_line_endings: self.normalize_line_endings.unwrap_or(false),
        })
    }
}

/// Signing options with all defaults applied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedOptions {
    pub keys: Vec<KeyConfig>,
    pub hash_alg: HashAlgorithm,
    /// Candidate header fields to sign, in order, without duplicates.
    pub header_field_names: Vec<FieldName>,
    pub cache_dir: Option<PathBuf>,
    pub cache_threshold: usize,
    pub normalize_line_endings: bool,
}

/// An error in the signing options.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Neither `keys` nor a complete single key is configured.
    MissingKey,
    UnsupportedHashAlgorithm(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey => write!(f, "no signing key configured"),
            Self::UnsupportedHashAlgorithm(name) => write!(f, "unsupported hash algorithm \"{name}\""),
        }
    }
}

impl Error for ConfigError {}

/// Parses a colon-separated list of header field names. Names are
/// lowercased, malformed and repeated names are dropped.
pub fn parse_field_names(s: &str) -> Vec<FieldName> {
    let mut names: Vec<FieldName> = vec![];
    for name in s.split(':').filter_map(|n| FieldName::new(n.trim()).ok()) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Returns the header fields signed by default.
///
/// These are the fields listed in RFC 6376, section 5.4.1 (the same list
/// appeared in RFC 4871, section 5.5).
pub fn default_signed_headers() -> Vec<FieldName> {
    let names = [
        "From",
        "Sender",
        "Reply-To",
        "Subject",
        "Date",
        "Message-ID",
        "To",
        "Cc",
        "MIME-Version",
        "Content-Type",
        "Content-Transfer-Encoding",
        "Content-ID",
        "Content-Description",
        "Resent-Date",
        "Resent-From",
        "Resent-Sender",
        "Resent-To",
        "Resent-Cc",
        "Resent-Message-ID",
        "In-Reply-To",
        "References",
        "List-Id",
        "List-Help",
        "List-Unsubscribe",
        "List-Subscribe",
        "List-Post",
        "List-Owner",
        "List-Archive",
    ];

    names
        .into_iter()
        .filter_map(|n| FieldName::new(n).ok())
        .collect()
}
