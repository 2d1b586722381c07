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

//! Signer and supporting types.
//!
//! A [`Signer`] reads a message from an input stream and writes the signed
//! message to an output stream. The *DKIM-Signature* headers, one per key,
//! are placed before the original header block; the original header bytes
//! follow unchanged, and the body follows in relaxed canonical form.

mod config;
mod format;
mod signing;

pub use self::{
    config::{
        default_signed_headers, parse_field_names, ConfigError, KeyConfig, ResolvedOptions,
        SignOptions,
    },
    format::{fold_lines, LINE_WIDTH},
    signing::{domain_to_ascii, sign_header},
};

use crate::{
    cache::SpilloverCache,
    canonicalize,
    header::HeaderFields,
    message_hash::BodyHasher,
    split::{HeaderBodySplitter, Split},
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    io,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    task,
};
use tracing::{debug, trace, warn};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// An error that occurs while producing the signature for one key.
///
/// Such an error only affects the key concerned: its signature header is
/// omitted and signing continues with the other keys.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SigningError {
    InvalidDomain,
    /// The private key is unreadable or not an RSA key.
    InvalidKey,
    SigningFailure,
}

impl Display for SigningError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDomain => write!(f, "invalid signing domain"),
            Self::InvalidKey => write!(f, "unusable signing key"),
            Self::SigningFailure => write!(f, "failed to sign header data"),
        }
    }
}

impl Error for SigningError {}

/// An error that aborts a signing operation.
///
/// Once such an error has occurred, nothing further is written to the output.
#[derive(Debug)]
pub enum SignError {
    Config(ConfigError),
    /// Reading the input failed.
    Read(io::Error),
    /// Writing or reading back the cached body failed.
    Cache(io::Error),
    /// Writing the output failed.
    Write(io::Error),
}

impl Display for SignError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(_) => write!(f, "invalid signing options"),
            Self::Read(_) => write!(f, "failed to read message"),
            Self::Cache(_) => write!(f, "failed to cache message body"),
            Self::Write(_) => write!(f, "failed to write signed message"),
        }
    }
}

impl Error for SignError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Read(e) | Self::Cache(e) | Self::Write(e) => Some(e),
        }
    }
}

impl From<ConfigError> for SignError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error)
    }
}

/// The outcome of signing with one key.
#[derive(Debug, Eq, PartialEq)]
pub struct SigningResult {
    pub domain_name: String,
    pub key_selector: String,
    /// The complete *DKIM-Signature* header, without final line terminator.
    pub status: Result<String, SigningError>,
}

impl SigningResult {
    pub fn header(&self) -> Option<&str> {
        self.status.as_deref().ok()
    }
}

/// A signed message collected in memory.
#[derive(Debug, Eq, PartialEq)]
pub struct SignedMessage {
    pub message: Vec<u8>,
    pub results: Vec<SigningResult>,
}

/// A signer for email messages.
///
/// The signer holds the base options; they can be supplemented per call with
/// [`Signer::sign_with`]. A signer may be used for any number of messages,
/// also concurrently.
#[derive(Clone, Debug, Default)]
pub struct Signer {
    options: SignOptions,
}

impl Signer {
    pub fn new(options: SignOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SignOptions {
        &self.options
    }

    /// Signs the message read from `input`, writing the signed message to
    /// `output`.
    ///
    /// Returns the outcome for each key, in key order. Keys that fail are
    /// reported but do not fail the operation.
    pub async fn sign<R, W>(&self, input: R, output: W) -> Result<Vec<SigningResult>, SignError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.sign_with(input, output, SignOptions::default()).await
    }

    /// Like [`Signer::sign`], with additional options for this call only.
    ///
    /// The overrides only fill in options absent from the signer's options.
    pub async fn sign_with<R, W>(
        &self,
        input: R,
        output: W,
        overrides: SignOptions,
    ) -> Result<Vec<SigningResult>, SignError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let options = self.options.clone().merge_absent(overrides).resolve()?;

        sign_stream(&options, input, output).await
    }

    /// Signs a message held in memory.
    pub async fn sign_message(&self, message: impl AsRef<[u8]>) -> Result<SignedMessage, SignError> {
        let input = message.as_ref();

        let mut output = Vec::with_capacity(input.len() + 1024);
        let results = self.sign(input, &mut output).await?;

        Ok(SignedMessage {
            message: output,
            results,
        })
    }
}

/// Signs a message held in memory with the given options.
pub async fn sign(message: impl AsRef<[u8]>, options: SignOptions) -> Result<SignedMessage, SignError> {
    Signer::new(options).sign_message(message).await
}

async fn sign_stream<R, W>(
    options: &ResolvedOptions,
    mut input: R,
    mut output: W,
) -> Result<Vec<SigningResult>, SignError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    trace!(keys = options.keys.len(), "starting signing");

    let mut splitter = HeaderBodySplitter::new();
    let mut body_hasher = BodyHasher::new(options.hash_alg, options.normalize_line_endings);
    let mut cache = SpilloverCache::new(options.cache_dir.clone(), options.cache_threshold);
    let mut raw_headers = None;

    // On early return, dropping the cache removes any temporary file.

    let mut buf = vec![0; READ_BUFFER_SIZE];
    loop {
        let n = input.read(&mut buf).await.map_err(SignError::Read)?;
        if n == 0 {
            break;
        }

        let body = match splitter.push(&buf[..n]) {
            Split::Pending => None,
            Split::Boundary { headers, body } => {
                raw_headers = Some(headers);
                Some(body)
            }
            Split::Body(body) => Some(body),
        };

        if let Some(body) = body {
            let chunk = body_hasher.hash_chunk(body);
            if let Err(e) = cache.push(chunk).await {
                warn!("failed to cache message body, discarding rest of input: {e}");
                drain(&mut input).await;
                return Err(SignError::Cache(e));
            }
        }

        task::yield_now().await;
    }

    if let Some(headers) = splitter.finish() {
        raw_headers = Some(headers);
    }
    let raw_headers = raw_headers.unwrap_or_default();

    let (final_chunk, body_hash) = body_hasher.finish();
    cache.push(final_chunk).await.map_err(SignError::Cache)?;
    cache.seal().await.map_err(SignError::Cache)?;

    trace!(
        header_len = raw_headers.len(),
        body_len = body_hash.length,
        cached_len = cache.len(),
        on_disk = cache.is_on_disk(),
        "message read completely"
    );

    let headers = HeaderFields::parse(&raw_headers);
    let (canonicalized_headers, signed_headers) =
        canonicalize::canonicalize_headers(&headers, &options.header_field_names);

    let mut results = Vec::with_capacity(options.keys.len());

    for key in &options.keys {
        let status = signing::sign_header(
            key,
            options.hash_alg,
            &canonicalized_headers,
            &signed_headers,
            &body_hash,
        );

        match &status {
            Ok(_) => debug!(domain = %key.domain_name, selector = %key.key_selector, "signed message"),
            Err(e) => warn!(
                domain = %key.domain_name,
                selector = %key.key_selector,
                "skipping signature: {e}"
            ),
        }

        results.push(SigningResult {
            domain_name: key.domain_name.clone(),
            key_selector: key.key_selector.clone(),
            status,
        });

        task::yield_now().await;
    }

    let written = write_signed_message(&mut output, &results, &raw_headers, &cache).await;

    cache.remove().await;

    written.map(|()| results)
}

async fn write_signed_message<W>(
    output: &mut W,
    results: &[SigningResult],
    raw_headers: &[u8],
    cache: &SpilloverCache,
) -> Result<(), SignError>
where
    W: AsyncWrite + Unpin,
{
    for header in results.iter().filter_map(|r| r.header()) {
        output.write_all(header.as_bytes()).await.map_err(SignError::Write)?;
        output.write_all(b"\r\n").await.map_err(SignError::Write)?;
    }

    output.write_all(raw_headers).await.map_err(SignError::Write)?;

    for chunk in cache.memory_segment() {
        output.write_all(chunk).await.map_err(SignError::Write)?;
    }

    if let Some(mut reader) = cache.open_disk_segment().await.map_err(SignError::Cache)? {
        let mut buf = vec![0; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf).await.map_err(SignError::Cache)?;
            if n == 0 {
                break;
            }
            output.write_all(&buf[..n]).await.map_err(SignError::Write)?;
            task::yield_now().await;
        }
    }

    output.flush().await.map_err(SignError::Write)?;
    output.shutdown().await.map_err(SignError::Write)?;

    Ok(())
}

// Consumes the remaining input, so that the producer is not left blocked.
async fn drain<R>(input: &mut R)
where
    R: AsyncRead + Unpin,
{
    match tokio::io::copy(input, &mut tokio::io::sink()).await {
        Ok(n) => trace!(len = n, "discarded remaining input"),
        Err(e) => debug!("failed to discard remaining input: {e}"),
    }
}
