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

#![allow(dead_code)]

use base64ct::{Base64, Encoding};
use bstr::ByteSlice;
use rsa::{pkcs8::DecodePublicKey, Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};
use streamdkim::encode_base64;
use tokio::{
    fs,
    io::{AsyncRead, AsyncWrite, ReadBuf},
};

pub const PRIVATE_KEY_FILE: &str = "tests/keys/rsa2048.pem";
pub const PUBLIC_KEY_FILE: &str = "tests/keys/rsa2048.pub.pem";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

pub async fn read_private_key() -> String {
    fs::read_to_string(PRIVATE_KEY_FILE).await.unwrap()
}

pub async fn read_public_key() -> RsaPublicKey {
    let s = fs::read_to_string(PUBLIC_KEY_FILE).await.unwrap();
    RsaPublicKey::from_public_key_pem(s.trim()).unwrap()
}

/// A signed message taken apart: the signature headers at the top, the
/// original header block, and the body.
pub struct SignedParts {
    pub signatures: Vec<String>,
    pub headers: Vec<u8>,
    pub body: Vec<u8>,
}

pub fn split_signed_message(message: &[u8], signature_count: usize) -> SignedParts {
    let mut rest = message;
    let mut signatures = vec![];

    for _ in 0..signature_count {
        assert!(rest.starts_with(b"DKIM-Signature:"));

        // the header ends at the first CRLF not followed by a space
        let mut end = 0;
        loop {
            let i = rest[end..].find(b"\r\n").unwrap() + end;
            end = i + 2;
            if rest.get(end) != Some(&b' ') {
                break;
            }
        }

        signatures.push(rest[..(end - 2)].to_str().unwrap().to_owned());
        rest = &rest[end..];
    }

    let boundary = rest
        .find(b"\r\n\r\n")
        .map(|i| i + 4)
        .or_else(|| rest.find(b"\n\n").map(|i| i + 2))
        .unwrap_or(rest.len());

    SignedParts {
        signatures,
        headers: rest[..boundary].to_vec(),
        body: rest[boundary..].to_vec(),
    }
}

/// Returns the value of a tag of a signature header.
pub fn tag_value(signature: &str, name: &str) -> Option<String> {
    let (_, value) = signature.split_once(':')?;
    let value = value.replace("\r\n", "");

    value.split(';').find_map(|tag| {
        let (k, v) = tag.split_once('=')?;
        (k.trim() == name).then(|| v.split_whitespace().collect())
    })
}

pub fn body_hash_base64(body: &[u8]) -> String {
    encode_base64(Sha256::digest(body))
}

/// Checks a signature over the given original header block.
///
/// The signed data is assembled here without the library's canonicalisation
/// code, from the *h=* tag and the raw headers.
pub fn verify_signature(signature: &str, headers: &[u8], public_key: &RsaPublicKey) -> bool {
    let signed_names = tag_value(signature, "h").unwrap();
    let signature_data = Base64::decode_vec(&tag_value(signature, "b").unwrap()).unwrap();

    let fields = unfold_header_fields(headers);

    let mut data = vec![];

    for name in signed_names.split(':').filter(|n| !n.is_empty()) {
        let (_, value) = fields
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .unwrap();

        data.extend(name.to_ascii_lowercase().bytes());
        data.push(b':');
        data.extend(relax(value));
        data.extend(b"\r\n");
    }

    // everything up to and including "b=", the last tag
    let i = signature.find(" b=").unwrap() + 3;
    let (_, unsigned_value) = signature[..i].split_once(':').unwrap();

    data.extend(b"dkim-signature:");
    data.extend(relax(unsigned_value.as_bytes()));

    let digest = Sha256::digest(&data);

    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature_data)
        .is_ok()
}

fn unfold_header_fields(headers: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut fields: Vec<(String, Vec<u8>)> = vec![];

    for line in headers.lines() {
        if line.first().map_or(false, |b| *b == b' ' || *b == b'\t') {
            if let Some((_, value)) = fields.last_mut() {
                value.extend(line);
            }
        } else if let Some(i) = line.find_byte(b':') {
            let name = line[..i].trim().to_str().unwrap().to_owned();
            fields.push((name, line[(i + 1)..].to_vec()));
        }
    }

    fields
}

fn relax(value: &[u8]) -> Vec<u8> {
    let value: Vec<u8> = value.iter().copied().filter(|b| *b != b'\r' && *b != b'\n').collect();

    value
        .fields_with(|c| c == ' ' || c == '\t')
        .collect::<Vec<_>>()
        .join(&b" "[..])
}

/// An input stream that yields the given data, then fails.
pub struct FailingReader {
    data: Vec<u8>,
}

impl FailingReader {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.data.is_empty() {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "input failed")));
        }

        let n = self.data.len().min(buf.remaining());
        buf.put_slice(&self.data[..n]);
        self.data.drain(..n);

        Poll::Ready(Ok(()))
    }
}

/// An output stream that accepts a number of bytes, then fails.
pub struct FailingWriter {
    remaining: usize,
}

impl FailingWriter {
    pub fn new(capacity: usize) -> Self {
        Self { remaining: capacity }
    }
}

impl AsyncWrite for FailingWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.remaining == 0 {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "output closed")));
        }

        let n = self.remaining.min(buf.len());
        self.remaining -= n;

        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
