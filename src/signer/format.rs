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

//! Formatting of the *DKIM-Signature* header.

use crate::{
    crypto::HashAlgorithm,
    header::FieldName,
    message_hash::{BodyHash, DKIM_SIGNATURE_NAME},
    util::{self, CanonicalStr},
};

// Note: Careful with offsets: folding works with *characters*, not bytes!

/// The line width at which the signature header is folded.
pub const LINE_WIDTH: usize = 76;

// Length of the first line of the signature data, following " b=".
const FIRST_SIGNATURE_LINE_LEN: usize = LINE_WIDTH - 3;
// Length of continuation lines of the signature data, following " ".
const SIGNATURE_LINE_LEN: usize = LINE_WIDTH - 1;

/// The signature tags that precede the *b=* tag.
pub struct UnsignedDkimSignature<'a> {
    pub hash_alg: HashAlgorithm,
    /// The signing domain in ASCII form.
    pub domain: &'a str,
    pub selector: &'a str,
    pub body_hash: &'a BodyHash,
    pub signed_headers: &'a [FieldName],
}

impl UnsignedDkimSignature<'_> {
    /// Returns the complete folded header, name included, ending with the
    /// empty *b=* tag: `DKIM-Signature: v=1; …;\r\n b=`.
    pub fn format_without_signature(&self) -> String {
        let h = self
            .signed_headers
            .iter()
            .map(|n| n.as_ref())
            .collect::<Vec<_>>()
            .join(":");

        let tags = [
            "v=1".to_owned(),
            format!("a=rsa-{}", self.hash_alg.canonical_str()),
            "c=relaxed/relaxed".to_owned(),
            format!("d={}", self.domain),
            "q=dns/txt".to_owned(),
            format!("s={}", self.selector),
            format!("bh={}", self.body_hash.to_base64()),
            format!("h={h}"),
        ];

        let header = format!("{DKIM_SIGNATURE_NAME}: {}", tags.join("; "));

        let mut result = fold_lines(&header, LINE_WIDTH);
        result.push_str(";\r\n b=");
        result
    }
}

/// Appends the Base64-encoded signature data to a header formatted with
/// [`UnsignedDkimSignature::format_without_signature`].
pub fn append_signature_data(formatted_header: &mut String, signature_data: &[u8]) {
    let s = util::encode_base64(signature_data);
    formatted_header.push_str(&fold_signature_data(&s));
}

/// Folds Base64 signature data: the first line takes the remainder of the
/// line after ` b=`, the following lines are indented with a single space.
pub fn fold_signature_data(s: &str) -> String {
    debug_assert!(s.is_ascii());

    let (first, mut rest) = s.split_at(s.len().min(FIRST_SIGNATURE_LINE_LEN));

    let mut result = String::with_capacity(s.len() + s.len() / SIGNATURE_LINE_LEN * 3 + 3);
    result.push_str(first);

    while !rest.is_empty() {
        let chunk;
        (chunk, rest) = rest.split_at(rest.len().min(SIGNATURE_LINE_LEN));
        result.push_str("\r\n ");
        result.push_str(chunk);
    }

    result
}

/// Folds a header line so that lines are at most `width` characters long
/// where possible.
///
/// Each line is broken before the last run of whitespace in its window, so
/// that the whitespace starts the continuation line. A window without
/// whitespace is extended to the end of the current word. Existing line
/// breaks are kept.
pub fn fold_lines(s: &str, width: usize) -> String {
    debug_assert!(width > 0);

    let mut result = String::with_capacity(s.len() + s.len() / width * 2);
    let mut rest = s;

    while !rest.is_empty() {
        let window_end = match rest.char_indices().nth(width) {
            Some((i, _)) => i,
            None => {
                result.push_str(rest);
                break;
            }
        };
        let window = &rest[..window_end];

        if let Some(i) = window.find(|c: char| c == '\r' || c == '\n') {
            let end = if window[i..].starts_with("\r\n") { i + 2 } else { i + 1 };
            result.push_str(&rest[..end]);
            rest = &rest[end..];
            continue;
        }

        let line_end = match last_whitespace_run(window) {
            Some(i) if i > 0 => i,
            _ => {
                let tail = &rest[window_end..];
                window_end + tail.find(char::is_whitespace).unwrap_or(tail.len())
            }
        };

        let line;
        (line, rest) = rest.split_at(line_end);
        result.push_str(line);

        if !rest.is_empty() {
            result.push_str("\r\n");
        }
    }

    result
}

// Returns the byte index where the last run of whitespace in `s` begins.
fn last_whitespace_run(s: &str) -> Option<usize> {
    let (last, _) = s.char_indices().rev().find(|(_, c)| c.is_whitespace())?;

    let start = s[..last]
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_whitespace())
        .last()
        .map_or(last, |(i, _)| i);

    Some(start)
}
