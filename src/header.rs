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

//! Representation of email header data.
//!
//! The header block of a message is captured once, as raw bytes, and is never
//! modified. The types in this module are a parsed *view* of those bytes, used
//! only for selecting and canonicalising the header fields that go into a
//! signature.

use bstr::ByteSlice;
use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderFieldError;

impl Display for HeaderFieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid header field")
    }
}

impl Error for HeaderFieldError {}

/// A header field name.
///
/// The name is stored in lowercase; comparison is case-insensitive.
#[derive(Clone, Eq)]
pub struct FieldName(Box<str>);

impl FieldName {
    pub fn new(value: impl AsRef<str>) -> Result<Self, HeaderFieldError> {
        let value = value.as_ref();
        if value.is_empty() {
            return Err(HeaderFieldError);
        }
        if !value.chars().all(|c| c.is_ascii_graphic() && c != ':') {
            return Err(HeaderFieldError);
        }
        Ok(Self(value.to_ascii_lowercase().into()))
    }
}

impl AsRef<str> for FieldName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl PartialEq for FieldName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl PartialEq<&str> for FieldName {
    fn eq(&self, other: &&str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl Hash for FieldName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // already lowercase
        self.0.hash(state);
    }
}

/// One logical header line, possibly folded, together with its name.
#[derive(Clone, Eq, PartialEq)]
pub struct HeaderField {
    pub name: FieldName,
    /// The original text of the line, name included. Folded continuation
    /// lines are joined with a single LF, line terminators are not included.
    pub line: Box<[u8]>,
}

impl HeaderField {
    /// Returns the field body, ie everything after the first colon.
    pub fn value(&self) -> &[u8] {
        match self.line.find_byte(b':') {
            Some(i) => &self.line[(i + 1)..],
            None => &[],
        }
    }
}

impl Debug for HeaderField {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderField")
            .field("name", &self.name)
            .field("line", &self.line.as_bstr())
            .finish()
    }
}

/// An ordered collection of header fields. Duplicate names are permitted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HeaderFields(Box<[HeaderField]>);

impl HeaderFields {
    pub fn new(value: impl Into<Box<[HeaderField]>>) -> Self {
        Self(value.into())
    }

    /// Parses the raw bytes of a header block.
    ///
    /// Lines may be terminated with CRLF or bare LF. Continuation lines are
    /// joined to the preceding line. Blank lines and lines that do not start
    /// with a well-formed field name followed by a colon are skipped; they can
    /// never be selected for signing.
    pub fn parse(raw: &[u8]) -> Self {
        let mut lines: Vec<Vec<u8>> = vec![];

        for line in raw.split_str("\n") {
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            match lines.last_mut() {
                Some(prev) if line.first().map_or(false, |b| b.is_ascii_whitespace()) => {
                    prev.push(b'\n');
                    prev.extend_from_slice(line);
                }
                _ => lines.push(line.to_vec()),
            }
        }

        let fields: Vec<_> = lines
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let i = line.find_byte(b':')?;
                let name = line[..i].trim().to_str().ok()?;
                let name = FieldName::new(name).ok()?;
                Some(HeaderField {
                    name,
                    line: line.into(),
                })
            })
            .collect();

        Self::new(fields)
    }

    /// Finds the bottommost field with the given name.
    pub fn find_last(&self, name: &FieldName) -> Option<&HeaderField> {
        self.0.iter().rev().find(|f| f.name == *name)
    }
}

impl AsRef<[HeaderField]> for HeaderFields {
    fn as_ref(&self) -> &[HeaderField] {
        &self.0
    }
}
