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

//! Relaxed canonicalisation of message body and header fields.

use crate::header::{FieldName, HeaderFields};

const SP: u8 = b' ';
const TAB: u8 = b'\t';
const CR: u8 = b'\r';
const LF: u8 = b'\n';
const CRLF: [u8; 2] = [CR, LF];

/// A streaming canonicaliser using the *relaxed* body canonicalisation
/// algorithm.
///
/// Every chunk is transformed and returned right away; the only state carried
/// between chunks is whitespace, a CR whose meaning depends on the next byte,
/// and the empty lines that may yet turn out to be trailing. Empty lines are
/// held as runs of equal terminators, so a long run of empty lines costs a
/// single counter.
///
/// A line is terminated by LF, optionally preceded by CR. A CR not followed by
/// LF is treated like any other byte. By default each line keeps the
/// terminator it was found with; only the final line terminator of the body is
/// guaranteed to be CRLF.
#[derive(Debug)]
pub struct BodyCanonicalizer {
    normalize_line_endings: bool,
    line_has_content: bool,
    pending_wsp: bool,
    pending_cr: bool,
    // empty lines seen since the last non-empty line, as runs of
    // (terminator is CRLF, count)
    empty_lines: Vec<(bool, u64)>,
    bytes_emitted: u64,
    last_two: [u8; 2],
}

impl BodyCanonicalizer {
    pub fn relaxed() -> Self {
        Self::new(false)
    }

    /// Creates a relaxed canonicaliser that rewrites bare LF line terminators
    /// to CRLF.
    pub fn relaxed_normalizing() -> Self {
        Self::new(true)
    }

    fn new(normalize_line_endings: bool) -> Self {
        Self {
            normalize_line_endings,
            line_has_content: false,
            pending_wsp: false,
            pending_cr: false,
            empty_lines: vec![],
            bytes_emitted: 0,
            last_two: [0; 2],
        }
    }

    pub fn canonicalize_chunk(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(bytes.len());

        for &b in bytes {
            if self.pending_cr {
                self.pending_cr = false;
                if b == LF {
                    self.end_line(&mut result, true);
                    continue;
                }
                self.push_content(&mut result, CR);
            }

            match b {
                SP | TAB => self.pending_wsp = true,
                CR => self.pending_cr = true,
                LF => self.end_line(&mut result, false),
                b => self.push_content(&mut result, b),
            }
        }

        self.record_output(&result);

        result
    }

    /// Completes canonicalisation and returns the final piece of output.
    ///
    /// Trailing whitespace and trailing empty lines are dropped, and the body
    /// is made to end with CRLF. The empty body becomes a single CRLF.
    pub fn finish(mut self) -> Vec<u8> {
        let mut result = vec![];

        if self.pending_cr {
            self.push_content(&mut result, CR);
        }

        self.record_output(&result);

        if self.bytes_emitted == 0 || self.last_two != CRLF {
            result.extend(CRLF);
        }

        result
    }

    fn push_content(&mut self, result: &mut Vec<u8>, b: u8) {
        if !self.line_has_content {
            for (crlf, n) in self.empty_lines.drain(..) {
                let terminator: &[u8] = if crlf { &CRLF } else { &[LF] };
                for _ in 0..n {
                    result.extend(terminator);
                }
            }
            self.line_has_content = true;
        }
        if self.pending_wsp {
            result.push(SP);
            self.pending_wsp = false;
        }
        result.push(b);
    }

    fn end_line(&mut self, result: &mut Vec<u8>, crlf: bool) {
        self.pending_wsp = false;

        let crlf = crlf || self.normalize_line_endings;

        if self.line_has_content {
            result.extend(if crlf { &CRLF[..] } else { &[LF] });
            self.line_has_content = false;
        } else {
            match self.empty_lines.last_mut() {
                Some((last_crlf, n)) if *last_crlf == crlf => *n += 1,
                _ => self.empty_lines.push((crlf, 1)),
            }
        }
    }

    fn record_output(&mut self, output: &[u8]) {
        match *output {
            [] => {}
            [b] => self.last_two = [self.last_two[1], b],
            [.., a, b] => self.last_two = [a, b],
        }
        self.bytes_emitted += output.len() as u64;
    }
}

/// Produces the relaxed header canonicalisation result for the selected
/// header fields, together with the names of the fields actually included.
///
/// For each name, in the order given, the bottommost occurrence in `headers`
/// is used. Names that do not occur are left out of both results.
pub fn canonicalize_headers(
    headers: &HeaderFields,
    selected_headers: &[FieldName],
) -> (Vec<u8>, Vec<FieldName>) {
    let mut result = vec![];
    let mut included = Vec::with_capacity(selected_headers.len());

    for name in selected_headers {
        if let Some(field) = headers.find_last(name) {
            canonicalize_header(&mut result, name.as_ref(), field.value());
            result.extend(CRLF);
            included.push(name.clone());
        }
    }

    (result, included)
}

/// Canonicalises a header field into some result vector, without a line
/// terminator.
pub fn canonicalize_header(result: &mut Vec<u8>, name: &str, value: &[u8]) {
    result.extend(name.to_ascii_lowercase().bytes());
    result.push(b':');
    canonicalize_header_value(result, value);
}

// Line breaks are removed outright, remaining whitespace runs are reduced to a
// single space, leading and trailing whitespace is dropped.
fn canonicalize_header_value(result: &mut Vec<u8>, value: &[u8]) {
    fn is_space(b: u8) -> bool {
        matches!(b, SP | TAB | CR | b'\x0b' | b'\x0c')
    }

    let mut started = false;
    let mut pending_space = false;

    let mut bytes = value.iter().copied().peekable();
    while let Some(b) = bytes.next() {
        if b == LF || (b == CR && bytes.peek() == Some(&LF)) {
            continue;
        }
        if is_space(b) {
            pending_space = started;
            continue;
        }
        if pending_space {
            result.push(SP);
            pending_space = false;
        }
        result.push(b);
        started = true;
    }
}
