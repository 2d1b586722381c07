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

//! Separation of the header block from the message body.

use tracing::trace;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// The result of pushing a chunk of message data into the splitter.
#[derive(Debug, Eq, PartialEq)]
pub enum Split<'a> {
    /// The chunk was retained as header data, the boundary has not been seen.
    Pending,
    /// The boundary was found in this chunk. `headers` holds the complete raw
    /// header block including the empty line, `body` the rest of the chunk.
    Boundary { headers: Vec<u8>, body: &'a [u8] },
    /// The boundary was found earlier; the whole chunk is body data.
    Body(&'a [u8]),
}

/// Scanner that locates the empty line separating header and body.
///
/// Both CRLF and bare LF are accepted as line terminators. The header block is
/// handed out exactly once; after that, chunks are passed through unscanned.
#[derive(Debug)]
pub struct HeaderBodySplitter {
    // `None` once the boundary has been found
    headers: Option<Vec<u8>>,
}

impl HeaderBodySplitter {
    pub fn new() -> Self {
        Self {
            headers: Some(vec![]),
        }
    }

    pub fn push<'a>(&mut self, chunk: &'a [u8]) -> Split<'a> {
        let headers = match &mut self.headers {
            Some(headers) => headers,
            None => return Split::Body(chunk),
        };

        // The last two bytes already seen are enough context to recognise a
        // boundary straddling the chunk boundary.
        let seen = headers.len();
        let window_start = seen.saturating_sub(2);
        headers.extend_from_slice(chunk);

        match find_boundary(headers, window_start) {
            Some(end) => {
                let body_start = end - seen;
                let mut headers = self.headers.take().unwrap_or_default();
                headers.truncate(end);
                trace!(len = end, "found end of header block");
                Split::Boundary {
                    headers,
                    body: &chunk[body_start..],
                }
            }
            None => Split::Pending,
        }
    }

    /// Ends the input. If no boundary was ever found, all data seen is
    /// returned as the header block; the body is then empty.
    pub fn finish(self) -> Option<Vec<u8>> {
        if self.headers.is_some() {
            trace!("no end of header block found, treating all input as header");
        }
        self.headers
    }

    pub fn is_done(&self) -> bool {
        self.headers.is_none()
    }
}

impl Default for HeaderBodySplitter {
    fn default() -> Self {
        Self::new()
    }
}

// Returns the index just past the empty line ending the header block.
fn find_boundary(buf: &[u8], from: usize) -> Option<usize> {
    // an empty line at the very beginning means an empty header block
    match buf {
        [LF, ..] => return Some(1),
        [CR, LF, ..] => return Some(2),
        _ => {}
    }

    (from.max(1)..buf.len()).find_map(|i| {
        if buf[i] != LF {
            return None;
        }
        match (i.checked_sub(2).map(|j| buf[j]), buf[i - 1]) {
            (_, LF) | (Some(LF), CR) => Some(i + 1),
            _ => None,
        }
    })
}
