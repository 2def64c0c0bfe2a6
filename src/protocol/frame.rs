//! Line Framing
//!
//! bloomd speaks plain text: one request per line, one or more reply lines
//! per request. This module turns the inbound byte stream into lines and
//! outbound command lines into bytes.
//!
//! ## How Splitting Works
//!
//! The reader task appends whatever the socket returns to a `BytesMut` and
//! then calls [`LineReader::next_line`] until it returns `Ok(None)`:
//!
//! ```text
//! buffer: "Yes\r\nNo\r\nST"
//!          ^^^^^^ ^^^^^^ ^^
//!          line 1 line 2 kept until more bytes arrive
//! ```
//!
//! Lines end at `\n`; a `\r` right before it is dropped, so both CRLF and LF
//! peers work. The only state kept between calls is how far the buffer has
//! already been searched, so a long line arriving in many chunks is scanned
//! once. Replies decode the same no matter how TCP chunks them.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Delimiter appended to every request line.
pub const LINE_DELIMITER: &[u8] = b"\r\n";

/// Longest reply line accepted before the connection is considered broken (1 MiB).
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Errors raised while splitting the inbound stream.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    /// No delimiter within the allowed line length.
    #[error("line too long: {size} bytes without a delimiter (max: {max})")]
    LineTooLong { size: usize, max: usize },

    /// The line is not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Splits lines off an inbound buffer.
///
/// One reader per buffer: `scanned` is an offset into that buffer.
#[derive(Debug, Default)]
pub struct LineReader {
    scanned: usize,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes the next complete line from `buf`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(line))` - a line without its delimiter
    /// - `Ok(None)` - no complete line buffered yet
    /// - `Err(e)` - the stream cannot be framed any more
    pub fn next_line(&mut self, buf: &mut BytesMut) -> Result<Option<String>, FrameError> {
        let start = self.scanned.min(buf.len());
        let Some(offset) = buf[start..].iter().position(|&b| b == b'\n') else {
            if buf.len() > MAX_LINE_LENGTH {
                return Err(FrameError::LineTooLong {
                    size: buf.len(),
                    max: MAX_LINE_LENGTH,
                });
            }
            self.scanned = buf.len();
            return Ok(None);
        };
        let pos = start + offset;
        self.scanned = 0;

        if pos > MAX_LINE_LENGTH {
            return Err(FrameError::LineTooLong {
                size: pos,
                max: MAX_LINE_LENGTH,
            });
        }

        let frame = buf.split_to(pos + 1);
        let mut content = &frame[..pos];
        if content.last() == Some(&b'\r') {
            content = &content[..content.len() - 1];
        }

        std::str::from_utf8(content)
            .map(|s| Some(s.to_string()))
            .map_err(|e| FrameError::InvalidUtf8(e.to_string()))
    }
}

/// Appends the delimiter to a request line.
pub fn encode_line(line: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(line.len() + LINE_DELIMITER.len());
    buf.put_slice(line.as_bytes());
    buf.put_slice(LINE_DELIMITER);
    buf.freeze()
}
