use std::mem;

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidUtf8,
}

/// A line read from a chunk stream.
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    /// A line terminated by a line feed.
    Complete(String),
    /// Data left over without a terminating line feed when the stream
    /// ended.
    Trailing(String),
}

impl Line {
    #[inline]
    pub fn into_inner(self) -> String {
        match self {
            Line::Complete(line) | Line::Trailing(line) => line,
        }
    }
}

/// A type for reading lines from a chunk stream.
///
/// Bytes are buffered until a line feed arrives, so a line (and a UTF-8
/// sequence inside it) may span any number of chunks.
pub struct Lines {
    buf: Vec<u8>,
    chunks: Chunks,
    eof: bool,
}

impl Lines {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
            eof: false,
        }
    }

    pub async fn next_line(&mut self) -> Result<Option<Line>, Error> {
        loop {
            if let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
                let rest = self.buf.split_off(idx + 1);
                let mut line = mem::replace(&mut self.buf, rest);
                line.truncate(idx);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return decode(line).map(|s| Some(Line::Complete(s)));
            }

            if self.eof {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let rest = mem::take(&mut self.buf);
                return decode(rest).map(|s| Some(Line::Trailing(s)));
            }

            // No complete line in the buffer, read more.
            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.eof = true,
            }
        }
    }
}

#[inline]
fn decode(bytes: Vec<u8>) -> Result<String, Error> {
    String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}
