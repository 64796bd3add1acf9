//! Inbound byte-stream framing.
//!
//! Clients write bare JSON documents with no delimiter. Bytes are buffered
//! per connection and decoded with `serde_json`'s streaming deserializer, so
//! a read may carry several documents or only part of one.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    /// Buffered bytes are not valid JSON. The buffer is discarded.
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An incomplete document grew past the configured limit.
    #[error("incomplete document exceeded {0} bytes")]
    Oversized(usize),
}

/// Accumulates bytes and yields complete JSON documents.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_bytes: usize,
}

impl FrameDecoder {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_bytes,
        }
    }

    /// Append freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes held back waiting for the rest of a document.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete document, if any.
    ///
    /// Returns `None` once the buffer holds nothing but an incomplete tail
    /// (or nothing at all).
    pub fn next_frame(&mut self) -> Option<Result<Value, FrameError>> {
        let (outcome, consumed) = {
            let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
            let outcome = stream.next();
            (outcome, stream.byte_offset())
        };

        match outcome {
            Some(Ok(value)) => {
                self.buf.drain(..consumed);
                Some(Ok(value))
            }
            Some(Err(e)) if e.is_eof() => {
                if self.buf.len() > self.max_bytes {
                    let size = self.buf.len();
                    self.buf.clear();
                    Some(Err(FrameError::Oversized(size)))
                } else {
                    None
                }
            }
            Some(Err(e)) => {
                self.buf.clear();
                Some(Err(FrameError::Malformed(e)))
            }
            None => {
                // Only whitespace left.
                self.buf.clear();
                None
            }
        }
    }
}
