//! Newline-delimited JSON codec.
//!
//! One JSON document per line. A line that is not valid JSON for the expected
//! type is surfaced as `Frame::Malformed` so the connection can answer it and
//! keep going; only oversize frames and I/O failures are fatal.

use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Serialize, de::DeserializeOwned};
use tokio_util::codec::{Decoder, Encoder};

/// Default maximum frame size (16 MiB).
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// A decoded line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<T> {
    Message(T),
    /// Line was consumed but did not parse; carries the parser message.
    Malformed(String),
}

#[derive(Debug)]
pub struct NdJsonCodec<T> {
    _phantom: PhantomData<T>,
    max_length: usize,
}

impl<T> NdJsonCodec<T> {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            _phantom: PhantomData,
            max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl<T> Default for NdJsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for NdJsonCodec<T> {
    fn clone(&self) -> Self {
        Self::with_max_length(self.max_length)
    }
}

fn too_large(size: usize, max: usize) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("Message too large: {} > {}", size, max),
    )
}

impl<T: DeserializeOwned> Decoder for NdJsonCodec<T> {
    type Item = Frame<T>;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > self.max_length {
                    return Err(too_large(src.len(), self.max_length));
                }
                return Ok(None);
            };

            if pos > self.max_length {
                return Err(too_large(pos, self.max_length));
            }

            let line = src.split_to(pos);
            src.advance(1);

            let line = match line.last() {
                Some(b'\r') => &line[..line.len() - 1],
                _ => &line[..],
            };
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            return Ok(Some(match serde_json::from_slice(line) {
                Ok(item) => Frame::Message(item),
                Err(e) => Frame::Malformed(e.to_string()),
            }));
        }
    }
}

impl<T, E: Serialize> Encoder<E> for NdJsonCodec<T> {
    type Error = std::io::Error;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        // Compact serialization never contains a raw newline
        let json = serde_json::to_vec(&item)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, format!("JSON error: {}", e)))?;

        if json.len() > self.max_length {
            return Err(too_large(json.len(), self.max_length));
        }

        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}
