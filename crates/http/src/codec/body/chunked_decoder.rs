//! Decoder for `Transfer-Encoding: chunked` payloads.
//!
//! See [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).
//! Chunk extensions and trailer fields are validated for framing and then dropped.

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Decoder;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// hex digits of the chunk size
    Size,
    /// whitespace after the size
    SizeLws,
    /// `;ext=value` after the size
    Extension,
    SizeLf,
    Body,
    BodyCr,
    BodyLf,
    /// a trailer field line
    Trailer,
    TrailerLf,
    EndCr,
    EndLf,
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size, remaining: 0 }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(reason: &'static str) -> ParseError {
    ParseError::io(io::Error::new(ErrorKind::InvalidInput, reason))
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == State::End {
                trace!("finished reading chunked payload");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            if self.state == State::Body {
                let read_size = usize::try_from(self.remaining).unwrap_or(usize::MAX).min(src.len());
                self.remaining -= read_size as u64;
                if self.remaining == 0 {
                    self.state = State::BodyCr;
                }
                let bytes = src.split_to(read_size).freeze();
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }

            let byte = src.get_u8();
            self.state = match (self.state, byte) {
                (State::Size, b @ (b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F')) => {
                    let digit = match b {
                        b'0'..=b'9' => b - b'0',
                        b'a'..=b'f' => b + 10 - b'a',
                        _ => b + 10 - b'A',
                    };
                    self.remaining = self
                        .remaining
                        .checked_mul(16)
                        .and_then(|size| size.checked_add(u64::from(digit)))
                        .ok_or_else(|| invalid("invalid overflow chunked length"))?;
                    State::Size
                }
                (State::Size | State::SizeLws, b'\t' | b' ') => State::SizeLws,
                (State::Size | State::SizeLws, b';') => State::Extension,
                (State::Size | State::SizeLws | State::Extension, b'\r') => State::SizeLf,
                (State::Size, _) => return Err(invalid("invalid chunk size line")),
                (State::SizeLws, _) => return Err(invalid("invalid chunk size linear white space")),
                (State::Extension, b'\n') => return Err(invalid("invalid chunk extension contains newline")),
                (State::Extension, _) => State::Extension,
                (State::SizeLf, b'\n') if self.remaining == 0 => State::EndCr,
                (State::SizeLf, b'\n') => State::Body,
                (State::SizeLf, _) => return Err(invalid("invalid chunk size LF")),
                (State::BodyCr, b'\r') => State::BodyLf,
                (State::BodyCr, _) => return Err(invalid("invalid chunk body CR")),
                (State::BodyLf, b'\n') => State::Size,
                (State::BodyLf, _) => return Err(invalid("invalid chunk body LF")),
                (State::Trailer, b'\r') => State::TrailerLf,
                (State::Trailer, _) => State::Trailer,
                (State::TrailerLf, b'\n') => State::EndCr,
                (State::TrailerLf, _) => return Err(invalid("invalid trailer end LF")),
                (State::EndCr, b'\r') => State::EndLf,
                (State::EndCr, _) => State::Trailer,
                (State::EndLf, b'\n') => State::End,
                (State::EndLf, _) => return Err(invalid("invalid chunk end LF")),
                // handled above before a byte is consumed
                (state @ (State::Body | State::End), _) => state,
            };
        }
    }
}
