//! Unified payload decoder.
//!
//! Picks the framing strategy from the [`PayloadSize`] computed while decoding
//! the message head.

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    /// everything until the peer closes the connection
    UntilClose { eof: bool },
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose { eof: false } }
    }

    /// Returns whether the payload is terminated by connection close.
    pub fn is_until_close(&self) -> bool {
        matches!(self.kind, Kind::UntilClose { .. })
    }

    /// Called once the underlying stream has ended.
    ///
    /// Only a read-until-close payload can legally end here; any other framing
    /// still waiting for bytes is a truncated message.
    pub fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<PayloadItem>, ParseError> {
        match &mut self.kind {
            Kind::UntilClose { eof } => {
                if !src.is_empty() {
                    return Ok(Some(PayloadItem::Chunk(src.split().freeze())));
                }
                *eof = true;
                Ok(Some(PayloadItem::Eof))
            }
            _ => match self.decode(src)? {
                Some(item) => Ok(Some(item)),
                None => Err(ParseError::UnexpectedEof),
            },
        }
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(size) => PayloadDecoder::fix_length(size),
            PayloadSize::Chunked => PayloadDecoder::chunked(),
            PayloadSize::UntilClose => PayloadDecoder::until_close(),
            PayloadSize::Empty => PayloadDecoder::empty(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::UntilClose { eof: true } => Ok(Some(PayloadItem::Eof)),
            Kind::UntilClose { eof: false } if src.is_empty() => Ok(None),
            Kind::UntilClose { eof: false } => Ok(Some(PayloadItem::Chunk(src.split().freeze()))),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}
