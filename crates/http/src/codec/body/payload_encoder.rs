use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{PayloadItem, PayloadSize, SendError};
use bytes::{Buf, BytesMut};

use tokio_util::codec::Encoder;

/// Encodes a message payload. The gateway always knows the full body before it
/// writes, so only fixed-length and empty payloads are produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthEncoder),
    NoBody,
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthEncoder::new(size)) }
    }

    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::NoBody => true,
        }
    }
}

impl TryFrom<PayloadSize> for PayloadEncoder {
    type Error = SendError;

    fn try_from(payload_size: PayloadSize) -> Result<Self, Self::Error> {
        match payload_size {
            PayloadSize::Length(size) => Ok(PayloadEncoder::fix_length(size)),
            PayloadSize::Empty => Ok(PayloadEncoder::empty()),
            other => Err(SendError::invalid_body(format!("can't encode {other:?} payload, body must be buffered"))),
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::NoBody => Ok(()),
        }
    }
}
