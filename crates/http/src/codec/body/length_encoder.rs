use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { length, eof: false }
    }

    /// All declared bytes were written and the end marker was seen.
    pub fn is_finish(&self) -> bool {
        self.length == 0 && self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                if !bytes.has_remaining() {
                    return Ok(());
                }
                let size = bytes.remaining() as u64;
                if size > self.length {
                    warn!(size, remaining = self.length, "payload larger than declared content-length");
                    return Err(SendError::invalid_body("payload larger than declared content-length"));
                }
                dst.put(bytes);
                self.length -= size;
                Ok(())
            }
            PayloadItem::Eof => {
                if self.length != 0 {
                    return Err(SendError::invalid_body(format!("payload ended with {} bytes missing", self.length)));
                }
                self.eof = true;
                Ok(())
            }
        }
    }
}
