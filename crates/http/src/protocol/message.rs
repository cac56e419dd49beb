use bytes::{Buf, Bytes};

/// A framed HTTP message unit: either the head of a message or one piece of its payload.
///
/// The same shape is used in both directions of the gateway. `T` is the head type
/// (request or response head plus its [`PayloadSize`]), `Data` is the payload chunk type.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// The message head
    Header(T),
    /// A payload chunk or the end-of-payload marker
    Payload(PayloadItem<Data>),
}

/// One item of a payload stream produced by the body decoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    Eof,
}

/// How the payload of a message is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length` framed payload
    Length(u64),
    /// `Transfer-Encoding: chunked` payload
    Chunked,
    /// Payload delimited by the peer closing the connection (responses only)
    UntilClose,
    /// No payload at all
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn new_length(length: u64) -> Self {
        if length == 0 { PayloadSize::Empty } else { PayloadSize::Length(length) }
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// Payload size for a fully buffered body.
    #[inline]
    pub fn for_body(body: &[u8]) -> Self {
        Self::new_length(body.len() as u64)
    }
}

impl<T> Message<T> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Returns the payload item, or `None` if this message is a head.
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_is_empty() {
        assert_eq!(PayloadSize::new_length(0), PayloadSize::Empty);
        assert_eq!(PayloadSize::new_length(12), PayloadSize::Length(12));
        assert!(PayloadSize::for_body(b"").is_empty());
    }
}
