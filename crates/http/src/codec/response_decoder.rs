//! Decoder for upstream responses.
//!
//! Unlike requests, a response body may be delimited by the upstream closing its
//! side of the connection, so [`Decoder::decode_eof`] finishes such a body.

use crate::codec::body::PayloadDecoder;
use crate::codec::header::ResponseHeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, ResponseHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug)]
pub struct ResponseDecoder {
    header_decoder: ResponseHeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    /// `head_request` tells whether the response answers a `HEAD` request, which never has a body.
    pub fn new(head_request: bool) -> Self {
        Self { header_decoder: ResponseHeaderDecoder::new(head_request), payload_decoder: None }
    }

    fn payload_message(&mut self, item: Option<PayloadItem>) -> Option<Message<(ResponseHead, PayloadSize)>> {
        match item {
            Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
            Some(item @ PayloadItem::Eof) => {
                self.payload_decoder.take();
                Some(Message::Payload(item))
            }
            None => None,
        }
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            return Ok(self.payload_message(item));
        }

        let message = match self.header_decoder.decode(src)? {
            Some((head, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((head, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode_eof(src)?;
            return Ok(self.payload_message(item));
        }

        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::UnexpectedEof),
        }
    }
}
