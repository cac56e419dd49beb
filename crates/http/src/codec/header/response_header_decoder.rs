//! Decoder for the response heads upstream servers send back.
//!
//! Interim `1xx` responses are consumed and skipped. The body framing follows
//! [RFC 9112 Section 6.3](https://www.rfc-editor.org/rfc/rfc9112#section-6.3): responses to
//! `HEAD`, `1xx`, `204` and `304` have no body, explicit framing headers come next and
//! anything else is read until the upstream closes the connection.

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Response, StatusCode};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::{HeaderIndex, MAX_HEADER_BYTES, MAX_HEADER_NUM, parse_payload_size};
use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, ResponseHead};

#[derive(Debug, Default)]
pub struct ResponseHeaderDecoder {
    head_request: bool,
}

impl ResponseHeaderDecoder {
    /// `head_request` tells whether the response answers a `HEAD` request.
    pub fn new(head_request: bool) -> Self {
        Self { head_request }
    }
}

impl Decoder for ResponseHeaderDecoder {
    type Item = (ResponseHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
            let mut res = httparse::Response::new(&mut headers);

            let body_offset = match res.parse(src) {
                Ok(Status::Complete(body_offset)) => body_offset,
                Ok(Status::Partial) => {
                    ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                    return Ok(None);
                }
                Err(Error::TooManyHeaders) => return Err(ParseError::too_many_headers(MAX_HEADER_NUM)),
                Err(e) => return Err(ParseError::invalid_header(e.to_string())),
            };
            ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

            let code = res.code.ok_or(ParseError::InvalidStatus(None))?;
            let status = StatusCode::from_u16(code).map_err(|_| ParseError::InvalidStatus(Some(code)))?;

            if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                trace!(status = code, "skip interim response");
                let _ = src.split_to(body_offset);
                continue;
            }

            let version = match res.version {
                Some(0) => http::Version::HTTP_10,
                Some(1) => http::Version::HTTP_11,
                _ => return Err(ParseError::InvalidVersion(res.version)),
            };

            let header_count = res.headers.len();
            let mut header_index = [HeaderIndex::EMPTY; MAX_HEADER_NUM];
            HeaderIndex::record(src, res.headers, &mut header_index);

            let mut builder = Response::builder().status(status).version(version);
            let header_bytes = src.split_to(body_offset).freeze();
            if let Some(headers) = builder.headers_mut() {
                headers.reserve(header_count);
                for index in &header_index[..header_count] {
                    let name =
                        HeaderName::from_bytes(&header_bytes[index.name.0..index.name.1]).map_err(ParseError::invalid_header)?;
                    let value = HeaderValue::from_maybe_shared(header_bytes.slice(index.value.0..index.value.1))
                        .map_err(ParseError::invalid_header)?;
                    headers.append(name, value);
                }
            }
            let head = builder.body(()).map_err(|_e| ParseError::InvalidStatus(Some(code)))?;

            let payload_size = if self.head_request
                || status.is_informational()
                || status == StatusCode::NO_CONTENT
                || status == StatusCode::NOT_MODIFIED
            {
                PayloadSize::Empty
            } else {
                parse_payload_size(head.headers())?.unwrap_or(PayloadSize::UntilClose)
            };

            return Ok(Some((head, payload_size)));
        }
    }
}
