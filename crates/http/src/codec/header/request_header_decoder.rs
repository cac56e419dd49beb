//! Decoder for HTTP request heads.
//!
//! Parses the request line and header fields with `httparse`, converts them into a
//! typed [`RequestHeader`] and decides how the request payload is framed.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum head size: 8KB
//! - HTTP/1.0 and HTTP/1.1 only

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Request};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::{HeaderIndex, MAX_HEADER_BYTES, MAX_HEADER_NUM, parse_request_payload_size};
use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RequestHeader};

#[derive(Debug, Default)]
pub struct RequestHeaderDecoder;

impl Decoder for RequestHeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    /// Returns `Ok(None)` until a complete head is buffered.
    ///
    /// # Errors
    ///
    /// Fails when the head is too large, has too many fields, uses an unsupported
    /// version or carries contradicting framing headers.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // "GET / HTTP/1.1\r\n\r\n" is the shortest head we can get
        if src.len() < 18 {
            ensure!(!src.starts_with(b"\r\n\r\n"), ParseError::InvalidMethod);
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_result = req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            Status::Complete(body_offset) => {
                trace!(head_size = body_offset, "parsed request head");
                ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

                let header_count = req.headers.len();
                let mut header_index = [HeaderIndex::EMPTY; MAX_HEADER_NUM];
                HeaderIndex::record(src, req.headers, &mut header_index);

                let version = match req.version {
                    Some(0) => http::Version::HTTP_10,
                    Some(1) => http::Version::HTTP_11,
                    _ => return Err(ParseError::InvalidVersion(req.version)),
                };

                let mut header_builder = Request::builder()
                    .method(req.method.ok_or(ParseError::InvalidMethod)?)
                    .uri(req.path.ok_or(ParseError::InvalidUri)?)
                    .version(version);

                let header_bytes = src.split_to(body_offset).freeze();
                if let Some(headers) = header_builder.headers_mut() {
                    headers.reserve(header_count);
                    for index in &header_index[..header_count] {
                        let name = HeaderName::from_bytes(&header_bytes[index.name.0..index.name.1])
                            .map_err(ParseError::invalid_header)?;
                        let value = HeaderValue::from_maybe_shared(header_bytes.slice(index.value.0..index.value.1))
                            .map_err(ParseError::invalid_header)?;
                        headers.append(name, value);
                    }
                }

                // the builder only fails on an invalid method or uri
                let request = header_builder.body(()).map_err(|_e| ParseError::InvalidUri)?;
                let header = RequestHeader::from(request);
                let payload_size = parse_request_payload_size(header.headers())?;

                Ok(Some((header, payload_size)))
            }
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                Ok(None)
            }
        }
    }
}
