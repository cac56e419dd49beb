//! Message head codecs.
//!
//! Each direction of the gateway has its own pair:
//!
//! - [`RequestHeaderDecoder`] / [`ResponseHeaderEncoder`]: the client facing side
//! - [`RequestHeaderEncoder`] / [`ResponseHeaderDecoder`]: the upstream facing side
//!
//! The decoders share the zero-copy header indexing and the payload framing rules
//! defined here.

mod request_header_decoder;
mod request_header_encoder;
mod response_header_decoder;
mod response_header_encoder;

pub use request_header_decoder::RequestHeaderDecoder;
pub use request_header_encoder::RequestHeaderEncoder;
pub use response_header_decoder::ResponseHeaderDecoder;
pub use response_header_encoder::ResponseHeaderEncoder;

use std::io;

use bytes::{BufMut, BytesMut};
use http::{HeaderMap, HeaderValue, header};

use crate::protocol::{ParseError, PayloadSize};

/// Maximum number of header fields in one message head
pub(crate) const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes of one message head
pub(crate) const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Initial buffer size reserved when writing a head
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Byte ranges of one header field inside the buffer `httparse` parsed.
#[derive(Clone, Copy)]
pub(crate) struct HeaderIndex {
    pub(crate) name: (usize, usize),
    pub(crate) value: (usize, usize),
}

impl HeaderIndex {
    pub(crate) const EMPTY: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

    pub(crate) fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            indices.name = (name_start, name_start + header.name.len());
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            indices.value = (value_start, value_start + header.value.len());
        }
    }
}

/// Reads the payload framing from `Transfer-Encoding` and `Content-Length`.
///
/// Returns `Ok(None)` when neither header decides the framing, the caller then applies
/// the default of its message kind. See [RFC 9112 Section 6.3](https://www.rfc-editor.org/rfc/rfc9112#section-6.3).
pub(crate) fn parse_payload_size(headers: &HeaderMap) -> Result<Option<PayloadSize>, ParseError> {
    let te_header = headers.get(header::TRANSFER_ENCODING);
    let cl_header = headers.get(header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(None),

        (Some(te_value), None) => Ok(is_chunked(te_value).then_some(PayloadSize::Chunked)),

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
            let length =
                cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;
            Ok(Some(PayloadSize::new_length(length)))
        }

        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}

/// Framing of a request body, which has no read-until-close fallback.
///
/// A request without framing headers has no body. A `Transfer-Encoding` whose final
/// coding is not `chunked` leaves the body length unknown, so the request is rejected
/// instead of its body being read as the next request.
pub(crate) fn parse_request_payload_size(headers: &HeaderMap) -> Result<PayloadSize, ParseError> {
    match parse_payload_size(headers)? {
        Some(payload_size) => Ok(payload_size),
        None if headers.contains_key(header::TRANSFER_ENCODING) => {
            Err(ParseError::invalid_body("request transfer-encoding must end with chunked"))
        }
        None => Ok(PayloadSize::Empty),
    }
}

/// `chunked` must be the final transfer coding.
fn is_chunked(te_value: &HeaderValue) -> bool {
    te_value
        .to_str()
        .ok()
        .and_then(|value| value.rsplit(',').next())
        .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
}

/// Replaces the framing headers with the `Content-Length` of a buffered payload.
///
/// An empty payload keeps an explicit `Content-Length`: that is how a response to
/// `HEAD` advertises the size of the body it leaves out.
fn set_content_length(headers: &mut HeaderMap, payload_size: PayloadSize) -> io::Result<()> {
    headers.remove(header::TRANSFER_ENCODING);
    match payload_size {
        PayloadSize::Length(n) => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(n));
        }
        PayloadSize::Empty => {
            if !headers.contains_key(header::CONTENT_LENGTH) {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
            }
        }
        PayloadSize::Chunked | PayloadSize::UntilClose => {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "only buffered payloads can be written"));
        }
    }
    Ok(())
}

fn write_headers(headers: &HeaderMap, dst: &mut BytesMut) {
    for (header_name, header_value) in headers {
        dst.put_slice(header_name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(header_value.as_ref());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}

/// Writer over a `BytesMut` whose capacity was already reserved.
struct FastWrite<'a>(&'a mut BytesMut);

impl io::Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
