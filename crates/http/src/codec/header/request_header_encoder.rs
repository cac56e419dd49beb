//! Encoder for the requests the gateway sends upstream.

use std::io::Write;

use bytes::BytesMut;
use http::Version;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::header::{FastWrite, INIT_HEADER_SIZE, set_content_length, write_headers};
use crate::protocol::{PayloadSize, RequestHeader, SendError};

#[derive(Debug, Default)]
pub struct RequestHeaderEncoder;

impl Encoder<(RequestHeader, PayloadSize)> for RequestHeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (RequestHeader, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        let version = match header.version() {
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_11 => "HTTP/1.1",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(SendError::UnsupportedVersion(v));
            }
        };

        // bodyless requests don't advertise a zero length
        if payload_size.is_empty() {
            header.as_mut().headers_mut().remove(http::header::CONTENT_LENGTH);
            header.as_mut().headers_mut().remove(http::header::TRANSFER_ENCODING);
        } else {
            set_content_length(header.as_mut().headers_mut(), payload_size)?;
        }

        dst.reserve(INIT_HEADER_SIZE);
        let target = header.uri().path_and_query().map_or("/", |path| path.as_str());
        write!(FastWrite(dst), "{} {target} {version}\r\n", header.method())?;
        write_headers(header.headers(), dst);
        Ok(())
    }
}
