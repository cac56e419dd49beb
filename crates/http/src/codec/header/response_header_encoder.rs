//! Encoder for the responses the gateway writes to its clients.
//!
//! Writes the status line in the version of the request being answered and
//! always frames the body with `Content-Length`.

use std::io::Write;

use bytes::BytesMut;
use http::Version;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::header::{FastWrite, INIT_HEADER_SIZE, set_content_length, write_headers};
use crate::protocol::{PayloadSize, ResponseHead, SendError};

#[derive(Debug, Default)]
pub struct ResponseHeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for ResponseHeaderEncoder {
    type Error = SendError;

    /// # Errors
    ///
    /// Fails for versions other than HTTP/1.0 and HTTP/1.1, and for payloads that were not buffered.
    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        let version = match head.version() {
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_11 => "HTTP/1.1",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(SendError::UnsupportedVersion(v));
            }
        };

        set_content_length(head.headers_mut(), payload_size)?;

        dst.reserve(INIT_HEADER_SIZE);
        let status = head.status();
        write!(FastWrite(dst), "{version} {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))?;
        write_headers(head.headers(), dst);
        Ok(())
    }
}
