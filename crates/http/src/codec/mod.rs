//! Streaming codecs for HTTP/1.x messages.
//!
//! - Client side: [`RequestDecoder`] reads what clients send, [`ResponseEncoder`] writes the answers
//! - Upstream side: [`RequestEncoder`] writes forwarded requests, [`ResponseDecoder`] reads upstream responses
//!
//! All of them are [`tokio_util::codec`] implementations and are driven by
//! `FramedRead` / `FramedWrite` in [`crate::connection`].

mod body;
mod header;
mod request_decoder;
mod request_encoder;
mod response_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
pub use response_encoder::ResponseEncoder;
