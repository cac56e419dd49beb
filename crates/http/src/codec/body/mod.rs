//! Payload codecs.
//!
//! Decoders handle every framing a peer may send us: `Content-Length`,
//! `Transfer-Encoding: chunked`, read-until-close (responses only) and no body.
//! Encoders only produce `Content-Length` or empty payloads since the gateway
//! buffers whole messages before writing them.

mod chunked_decoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
