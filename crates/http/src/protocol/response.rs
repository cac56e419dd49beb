//! HTTP response head handling.
//!
//! A response head is an `http::Response<()>`: status, version and headers with the
//! body still to come. Encoders take one of these plus a [`PayloadSize`](crate::protocol::PayloadSize),
//! the upstream decoder produces one.

use http::Response;

/// The head of an HTTP response, before the body is attached.
pub type ResponseHead = Response<()>;
