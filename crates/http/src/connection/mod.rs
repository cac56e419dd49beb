//! Connections driving the codecs over async byte streams.
//!
//! - [`HttpConnection`]: a client connection, reads requests and writes responses
//! - [`UpstreamConnection`]: a connection to an upstream server, writes one request and reads its response
//!
//! Both buffer whole message bodies, bounded by a configurable limit.

mod body;
mod http_connection;
mod upstream_connection;

pub use http_connection::HttpConnection;
pub use upstream_connection::UpstreamConnection;

/// Default limit for a buffered message body
pub const DEFAULT_MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;
