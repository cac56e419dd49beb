//! HTTP/1.x protocol plumbing for the forum gateway.
//!
//! This crate knows how to read and write HTTP/1.0 and HTTP/1.1 messages on async
//! byte streams, in both directions a reverse proxy needs:
//!
//! - towards clients: decode requests, encode responses
//! - towards upstream servers: encode requests, decode responses
//!
//! Routing, caching and everything else that decides *what* to answer lives in the
//! `forum-gate` crate.
//!
//! # Architecture
//!
//! - [`protocol`]: message heads, payload framing, keep-alive rules and error types
//! - [`codec`]: `tokio_util` decoders and encoders for heads and payloads
//! - [`connection`]: [`connection::HttpConnection`] and [`connection::UpstreamConnection`]
//!   which drive the codecs and buffer whole bodies
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use gate_http::connection::HttpConnection;
//! use http::{Response, StatusCode};
//! use tokio::net::TcpListener;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = TcpListener::bind("127.0.0.1:8080").await?;
//! let (stream, _) = listener.accept().await?;
//! let (reader, writer) = stream.into_split();
//! let mut connection = HttpConnection::new(reader, writer);
//!
//! while let Some(request) = connection.read_request().await? {
//!     let body = Bytes::from(format!("you asked for {}", request.uri().path()));
//!     let response = Response::builder().status(StatusCode::OK).body(body)?;
//!     connection.send_response(response).await?;
//! }
//! connection.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! - HTTP/1.x only
//! - No TLS
//! - Maximum head size: 8KB
//! - Maximum number of headers: 64
//! - Outgoing bodies are always `Content-Length` framed

pub mod codec;
pub mod connection;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
