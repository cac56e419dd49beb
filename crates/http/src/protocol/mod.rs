//! Core HTTP/1.x protocol types shared by the codecs and the connections.
//!
//! - [`Message`], [`PayloadItem`], [`PayloadSize`]: framing units produced and consumed by the codecs
//! - [`RequestHeader`]: a decoded request head
//! - [`ResponseHead`]: a response head before its body is attached
//! - [`keep_alive`]: reading and writing the `Connection` decision
//! - [`HttpError`], [`ParseError`], [`SendError`]: error types

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHead;

pub mod keep_alive;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
