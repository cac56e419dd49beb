//! Serving the single-page application from the document root.
//!
//! - [`StaticFileHandler`]: request validation, conditional GET, history-mode fallback
//! - [`StaticFileCache`]: bounded LRU cache of file contents invalidated by mtime
//! - [`mime`] and [`date`]: content type lookup and HTTP date handling

pub mod cache;
pub mod date;
pub mod handler;
pub mod mime;

pub use cache::{Resolved, StaticFileCache};
pub use handler::StaticFileHandler;
