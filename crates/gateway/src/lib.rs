//! An HTTP gateway for a forum deployment.
//!
//! Client connections are terminated here and every request goes one of two ways:
//!
//! - requests whose target starts with a configured prefix are proxied to an upstream
//!   service (object storage, API, avatars, search), see [`router`] and [`proxy`]
//! - everything else is served from a document root holding a single-page application,
//!   with conditional GET, an in-memory LRU cache and history-mode fallback to
//!   `/index.html`, see [`static_files`]
//!
//! Connections are kept alive while the number of persistent connections stays below
//! a threshold, see [`session`].
//!
//! ```no_run
//! use forum_gate::config::GateConfig;
//! use forum_gate::server::{Gateway, Server};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GateConfig::load("app_config.toml")?;
//! let gateway = Gateway::from_config(&config)?;
//! Server::bind(config.socket_addr(), gateway).await?.run().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod proxy;
pub mod response;
pub mod router;
pub mod server;
pub mod session;
pub mod static_files;

use std::time::Duration;

/// Value of the `Server` header on generated responses and the `User-Agent` sent upstream
pub const SERVER_NAME: &str = concat!("forum-gate/", env!("CARGO_PKG_VERSION"));

/// Limit for every read, write, resolve and connect the gateway performs
pub const IO_TIMEOUT: Duration = Duration::from_secs(30);
