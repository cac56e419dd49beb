//! Listening socket and the state shared by every session.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gate_http::connection::DEFAULT_MAX_BODY_BYTES;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::IO_TIMEOUT;
use crate::config::{ConfigError, GateConfig};
use crate::router::ProxyRuleTable;
use crate::session::{PersistentConnections, Session};
use crate::static_files::StaticFileHandler;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
}

/// Everything a session needs to answer requests.
#[derive(Debug)]
pub struct Gateway {
    rules: ProxyRuleTable,
    static_files: StaticFileHandler,
    connections: PersistentConnections,
    max_body_size: u64,
    io_timeout: Duration,
}

impl Gateway {
    pub fn new(rules: ProxyRuleTable, doc_root: impl Into<PathBuf>) -> Self {
        Self {
            rules,
            static_files: StaticFileHandler::new(doc_root),
            connections: PersistentConnections::default(),
            max_body_size: DEFAULT_MAX_BODY_BYTES,
            io_timeout: IO_TIMEOUT,
        }
    }

    pub fn from_config(config: &GateConfig) -> Result<Self, ConfigError> {
        let gateway = Self::new(config.proxy_rules()?, config.doc_root.clone()).with_max_body_size(config.max_body_size);
        Ok(gateway)
    }

    #[must_use]
    pub fn with_connections(mut self, connections: PersistentConnections) -> Self {
        self.connections = connections;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: u64) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    #[must_use]
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn rules(&self) -> &ProxyRuleTable {
        &self.rules
    }

    pub fn static_files(&self) -> &StaticFileHandler {
        &self.static_files
    }

    pub fn connections(&self) -> &PersistentConnections {
        &self.connections
    }

    pub fn max_body_size(&self) -> u64 {
        self.max_body_size
    }

    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }
}

pub struct Server {
    listener: TcpListener,
    gateway: Arc<Gateway>,
}

impl Server {
    pub async fn bind(addr: SocketAddr, gateway: Gateway) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self { listener, gateway: Arc::new(gateway) })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, each one served by its own task.
    pub async fn run(self) {
        match self.local_addr() {
            Ok(addr) => info!(%addr, rules = self.gateway.rules().len(), "gateway listening"),
            Err(e) => warn!(cause = %e, "gateway listening on unknown address"),
        }

        loop {
            let (tcp_stream, peer) = match self.listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            if let Err(e) = tcp_stream.set_nodelay(true) {
                debug!(%peer, cause = %e, "failed to set TCP_NODELAY");
            }

            let gateway = Arc::clone(&self.gateway);
            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                match Session::new(&gateway, peer).run(reader, writer).await {
                    Ok(()) => debug!(%peer, "session finished"),
                    Err(e) => warn!(%peer, cause = %e, "session aborted"),
                }
            });
        }
    }
}
