//! Per-connection request loop and keep-alive policy.
//!
//! A [`Session`] reads a request, dispatches it, writes the response and either loops for
//! the next request or closes. Keep-alive is granted while the process holds at most
//! [`MAX_PERSISTENT_CONNECTIONS`] persistent sessions. A session counts as persistent
//! from its first successful keep-alive response until it ends; once counted it keeps
//! being served persistently no matter how busy the gateway gets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use gate_http::connection::HttpConnection;
use gate_http::protocol::HttpError;
use gate_http::protocol::keep_alive::{is_keep_alive, set_keep_alive};
use http::{Request, Response};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::proxy::ProxySession;
use crate::server::Gateway;

/// Above this many persistent sessions new sessions get `Connection: close`
pub const MAX_PERSISTENT_CONNECTIONS: usize = 1024;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("read request failed: {0}")]
    Read(#[source] HttpError),

    #[error("write response failed: {0}")]
    Write(#[source] HttpError),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },
}

/// Process wide number of sessions in persistent mode.
#[derive(Debug, Clone)]
pub struct PersistentConnections {
    count: Arc<AtomicUsize>,
    threshold: usize,
}

impl Default for PersistentConnections {
    fn default() -> Self {
        Self::new(MAX_PERSISTENT_CONNECTIONS)
    }
}

impl PersistentConnections {
    pub fn new(threshold: usize) -> Self {
        Self { count: Arc::new(AtomicUsize::new(0)), threshold }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Whether new sessions should be denied keep-alive.
    pub fn is_saturated(&self) -> bool {
        self.count() > self.threshold
    }

    /// Counts the caller as persistent until the returned slot is dropped.
    pub fn acquire(&self) -> PersistentSlot {
        self.count.fetch_add(1, Ordering::SeqCst);
        PersistentSlot { count: Arc::clone(&self.count) }
    }
}

/// One persistent session, released on drop.
#[derive(Debug)]
pub struct PersistentSlot {
    count: Arc<AtomicUsize>,
}

impl Drop for PersistentSlot {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The request loop of one client connection.
#[derive(Debug)]
pub struct Session<'a> {
    gateway: &'a Gateway,
    peer: SocketAddr,
    slot: Option<PersistentSlot>,
}

impl<'a> Session<'a> {
    pub fn new(gateway: &'a Gateway, peer: SocketAddr) -> Self {
        Self { gateway, peer, slot: None }
    }

    /// Serves requests until the connection closes or fails.
    ///
    /// Read and write failures abandon the connection without a response. A proxied
    /// request whose round trip fails closes the connection, again without a response.
    pub async fn run<R, W>(mut self, reader: R, writer: W) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let io_timeout = self.gateway.io_timeout();
        let mut connection = HttpConnection::new(reader, writer).with_max_body_size(self.gateway.max_body_size());

        loop {
            let request = match timeout(io_timeout, connection.read_request()).await {
                Ok(Ok(Some(request))) => request,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(SessionError::Read(e)),
                Err(_elapsed) => return Err(SessionError::Timeout { stage: "read", after: io_timeout }),
            };
            trace!(peer = %self.peer, method = %request.method(), target = %request.uri(), "received request");

            let Some((response, keep_alive)) = self.dispatch(request).await else {
                break;
            };

            match timeout(io_timeout, connection.send_response(response)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(SessionError::Write(e)),
                Err(_elapsed) => return Err(SessionError::Timeout { stage: "write", after: io_timeout }),
            }

            if !keep_alive {
                break;
            }
            if self.slot.is_none() {
                self.slot = Some(self.gateway.connections().acquire());
            }
        }

        match timeout(io_timeout, connection.shutdown()).await {
            Ok(Ok(())) => debug!(peer = %self.peer, "connection closed"),
            Ok(Err(e)) => warn!(peer = %self.peer, cause = %e, "failed to close connection"),
            Err(_elapsed) => warn!(peer = %self.peer, "closing connection timed out"),
        }
        Ok(())
    }

    /// Produces the response for `request` and whether the connection stays open after it.
    ///
    /// Returns `None` when a proxied round trip failed.
    async fn dispatch(&self, request: Request<Bytes>) -> Option<(Response<Bytes>, bool)> {
        let version = request.version();
        let mut keep_alive = is_keep_alive(version, request.headers());

        if keep_alive && self.slot.is_none() && self.gateway.connections().is_saturated() {
            info!(peer = %self.peer, "too many persistent connections, closing after this response");
            keep_alive = false;
        }

        let target = request.uri().path_and_query().map_or_else(|| request.uri().path(), |target| target.as_str());
        let mut response = match self.gateway.rules().find(target) {
            Some(rule) => {
                keep_alive = false;
                let proxy = ProxySession::new(rule, self.peer)
                    .with_timeout(self.gateway.io_timeout())
                    .with_max_body_size(self.gateway.max_body_size());
                match proxy.run(request).await {
                    Ok(response) => response,
                    Err(e) => {
                        error!(peer = %self.peer, prefix = rule.prefix(), stage = %e.stage(), cause = %e, "proxy round trip failed");
                        return None;
                    }
                }
            }
            None => self.gateway.static_files().handle(&request).await,
        };

        *response.version_mut() = version;
        set_keep_alive(response.headers_mut(), keep_alive);
        Some((response, keep_alive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{ProxyRule, ProxyRuleTable, Upstream};
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn gateway(connections: PersistentConnections, rules: ProxyRuleTable) -> (TempDir, Arc<Gateway>) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), b"spa").unwrap();
        let gateway = Gateway::new(rules, dir.path()).with_connections(connections);
        (dir, Arc::new(gateway))
    }

    fn spawn_session(gateway: &Arc<Gateway>) -> (DuplexStream, JoinHandle<Result<(), SessionError>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let gateway = Arc::clone(gateway);
        let handle = tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(server);
            Session::new(&gateway, peer()).run(reader, writer).await
        });
        (client, handle)
    }

    /// Reads one response with a `content-length` framed body from `client`.
    async fn read_response(client: &mut DuplexStream) -> String {
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let text = String::from_utf8_lossy(&received).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length: "))
                    .map_or(0, |value| value.parse::<usize>().unwrap());
                if received.len() >= end + 4 + length {
                    return text;
                }
            }
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before a full response");
            received.extend_from_slice(&buf[..n]);
        }
    }

    #[tokio::test]
    async fn keeps_http11_alive_and_counts_once() {
        let connections = PersistentConnections::default();
        let (_dir, gateway) = gateway(connections.clone(), ProxyRuleTable::default());
        let (mut client, session) = spawn_session(&gateway);

        for round in 0..3 {
            client.write_all(b"GET /index.html HTTP/1.1\r\nHost: forum\r\n\r\n").await.unwrap();
            let response = read_response(&mut client).await;
            assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
            assert!(response.contains("connection: keep-alive\r\n"));
            assert!(response.ends_with("spa"));
            // the session counts itself right after its first write
            if round > 0 {
                assert_eq!(connections.count(), 1);
            }
        }

        client.shutdown().await.unwrap();
        session.await.unwrap().unwrap();
        assert_eq!(connections.count(), 0);
    }

    #[tokio::test]
    async fn http10_closes_without_keep_alive_token() {
        let connections = PersistentConnections::default();
        let (_dir, gateway) = gateway(connections.clone(), ProxyRuleTable::default());
        let (mut client, session) = spawn_session(&gateway);

        client.write_all(b"GET /index.html HTTP/1.0\r\n\r\n").await.unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(response.contains("connection: close\r\n"));
        session.await.unwrap().unwrap();
        assert_eq!(connections.count(), 0);
    }

    #[tokio::test]
    async fn saturated_gateway_closes_new_sessions() {
        let connections = PersistentConnections::new(2);
        let _held: Vec<_> = (0..3).map(|_| connections.acquire()).collect();
        let (_dir, gateway) = gateway(connections.clone(), ProxyRuleTable::default());
        let (mut client, session) = spawn_session(&gateway);

        client.write_all(b"GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n").await.unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();

        assert!(response.contains("connection: close\r\n"));
        session.await.unwrap().unwrap();
        assert_eq!(connections.count(), 3);
    }

    #[tokio::test]
    async fn counted_sessions_stay_persistent_under_pressure() {
        let connections = PersistentConnections::new(2);
        let (_dir, gateway) = gateway(connections.clone(), ProxyRuleTable::default());
        let (mut client, session) = spawn_session(&gateway);

        for _ in 0..2 {
            client.write_all(b"GET /index.html HTTP/1.1\r\n\r\n").await.unwrap();
            assert!(read_response(&mut client).await.contains("connection: keep-alive\r\n"));
        }
        assert_eq!(connections.count(), 1);

        let held: Vec<_> = (0..2).map(|_| connections.acquire()).collect();
        assert!(connections.is_saturated());

        client.write_all(b"GET /index.html HTTP/1.1\r\n\r\n").await.unwrap();
        assert!(read_response(&mut client).await.contains("connection: keep-alive\r\n"));
        assert_eq!(connections.count(), 3);

        drop(held);
        client.shutdown().await.unwrap();
        session.await.unwrap().unwrap();
        assert_eq!(connections.count(), 0);
    }

    #[tokio::test]
    async fn errors_keep_the_connection() {
        let (_dir, gateway) = gateway(PersistentConnections::default(), ProxyRuleTable::default());
        let (mut client, session) = spawn_session(&gateway);

        client.write_all(b"DELETE /index.html HTTP/1.1\r\n\r\n").await.unwrap();
        let response = read_response(&mut client).await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("connection: keep-alive\r\n"));

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        assert!(read_response(&mut client).await.starts_with("HTTP/1.1 200 OK\r\n"));

        client.shutdown().await.unwrap();
        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_request_aborts_without_response() {
        let connections = PersistentConnections::default();
        let (_dir, gateway) = gateway(connections.clone(), ProxyRuleTable::default());
        let (mut client, session) = spawn_session(&gateway);

        for _ in 0..2 {
            client.write_all(b"GET /index.html HTTP/1.1\r\n\r\n").await.unwrap();
            read_response(&mut client).await;
        }
        assert_eq!(connections.count(), 1);

        client.write_all(b"NOT HTTP AT ALL\r\n\r\n").await.unwrap();
        assert!(matches!(session.await.unwrap(), Err(SessionError::Read(_))));
        assert_eq!(connections.count(), 0);
    }

    #[tokio::test]
    async fn idle_client_times_out() {
        let connections = PersistentConnections::default();
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), b"spa").unwrap();
        let gateway = Arc::new(
            Gateway::new(ProxyRuleTable::default(), dir.path())
                .with_connections(connections.clone())
                .with_io_timeout(Duration::from_millis(100)),
        );
        let (mut client, session) = spawn_session(&gateway);

        for _ in 0..2 {
            client.write_all(b"GET /index.html HTTP/1.1\r\n\r\n").await.unwrap();
            read_response(&mut client).await;
        }
        assert_eq!(connections.count(), 1);

        // half a request head, then silence
        client.write_all(b"GET /index.html HTTP/1.1\r\nHost: fo").await.unwrap();
        assert!(matches!(session.await.unwrap(), Err(SessionError::Timeout { stage: "read", .. })));
        assert_eq!(connections.count(), 0);
    }

    #[tokio::test]
    async fn silent_new_connection_times_out_uncounted() {
        let connections = PersistentConnections::default();
        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(
            Gateway::new(ProxyRuleTable::default(), dir.path())
                .with_connections(connections.clone())
                .with_io_timeout(Duration::from_millis(100)),
        );
        let (_client, session) = spawn_session(&gateway);

        assert!(matches!(session.await.unwrap(), Err(SessionError::Timeout { stage: "read", .. })));
        assert_eq!(connections.count(), 0);
    }

    #[tokio::test]
    async fn failed_proxy_closes_silently() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let rule = ProxyRule::new("/api", Upstream::new(addr.ip().to_string(), addr.port(), "")).unwrap();
        let (_dir, gateway) = gateway(PersistentConnections::default(), ProxyRuleTable::new(vec![rule]));
        let (mut client, session) = spawn_session(&gateway);

        client.write_all(b"GET /api/posts HTTP/1.1\r\n\r\n").await.unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        assert!(response.is_empty());
        session.await.unwrap().unwrap();
    }
}
