//! One-shot round trips to upstream services.
//!
//! A [`ProxySession`] carries a single request: resolve the upstream, connect, write the
//! rewritten request, read the whole response, close. Every step has its own timeout.
//! Nothing is retried, a failure anywhere ends the round trip with a [`ProxyError`].

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use gate_http::connection::{DEFAULT_MAX_BODY_BYTES, UpstreamConnection};
use gate_http::protocol::{HttpError, SendError};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Request, Response, Uri, Version};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::router::{ProxyRule, RuleError};
use crate::static_files::date::fmt_http_date;
use crate::{IO_TIMEOUT, SERVER_NAME};

const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe a single connection and are never relayed.
const HOP_BY_HOP: [HeaderName; 3] = [header::CONNECTION, HeaderName::from_static("keep-alive"), header::TRANSFER_ENCODING];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Connect,
    Write,
    Read,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Stage::Resolve => "resolve",
            Stage::Connect => "connect",
            Stage::Write => "write",
            Stage::Read => "read",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream target '{target}'")]
    InvalidTarget { target: String },

    #[error("resolve {authority} failed: {source}")]
    Resolve { authority: String, source: io::Error },

    #[error("{authority} resolved to no address")]
    NoAddress { authority: String },

    #[error("connect {authority} failed: {source}")]
    Connect { authority: String, source: io::Error },

    #[error("{stage} to upstream failed: {source}")]
    Exchange { stage: Stage, source: HttpError },

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },
}

impl ProxyError {
    pub fn stage(&self) -> Stage {
        match self {
            ProxyError::InvalidTarget { .. } | ProxyError::Resolve { .. } | ProxyError::NoAddress { .. } => Stage::Resolve,
            ProxyError::Connect { .. } => Stage::Connect,
            ProxyError::Exchange { stage, .. } | ProxyError::Timeout { stage, .. } => *stage,
        }
    }
}

/// Parses an expiry like `12h`: an integer followed by `s`, `m`, `h` or `d`.
pub fn parse_expires(value: &str) -> Result<Duration, RuleError> {
    let invalid = || RuleError::InvalidExpires(value.to_owned());

    let value = value.trim();
    let split = value.len().checked_sub(1).filter(|&i| value.is_char_boundary(i)).ok_or_else(invalid)?;
    let (amount, unit) = value.split_at(split);
    let amount = amount.parse::<u64>().map_err(|_e| invalid())?;
    let unit_secs = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(invalid()),
    };

    amount.checked_mul(unit_secs).map(Duration::from_secs).ok_or_else(invalid)
}

/// A single proxied exchange for one matched [`ProxyRule`].
#[derive(Debug)]
pub struct ProxySession<'a> {
    rule: &'a ProxyRule,
    client_addr: SocketAddr,
    timeout: Duration,
    max_body_size: u64,
}

impl<'a> ProxySession<'a> {
    pub fn new(rule: &'a ProxyRule, client_addr: SocketAddr) -> Self {
        Self { rule, client_addr, timeout: IO_TIMEOUT, max_body_size: DEFAULT_MAX_BODY_BYTES }
    }

    /// Overrides the per step timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: u64) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Forwards `request` upstream and returns the response to relay.
    pub async fn run(self, request: Request<Bytes>) -> Result<Response<Bytes>, ProxyError> {
        let request = self.upstream_request(request)?;
        let upstream = self.rule.upstream();
        let authority = upstream.authority();

        let addrs = self
            .step(Stage::Resolve, tokio::net::lookup_host((upstream.host(), upstream.port())))
            .await?
            .map_err(|source| ProxyError::Resolve { authority: authority.clone(), source })?
            .collect::<Vec<_>>();
        if addrs.is_empty() {
            return Err(ProxyError::NoAddress { authority });
        }

        let stream = self
            .step(Stage::Connect, connect(&addrs))
            .await?
            .map_err(|source| ProxyError::Connect { authority: authority.clone(), source })?;
        debug!(upstream = %authority, target = %request.uri(), "connected to upstream");

        let (reader, writer) = stream.into_split();
        let mut connection = UpstreamConnection::new(reader, writer).with_max_body_size(self.max_body_size);

        self.step(Stage::Write, connection.send_request(request))
            .await?
            .map_err(|source| ProxyError::Exchange { stage: Stage::Write, source })?;
        let response = self
            .step(Stage::Read, connection.read_response())
            .await?
            .map_err(|source| ProxyError::Exchange { stage: Stage::Read, source })?;

        if let Err(e) = connection.shutdown().await
            && !is_not_connected(&e)
        {
            warn!(upstream = %authority, cause = %e, "failed to close upstream connection");
        }

        Ok(self.relay_response(response))
    }

    async fn step<F: Future>(&self, stage: Stage, future: F) -> Result<F::Output, ProxyError> {
        timeout(self.timeout, future).await.map_err(|_elapsed| ProxyError::Timeout { stage, after: self.timeout })
    }

    /// Rewrites the client request for the upstream.
    fn upstream_request(&self, request: Request<Bytes>) -> Result<Request<Bytes>, ProxyError> {
        let (mut parts, body) = request.into_parts();

        let original = parts.uri.path_and_query().map_or_else(|| parts.uri.path(), |target| target.as_str());
        let target = self.rule.rewrite_target(original);
        parts.uri = target.parse::<Uri>().map_err(|_e| ProxyError::InvalidTarget { target })?;
        parts.version = Version::HTTP_11;

        let headers = &mut parts.headers;
        strip_hop_by_hop(headers);
        let host = HeaderValue::try_from(self.rule.upstream().authority())
            .map_err(|_e| ProxyError::InvalidTarget { target: self.rule.upstream().authority() })?;
        headers.insert(header::HOST, host);
        headers.insert(header::USER_AGENT, HeaderValue::from_static(SERVER_NAME));
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));

        if self.rule.need_real_ip() {
            let ip = self.client_addr.ip().to_string();
            let forwarded = match headers.get(&X_FORWARDED_FOR).and_then(|value| value.to_str().ok()) {
                Some(existing) => format!("{existing}, {ip}"),
                None => ip.clone(),
            };
            if let (Ok(real_ip), Ok(forwarded)) = (HeaderValue::try_from(ip), HeaderValue::try_from(forwarded)) {
                headers.insert(X_REAL_IP, real_ip);
                headers.insert(X_FORWARDED_FOR, forwarded);
            }
        }

        Ok(Request::from_parts(parts, body))
    }

    /// Shapes the upstream response before it is handed back to the session.
    fn relay_response(&self, mut response: Response<Bytes>) -> Response<Bytes> {
        strip_hop_by_hop(response.headers_mut());

        if let Some(expires) = self.rule.expires() {
            let headers = response.headers_mut();
            if let Ok(cache_control) = HeaderValue::try_from(format!("public, max-age={}", expires.as_secs())) {
                headers.insert(header::CACHE_CONTROL, cache_control);
            }
            headers.insert(header::EXPIRES, fmt_http_date(SystemTime::now() + expires));
        }

        let status = response.status();
        match self.rule.error_hook() {
            Some(hook) if status.is_client_error() || status.is_server_error() => hook(response),
            _ => response,
        }
    }
}

/// Tries each resolved address in turn and returns the first connection made.
async fn connect(addrs: &[SocketAddr]) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, cause = %e, "connect attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address to connect to")))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

fn is_not_connected(e: &HttpError) -> bool {
    matches!(e, HttpError::ResponseError { source: SendError::Io { source } } if source.kind() == io::ErrorKind::NotConnected)
}
