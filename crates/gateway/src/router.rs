//! Prefix routing of requests to upstream services.
//!
//! A [`ProxyRuleTable`] is an ordered list of [`ProxyRule`]s built once at startup and
//! shared read-only by every session. The first rule whose prefix matches the request
//! target wins; a target no rule matches is served from the document root.
//!
//! Matching is a literal byte comparison of the leading `prefix.len()` bytes, there is
//! no path segment boundary: `/api` matches `/api/login` and `/apiFoo` alike.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Response, Uri};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("proxy prefix must not be empty")]
    EmptyPrefix,

    #[error("invalid upstream url '{url}': {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("invalid expires duration '{0}', expected an integer followed by s, m, h or d")]
    InvalidExpires(String),
}

impl RuleError {
    fn invalid_upstream<S: ToString>(url: &str, reason: S) -> Self {
        Self::InvalidUpstream { url: url.to_owned(), reason: reason.to_string() }
    }
}

/// Where proxied requests go: a plain HTTP origin plus a base path prepended to the
/// forwarded target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    host: String,
    port: u16,
    base_path: String,
}

impl Upstream {
    pub fn new(host: impl Into<String>, port: u16, base_path: impl Into<String>) -> Self {
        let base_path = base_path.into().trim_end_matches('/').to_owned();
        Self { host: host.into(), port, base_path }
    }

    /// Parses `http://host[:port][/base/path]`.
    ///
    /// # Errors
    ///
    /// Fails for other schemes, for urls without a host and for urls carrying a query.
    pub fn parse(url: &str) -> Result<Self, RuleError> {
        let uri = url.parse::<Uri>().map_err(|e| RuleError::invalid_upstream(url, e))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(scheme) => return Err(RuleError::invalid_upstream(url, format!("unsupported scheme {scheme}"))),
            None => return Err(RuleError::invalid_upstream(url, "missing scheme")),
        }
        let host = uri.host().ok_or_else(|| RuleError::invalid_upstream(url, "missing host"))?;
        // IPv6 literals resolve without their brackets
        let host = host.strip_prefix('[').and_then(|host| host.strip_suffix(']')).unwrap_or(host);
        if uri.query().is_some() {
            return Err(RuleError::invalid_upstream(url, "query is not allowed"));
        }

        Ok(Self::new(host, uri.port_u16().unwrap_or(80), uri.path()))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base path without a trailing slash, empty for the origin root.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The `Host` header value for requests to this upstream.
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') { format!("[{}]", self.host) } else { self.host.clone() };
        if self.port == 80 { host } else { format!("{host}:{}", self.port) }
    }
}

/// Rewrites an upstream error response before it is relayed to the client.
pub type ErrorHook = Arc<dyn Fn(Response<Bytes>) -> Response<Bytes> + Send + Sync>;

#[derive(Clone)]
pub struct ProxyRule {
    prefix: String,
    upstream: Upstream,
    expires: Option<Duration>,
    need_real_ip: bool,
    error_hook: Option<ErrorHook>,
}

impl ProxyRule {
    /// # Errors
    ///
    /// Fails when `prefix` is empty, a rule like that would swallow every request.
    pub fn new(prefix: impl Into<String>, upstream: Upstream) -> Result<Self, RuleError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(RuleError::EmptyPrefix);
        }
        Ok(Self { prefix, upstream, expires: None, need_real_ip: false, error_hook: None })
    }

    /// Relayed responses get `Cache-Control` and `Expires` for `expires` from now.
    #[must_use]
    pub fn with_expires(mut self, expires: Duration) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Forwards the client address in `X-Real-IP` and `X-Forwarded-For`.
    #[must_use]
    pub fn with_real_ip(mut self, need_real_ip: bool) -> Self {
        self.need_real_ip = need_real_ip;
        self
    }

    /// Runs `hook` on upstream responses with a 4xx or 5xx status.
    #[must_use]
    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Response<Bytes>) -> Response<Bytes> + Send + Sync + 'static,
    {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    pub fn expires(&self) -> Option<Duration> {
        self.expires
    }

    pub fn need_real_ip(&self) -> bool {
        self.need_real_ip
    }

    pub fn error_hook(&self) -> Option<&ErrorHook> {
        self.error_hook.as_ref()
    }

    /// Literal, case-sensitive prefix comparison.
    pub fn matches(&self, target: &str) -> bool {
        target.as_bytes().starts_with(self.prefix.as_bytes())
    }

    /// Replaces the matched prefix with the upstream base path.
    ///
    /// The remainder is appended to the base path as is, so `/card?size=64` becomes
    /// `/forum/user-avatar?size=64`. A `/` is prepended only when the joined target would
    /// not start with one, so `/s3` becomes `/` and `/apiFoo` becomes `/Foo` for rules
    /// whose upstream has no base path.
    pub fn rewrite_target(&self, target: &str) -> String {
        let rest = target.get(self.prefix.len()..).unwrap_or_default();
        let rewritten = format!("{}{rest}", self.upstream.base_path());
        if rewritten.starts_with('/') { rewritten } else { format!("/{rewritten}") }
    }
}

impl fmt::Debug for ProxyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRule")
            .field("prefix", &self.prefix)
            .field("upstream", &self.upstream)
            .field("expires", &self.expires)
            .field("need_real_ip", &self.need_real_ip)
            .field("error_hook", &self.error_hook.is_some())
            .finish()
    }
}

/// Ordered proxy rules, first match wins.
#[derive(Debug, Clone, Default)]
pub struct ProxyRuleTable {
    rules: Vec<ProxyRule>,
}

impl ProxyRuleTable {
    pub fn new(rules: Vec<ProxyRule>) -> Self {
        Self { rules }
    }

    pub fn find(&self, target: &str) -> Option<&ProxyRule> {
        self.rules.iter().find(|rule| rule.matches(target))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProxyRule> {
        self.rules.iter()
    }
}

/// The rule table of the forum deployment, used when the config declares no rules.
pub fn default_rules() -> ProxyRuleTable {
    const OBJECT_STORAGE: &str = "10.80.43.196";
    const SEARCH: &str = "10.80.42.189";

    let rules = [
        ("/s3", Upstream::new(OBJECT_STORAGE, 9000, ""), None),
        ("/api", Upstream::new(OBJECT_STORAGE, 9002, ""), None),
        ("/card", Upstream::new(OBJECT_STORAGE, 9000, "/forum/user-avatar"), Some(Duration::from_secs(12 * 60 * 60))),
        ("/meili", Upstream::new(SEARCH, 7700, ""), None),
    ];

    let rules = rules
        .into_iter()
        .map(|(prefix, upstream, expires)| ProxyRule { prefix: prefix.to_owned(), upstream, expires, need_real_ip: false, error_hook: None })
        .collect();
    ProxyRuleTable::new(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn rule(prefix: &str, upstream: &str) -> ProxyRule {
        ProxyRule::new(prefix, Upstream::parse(upstream).unwrap()).unwrap()
    }

    #[test]
    fn literal_prefix_matching() {
        let api = rule("/api", "http://10.80.43.196:9002");

        assert!(api.matches("/api"));
        assert!(api.matches("/api/x"));
        assert!(api.matches("/apiFoo"));
        assert!(!api.matches("/ap"));
        assert!(!api.matches("/API/x"));
        assert!(!api.matches("/static/api"));
    }

    #[test]
    fn first_match_wins() {
        let table = ProxyRuleTable::new(vec![rule("/api", "http://a:1"), rule("/api/v2", "http://b:2")]);

        assert_eq!(table.find("/api/v2/posts").unwrap().upstream().host(), "a");
        assert!(table.find("/index.html").is_none());
    }

    #[test]
    fn rewrites_with_base_path() {
        let card = rule("/card", "http://10.80.43.196:9000/forum/user-avatar");
        assert_eq!(card.rewrite_target("/card/42.png"), "/forum/user-avatar/42.png");
        assert_eq!(card.rewrite_target("/card?size=64"), "/forum/user-avatar?size=64");
        assert_eq!(card.rewrite_target("/card"), "/forum/user-avatar");

        let s3 = rule("/s3", "http://10.80.43.196:9000");
        assert_eq!(s3.rewrite_target("/s3/obj.png"), "/obj.png");
        assert_eq!(s3.rewrite_target("/s3"), "/");

        let api = rule("/api", "http://10.80.43.196:9002/");
        assert_eq!(api.rewrite_target("/apiFoo"), "/Foo");
        assert_eq!(api.rewrite_target("/api?q=1"), "/?q=1");

        let versioned = rule("/api", "http://10.80.43.196:9002/v1");
        assert_eq!(versioned.rewrite_target("/apiFoo"), "/v1Foo");
        assert_eq!(versioned.rewrite_target("/api/posts"), "/v1/posts");
    }

    #[test]
    fn parses_upstreams() {
        let upstream = Upstream::parse("http://10.80.43.196:9000/forum/user-avatar/").unwrap();
        assert_eq!(upstream.host(), "10.80.43.196");
        assert_eq!(upstream.port(), 9000);
        assert_eq!(upstream.base_path(), "/forum/user-avatar");
        assert_eq!(upstream.authority(), "10.80.43.196:9000");

        let upstream = Upstream::parse("http://search.internal").unwrap();
        assert_eq!(upstream.port(), 80);
        assert_eq!(upstream.base_path(), "");
        assert_eq!(upstream.authority(), "search.internal");

        let upstream = Upstream::parse("http://[::1]:9000/bucket").unwrap();
        assert_eq!(upstream.host(), "::1");
        assert_eq!(upstream.authority(), "[::1]:9000");
        assert_eq!(Upstream::parse("http://[fe80::1]").unwrap().authority(), "[fe80::1]");

        assert!(Upstream::parse("https://10.80.43.196").is_err());
        assert!(Upstream::parse("10.80.43.196:9000").is_err());
        assert!(Upstream::parse("http://host/path?x=1").is_err());
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert!(matches!(ProxyRule::new("", Upstream::new("a", 80, "")), Err(RuleError::EmptyPrefix)));
    }

    #[test]
    fn deployment_table() {
        let table = default_rules();
        let prefixes: Vec<_> = table.iter().map(ProxyRule::prefix).collect();
        assert_eq!(prefixes, ["/s3", "/api", "/card", "/meili"]);

        let card = table.find("/card/7.webp").unwrap();
        assert_eq!(card.expires(), Some(Duration::from_secs(43_200)));
        assert_eq!(card.rewrite_target("/card/7.webp"), "/forum/user-avatar/7.webp");
        assert_eq!(table.find("/meili/indexes").unwrap().upstream().port(), 7700);
    }

    #[test]
    fn error_hook_is_kept() {
        let rule = rule("/api", "http://a:1").with_error_hook(|mut response| {
            *response.status_mut() = StatusCode::BAD_GATEWAY;
            response
        });
        let hook = rule.error_hook().unwrap();
        assert_eq!(hook(Response::new(Bytes::new())).status(), StatusCode::BAD_GATEWAY);
    }
}
