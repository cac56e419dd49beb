//! Gateway configuration, read from a TOML file at startup.
//!
//! ```toml
//! address = "0.0.0.0"
//! port = 8080
//! doc_root = "/srv/forum/dist"
//! threads = 4
//!
//! # optional, replaces the built-in rule table when present
//! [[proxy]]
//! prefix = "/card"
//! upstream = "http://10.80.43.196:9000/forum/user-avatar"
//! expires = "12h"
//! need_real_ip = false
//! ```

use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use gate_http::connection::DEFAULT_MAX_BODY_BYTES;
use serde::Deserialize;
use thiserror::Error;

use crate::proxy::parse_expires;
use crate::router::{ProxyRule, ProxyRuleTable, RuleError, Upstream, default_rules};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_PATH: &str = "app_config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("'{path}' can't be read: {source}. Please make sure it exists")]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid proxy rule: {0}")]
    Rule(#[from] RuleError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    pub address: IpAddr,
    pub port: u16,
    pub doc_root: PathBuf,
    pub threads: usize,

    /// Largest request or upstream response body the gateway buffers
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,

    #[serde(default, rename = "proxy")]
    pub proxies: Vec<ProxyConfig>,
}

/// One `[[proxy]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub prefix: String,
    pub upstream: String,
    pub expires: Option<String>,
    #[serde(default)]
    pub need_real_ip: bool,
}

fn default_max_body_size() -> u64 {
    DEFAULT_MAX_BODY_BYTES
}

impl GateConfig {
    /// Reads, parses and validates the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_owned(), source })?;
        let config = Self::parse(&content)?;
        Ok(config)
    }

    /// Parses and validates config file content.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: GateConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".to_owned()));
        }
        if self.doc_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("doc_root must not be empty".to_owned()));
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::Invalid("max_body_size must be at least 1".to_owned()));
        }
        self.proxy_rules()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// The configured rules in file order, or the built-in table when there are none.
    pub fn proxy_rules(&self) -> Result<ProxyRuleTable, ConfigError> {
        if self.proxies.is_empty() {
            return Ok(default_rules());
        }

        let rules = self
            .proxies
            .iter()
            .map(|proxy| {
                let mut rule = ProxyRule::new(proxy.prefix.clone(), Upstream::parse(&proxy.upstream)?)?.with_real_ip(proxy.need_real_ip);
                if let Some(expires) = &proxy.expires {
                    rule = rule.with_expires(parse_expires(expires)?);
                }
                Ok(rule)
            })
            .collect::<Result<Vec<_>, RuleError>>()?;

        Ok(ProxyRuleTable::new(rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::io::Write;
    use std::time::Duration;

    const MINIMAL: &str = indoc! {r#"
        address = "127.0.0.1"
        port = 8080
        doc_root = "/srv/forum/dist"
        threads = 4
    "#};

    #[test]
    fn minimal_config_uses_builtin_rules() {
        let config = GateConfig::parse(MINIMAL).unwrap();

        assert_eq!(config.socket_addr(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.doc_root, PathBuf::from("/srv/forum/dist"));
        assert_eq!(config.max_body_size, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.proxy_rules().unwrap().len(), 4);
    }

    #[test]
    fn proxy_tables_replace_builtin_rules() {
        let content = format!(
            "{MINIMAL}{}",
            indoc! {r#"
            [[proxy]]
            prefix = "/card"
            upstream = "http://127.0.0.1:9000/forum/user-avatar"
            expires = "30m"

            [[proxy]]
            prefix = "/api"
            upstream = "http://127.0.0.1:9002"
            need_real_ip = true
            "#}
        );
        let rules = GateConfig::parse(&content).unwrap().proxy_rules().unwrap();

        assert_eq!(rules.len(), 2);
        let card = rules.find("/card/1.png").unwrap();
        assert_eq!(card.expires(), Some(Duration::from_secs(1800)));
        assert!(!card.need_real_ip());
        assert!(rules.find("/api/login").unwrap().need_real_ip());
        assert!(rules.find("/s3/obj.png").is_none());
    }

    #[test]
    fn rejects_invalid_values() {
        let zero_threads = MINIMAL.replace("threads = 4", "threads = 0");
        assert!(matches!(GateConfig::parse(&zero_threads), Err(ConfigError::Invalid(_))));

        let bad_port = MINIMAL.replace("port = 8080", "port = 70000");
        assert!(matches!(GateConfig::parse(&bad_port), Err(ConfigError::Parse(_))));

        let bad_upstream = format!("{MINIMAL}[[proxy]]\nprefix = \"/s3\"\nupstream = \"ftp://storage\"\n");
        assert!(matches!(GateConfig::parse(&bad_upstream), Err(ConfigError::Rule(RuleError::InvalidUpstream { .. }))));

        let bad_expires = format!("{MINIMAL}[[proxy]]\nprefix = \"/s3\"\nupstream = \"http://storage\"\nexpires = \"soon\"\n");
        assert!(matches!(GateConfig::parse(&bad_expires), Err(ConfigError::Rule(RuleError::InvalidExpires(_)))));

        let missing_root = MINIMAL.replace("doc_root = \"/srv/forum/dist\"\n", "");
        assert!(GateConfig::parse(&missing_root).is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = GateConfig::load(file.path()).unwrap();
        assert_eq!(config.threads, 4);

        let missing = GateConfig::load("/nonexistent/app_config.toml");
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
