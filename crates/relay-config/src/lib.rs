//! Environment-backed configuration for the relay.
//!
//! Mirrors the shape of a typical service `config.rs` in this codebase: a
//! single `RelayConfig::from_env()` entry point, `unwrap_or_else` defaults for
//! optional settings, and hard errors only for settings with no safe default.
//! Never a process-global: callers construct one `RelayConfig` and thread it
//! through the publisher, pool, and topology manager explicitly.

use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required but not set")]
    Missing(&'static str),
    #[error("{0} could not be parsed: {1}")]
    Invalid(&'static str, String),
}

/// Broker auth method, mutually prioritized: token, then user/password, then
/// nkeys seed, then a credentials file. Only the first one present is used.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    Token(String),
    UserPassword { user: String, password: String },
    NkeysSeed(String),
    CredentialsFile(String),
    None,
}

#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub ca_file: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
}

impl TlsConfig {
    fn from_env() -> Option<Self> {
        let ca_file = env::var("RELAY_TLS_CA_FILE").ok();
        let cert_file = env::var("RELAY_TLS_CERT_FILE").ok();
        let key_file = env::var("RELAY_TLS_KEY_FILE").ok();
        if ca_file.is_none() && cert_file.is_none() && key_file.is_none() {
            None
        } else {
            Some(TlsConfig { ca_file, cert_file, key_file })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Development,
    Production,
    Testing,
}

impl Preset {
    fn from_env_str(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "production" | "prod" => Preset::Production,
            "testing" | "test" => Preset::Testing,
            _ => Preset::Development,
        }
    }

    /// Default worker concurrency for this preset; overridden by an explicit
    /// `RELAY_CONCURRENCY` env var if present.
    fn default_concurrency(self) -> u32 {
        match self {
            Preset::Development => 2,
            Preset::Production => 10,
            Preset::Testing => 1,
        }
    }

    fn default_max_deliver(self) -> u32 {
        match self {
            Preset::Development => 5,
            Preset::Production => 10,
            Preset::Testing => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub preset: Preset,
    pub nats_urls: Vec<String>,
    pub env: String,
    pub app_name: String,
    pub concurrency: u32,
    pub max_deliver: u32,
    pub ack_wait: Duration,
    pub backoff: Vec<Duration>,
    pub use_outbox: bool,
    pub use_inbox: bool,
    pub use_dlq: bool,
    pub dlq_max_attempts: u32,
    pub dlq_stream_suffix: String,
    pub outbox_table: String,
    pub inbox_table: String,
    pub auth: AuthConfig,
    pub tls: Option<TlsConfig>,
    pub connection_pool_size: u32,
    pub connection_pool_timeout: Duration,
    pub database_url: Option<String>,
    pub fetch_timeout: Duration,
    pub staleness_window: Duration,
    pub outbox_poll_interval: Duration,
}

impl RelayConfig {
    fn parse_urls(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    fn parse_backoff(value: &str) -> Vec<Duration> {
        value
            .split(',')
            .filter_map(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .collect()
    }

    fn resolve_auth() -> AuthConfig {
        if let Ok(token) = env::var("RELAY_AUTH_TOKEN") {
            return AuthConfig::Token(token);
        }
        if let (Ok(user), Ok(password)) = (env::var("RELAY_AUTH_USER"), env::var("RELAY_AUTH_PASSWORD")) {
            return AuthConfig::UserPassword { user, password };
        }
        if let Ok(seed) = env::var("RELAY_NKEYS_SEED") {
            return AuthConfig::NkeysSeed(seed);
        }
        if let Ok(path) = env::var("RELAY_USER_CREDENTIALS") {
            return AuthConfig::CredentialsFile(path);
        }
        AuthConfig::None
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let preset = Preset::from_env_str(&env::var("RELAY_PRESET").unwrap_or_else(|_| "development".into()));

        let nats_urls_raw = env::var("RELAY_NATS_URLS").unwrap_or_else(|_| "nats://127.0.0.1:4222".into());
        let nats_urls = Self::parse_urls(&nats_urls_raw);

        let env_name = env::var("RELAY_ENV").map_err(|_| ConfigError::Missing("RELAY_ENV"))?;
        let app_name = env::var("RELAY_APP_NAME").map_err(|_| ConfigError::Missing("RELAY_APP_NAME"))?;

        let concurrency = env::var("RELAY_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| preset.default_concurrency())
            .clamp(1, 1000);

        let max_deliver = env::var("RELAY_MAX_DELIVER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| preset.default_max_deliver());

        let ack_wait_ms: u64 = env::var("RELAY_ACK_WAIT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30_000);

        let backoff = env::var("RELAY_BACKOFF_MS")
            .ok()
            .map(|v| Self::parse_backoff(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vec![Duration::from_millis(100), Duration::from_millis(500), Duration::from_millis(1000)]);

        let use_outbox = env::var("RELAY_USE_OUTBOX").map(|v| v != "false" && v != "0").unwrap_or(true);
        let use_inbox = env::var("RELAY_USE_INBOX").map(|v| v != "false" && v != "0").unwrap_or(true);
        let use_dlq = env::var("RELAY_USE_DLQ").map(|v| v != "false" && v != "0").unwrap_or(true);

        let dlq_max_attempts = env::var("RELAY_DLQ_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(max_deliver);

        let dlq_stream_suffix = env::var("RELAY_DLQ_STREAM_SUFFIX").unwrap_or_else(|_| "dlq".into());

        let outbox_table = env::var("RELAY_OUTBOX_TABLE").unwrap_or_else(|_| "relay_outbox".into());
        let inbox_table = env::var("RELAY_INBOX_TABLE").unwrap_or_else(|_| "relay_inbox".into());

        let connection_pool_size = env::var("RELAY_CONNECTION_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        let connection_pool_timeout_secs: u64 = env::var("RELAY_CONNECTION_POOL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let database_url = env::var("DATABASE_URL").ok();

        let fetch_timeout_ms: u64 = env::var("RELAY_FETCH_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5_000);

        let staleness_window_secs: u64 = env::var("RELAY_STALENESS_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        let outbox_poll_interval_ms: u64 = env::var("RELAY_OUTBOX_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1_000);

        Ok(Self {
            preset,
            nats_urls,
            env: env_name,
            app_name,
            concurrency,
            max_deliver,
            ack_wait: Duration::from_millis(ack_wait_ms),
            backoff,
            use_outbox,
            use_inbox,
            use_dlq,
            dlq_max_attempts,
            dlq_stream_suffix,
            outbox_table,
            inbox_table,
            auth: Self::resolve_auth(),
            tls: TlsConfig::from_env(),
            connection_pool_size,
            connection_pool_timeout: Duration::from_secs(connection_pool_timeout_secs),
            database_url,
            fetch_timeout: Duration::from_millis(fetch_timeout_ms),
            staleness_window: Duration::from_secs(staleness_window_secs),
            outbox_poll_interval: Duration::from_millis(outbox_poll_interval_ms),
        })
    }

    /// Subject prefix shared by every subject this config's relay builds:
    /// `{env}.{app_name}`.
    pub fn subject_prefix(&self) -> String {
        format!("{}.{}", self.env, self.app_name)
    }

    pub fn dlq_subject(&self) -> String {
        format!("{}.{}", self.subject_prefix(), self.dlq_stream_suffix)
    }

    pub fn stream_name(&self) -> String {
        format!("{}_{}", self.env, self.app_name)
    }

    #[cfg(test)]
    pub fn test_defaults(env: &str, app_name: &str) -> Self {
        Self {
            preset: Preset::Testing,
            nats_urls: vec!["nats://127.0.0.1:4222".into()],
            env: env.into(),
            app_name: app_name.into(),
            concurrency: 1,
            max_deliver: 3,
            ack_wait: Duration::from_secs(30),
            backoff: vec![Duration::from_millis(100), Duration::from_millis(500), Duration::from_millis(1000)],
            use_outbox: true,
            use_inbox: true,
            use_dlq: true,
            dlq_max_attempts: 3,
            dlq_stream_suffix: "dlq".into(),
            outbox_table: "relay_outbox".into(),
            inbox_table: "relay_inbox".into(),
            auth: AuthConfig::None,
            tls: None,
            connection_pool_size: 1,
            connection_pool_timeout: Duration::from_secs(5),
            database_url: None,
            fetch_timeout: Duration::from_secs(5),
            staleness_window: Duration::from_secs(300),
            outbox_poll_interval: Duration::from_millis(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_prefix_joins_env_and_app() {
        let cfg = RelayConfig::test_defaults("test", "shop");
        assert_eq!(cfg.subject_prefix(), "test.shop");
        assert_eq!(cfg.dlq_subject(), "test.shop.dlq");
        assert_eq!(cfg.stream_name(), "test_shop");
    }

    #[test]
    fn preset_defaults_scale_with_environment() {
        assert_eq!(Preset::Development.default_concurrency(), 2);
        assert_eq!(Preset::Production.default_concurrency(), 10);
        assert_eq!(Preset::Testing.default_concurrency(), 1);
    }

    #[test]
    fn parse_urls_trims_and_drops_empty_entries() {
        let urls = RelayConfig::parse_urls("nats://a:4222, nats://b:4222,,");
        assert_eq!(urls, vec!["nats://a:4222", "nats://b:4222"]);
    }

    #[test]
    fn parse_backoff_builds_duration_schedule() {
        let backoff = RelayConfig::parse_backoff("100,500,1000");
        assert_eq!(backoff, vec![Duration::from_millis(100), Duration::from_millis(500), Duration::from_millis(1000)]);
    }
}
