// Control-plane configuration loaded from environment variables.
//
// Decision: Every setting has a default so `cargo run` works without a .env file
// Decision: DATABASE_URL selects the PostgreSQL job store; without it jobs stay in memory
// Decision: MAIL_RELAY_URL selects the HTTP mailer; without it emails are only logged

use std::time::Duration;

use lendwise_core::{
    DEFAULT_LIBRARY_NAME, NOTIFICATION_DELAY, NOTIFICATION_MAX_ATTEMPTS, NOTIFICATION_TIMEOUT,
};
use lendwise_durable::{PollerConfig, RetryPolicy};

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:9000";
pub const DEFAULT_MAIL_FROM: &str = "library@localhost";
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// How status-change notifications are queued and delivered
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    /// Delay before a queued notification becomes claimable
    pub delay: Duration,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retry policy; attempts are capped at 3
    pub retry_policy: RetryPolicy,
    /// Name used in email subjects and signatures
    pub library_name: String,
    pub worker_concurrency: usize,
    pub poller: PollerConfig,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            delay: NOTIFICATION_DELAY,
            timeout: NOTIFICATION_TIMEOUT,
            retry_policy: RetryPolicy::exponential()
                .with_max_attempts(NOTIFICATION_MAX_ATTEMPTS)
                .with_initial_delay(Duration::from_secs(10)),
            library_name: DEFAULT_LIBRARY_NAME.to_string(),
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
            poller: PollerConfig::default(),
        }
    }
}

impl NotificationSettings {
    /// No delay and instant retries, with a tight poll loop. Meant for tests
    /// and local demos.
    pub fn immediate() -> Self {
        Self {
            delay: Duration::ZERO,
            retry_policy: RetryPolicy::fixed(Duration::ZERO, NOTIFICATION_MAX_ATTEMPTS),
            poller: PollerConfig::new()
                .with_min_interval(Duration::from_millis(5))
                .with_max_interval(Duration::from_millis(20)),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_library_name(mut self, name: impl Into<String>) -> Self {
        self.library_name = name.into();
        self
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: Option<String>,
    pub mail_relay_url: Option<String>,
    pub mail_from: String,
    /// Route prefix, e.g. "/api". Empty means routes are served at the root.
    pub api_prefix: String,
    pub cors_allowed_origins: Vec<String>,
    pub notifications: NotificationSettings,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut notifications = NotificationSettings::default();
        if let Some(name) = get("LIBRARY_NAME") {
            notifications.library_name = name;
        }
        if let Some(raw) = get("NOTIFICATION_DELAY_SECS") {
            notifications.delay = Duration::from_secs(parse_number(
                "NOTIFICATION_DELAY_SECS",
                &raw,
            )?);
        }
        if let Some(raw) = get("WORKER_CONCURRENCY") {
            let concurrency: usize = parse_number("WORKER_CONCURRENCY", &raw)?;
            if concurrency == 0 {
                return Err(ConfigError::Invalid {
                    var: "WORKER_CONCURRENCY",
                    value: raw,
                    reason: "must be at least 1".to_string(),
                });
            }
            notifications.worker_concurrency = concurrency;
        }

        let api_prefix = get("API_PREFIX")
            .map(|p| normalize_prefix(&p))
            .unwrap_or_default();

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            http_addr: get("HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
            database_url: get("DATABASE_URL"),
            mail_relay_url: get("MAIL_RELAY_URL"),
            mail_from: get("MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
            api_prefix,
            cors_allowed_origins,
            notifications,
        })
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// "api", "/api/" and "/api" all become "/api"
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
