use std::time::Duration;

use calcrawl_core::AppError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Settings shared by every page extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub user_agent: String,
    pub http_proxy: Option<String>,
    /// Upper bound on one request or navigation.
    pub fetch_timeout: Duration,
    /// Wait after each scroll so lazily loaded content can render.
    pub settle_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_proxy: None,
            fetch_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(1000),
        }
    }
}

impl ClientConfig {
    /// Read configuration from environment variables.
    ///
    /// - `CALCRAWL_USER_AGENT` (optional, desktop Chrome by default)
    /// - `CALCRAWL_HTTP_PROXY` (optional)
    /// - `CALCRAWL_FETCH_TIMEOUT_SECS` (optional, defaults to 30)
    /// - `CALCRAWL_SETTLE_DELAY_MS` (optional, defaults to 1000)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let user_agent = lookup("CALCRAWL_USER_AGENT")
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or(defaults.user_agent);
        let http_proxy = lookup("CALCRAWL_HTTP_PROXY").filter(|p| !p.trim().is_empty());

        let fetch_timeout = match lookup("CALCRAWL_FETCH_TIMEOUT_SECS") {
            None => defaults.fetch_timeout,
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    AppError::ConfigError(format!(
                        "Invalid CALCRAWL_FETCH_TIMEOUT_SECS '{raw}': must be a positive integer"
                    ))
                })?;
                if secs == 0 {
                    return Err(AppError::ConfigError(
                        "CALCRAWL_FETCH_TIMEOUT_SECS must be at least 1".into(),
                    ));
                }
                Duration::from_secs(secs)
            }
        };

        let settle_delay = match lookup("CALCRAWL_SETTLE_DELAY_MS") {
            None => defaults.settle_delay,
            Some(raw) => Duration::from_millis(raw.parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid CALCRAWL_SETTLE_DELAY_MS '{raw}': must be a non-negative integer"
                ))
            })?),
        };

        Ok(Self {
            user_agent,
            http_proxy,
            fetch_timeout,
            settle_delay,
        })
    }
}
