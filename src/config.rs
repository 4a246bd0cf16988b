//! Client configuration

use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_KEYWORD_POLL: Duration = Duration::from_millis(5000);

/// Configuration for the chat client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (e.g., `http://localhost:8000`)
    pub api_url: String,
    /// Bearer token sent with every request
    pub api_token: Option<String>,
    /// Idle deadline between frames; `None` waits indefinitely
    pub stream_timeout: Option<Duration>,
    /// Interval between keyword-discovery checks
    pub keyword_poll_interval: Duration,
    /// Chat mode passed with each send
    pub mode: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            stream_timeout: None,
            keyword_poll_interval: DEFAULT_KEYWORD_POLL,
            mode: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            api_url: non_empty("SEO_CHAT_API_URL")
                .map_or(defaults.api_url, |url| url.trim_end_matches('/').to_string()),
            api_token: non_empty("SEO_CHAT_API_TOKEN"),
            stream_timeout: non_empty("SEO_CHAT_STREAM_TIMEOUT_SECS")
                .and_then(|raw| parse_number("SEO_CHAT_STREAM_TIMEOUT_SECS", &raw))
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            keyword_poll_interval: non_empty("SEO_CHAT_KEYWORD_POLL_MS")
                .and_then(|raw| parse_number("SEO_CHAT_KEYWORD_POLL_MS", &raw))
                .filter(|ms| *ms > 0)
                .map_or(defaults.keyword_poll_interval, Duration::from_millis),
            mode: non_empty("SEO_CHAT_MODE"),
        }
    }
}

fn parse_number(key: &str, raw: &str) -> Option<u64> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = raw, "Ignoring unparseable config value");
            None
        }
    }
}
