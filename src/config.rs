use std::time::Duration;

use tracing::warn;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/v1";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/chat/websocket";
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoints and tuning knobs for one chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// REST base, e.g. `http://host/api/v1`.
    pub api_base_url: String,
    /// STOMP-over-WebSocket endpoint.
    pub ws_url: String,
    pub page_size: usize,
    pub reconnect_delay: Duration,
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Reads `CHAT_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: lookup("CHAT_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            ws_url: lookup("CHAT_WS_URL").unwrap_or(defaults.ws_url),
            page_size: parse_or("CHAT_PAGE_SIZE", &lookup, defaults.page_size)
                .max(1),
            reconnect_delay: Duration::from_millis(parse_or(
                "CHAT_RECONNECT_DELAY_MS",
                &lookup,
                defaults.reconnect_delay.as_millis() as u64,
            )),
            http_timeout: Duration::from_secs(parse_or(
                "CHAT_HTTP_TIMEOUT_SECS",
                &lookup,
                defaults.http_timeout.as_secs(),
            )),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {key}={raw:?}; using default");
            default
        }),
        None => default,
    }
}
