//! Client configuration loaded from environment variables.
//!
//! Every setting has a default that targets a backend on localhost, so the
//! client runs with zero configuration during development.

use std::time::Duration;

use aurora_net::websocket::DEFAULT_CHANNEL_CAPACITY;
use aurora_net::{Endpoints, NetError};
use aurora_shared::constants::{DEFAULT_API_URL, DEFAULT_WS_URL};

use crate::session::{SessionOptions, DEFAULT_HISTORY_TIMEOUT, DEFAULT_SEND_TIMEOUT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the REST API.
    /// Env: `AURORA_API_URL`
    pub api_url: String,

    /// Base URL of the live WebSocket endpoint.
    /// Env: `AURORA_WS_URL`
    pub ws_url: String,

    /// Env: `AURORA_HISTORY_TIMEOUT_SECS` (0 = no timeout)
    pub history_timeout: Option<Duration>,

    /// Env: `AURORA_SEND_TIMEOUT_SECS` (0 = no timeout)
    pub send_timeout: Option<Duration>,

    /// Frame queue size per live connection, at least 1.
    /// Env: `AURORA_CHANNEL_CAPACITY`
    pub channel_capacity: usize,

    /// Print messages as JSON lines instead of text.
    /// Env: `AURORA_JSON_OUTPUT` (true/false)
    pub json_output: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            history_timeout: Some(DEFAULT_HISTORY_TIMEOUT),
            send_timeout: Some(DEFAULT_SEND_TIMEOUT),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            json_output: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("AURORA_API_URL") {
            config.api_url = url;
        }

        if let Some(url) = lookup("AURORA_WS_URL") {
            config.ws_url = url;
        }

        if let Some(raw) = lookup("AURORA_HISTORY_TIMEOUT_SECS") {
            match parse_timeout(&raw) {
                Some(timeout) => config.history_timeout = timeout,
                None => tracing::warn!(
                    value = %raw,
                    "Invalid AURORA_HISTORY_TIMEOUT_SECS, using default"
                ),
            }
        }

        if let Some(raw) = lookup("AURORA_SEND_TIMEOUT_SECS") {
            match parse_timeout(&raw) {
                Some(timeout) => config.send_timeout = timeout,
                None => tracing::warn!(
                    value = %raw,
                    "Invalid AURORA_SEND_TIMEOUT_SECS, using default"
                ),
            }
        }

        if let Some(raw) = lookup("AURORA_CHANNEL_CAPACITY") {
            match raw.trim().parse::<usize>() {
                Ok(capacity) => config.channel_capacity = capacity.max(1),
                Err(_) => tracing::warn!(
                    value = %raw,
                    "Invalid AURORA_CHANNEL_CAPACITY, using default"
                ),
            }
        }

        if let Some(raw) = lookup("AURORA_JSON_OUTPUT") {
            config.json_output = raw.trim().eq_ignore_ascii_case("true") || raw.trim() == "1";
        }

        config
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            history_timeout: self.history_timeout,
            send_timeout: self.send_timeout,
        }
    }

    pub fn endpoints(&self) -> Result<Endpoints, NetError> {
        Endpoints::new(&self.api_url, &self.ws_url)
    }
}

/// Whole seconds; `0` disables the timeout.
fn parse_timeout(raw: &str) -> Option<Option<Duration>> {
    let secs = raw.trim().parse::<u64>().ok()?;
    Some((secs > 0).then(|| Duration::from_secs(secs)))
}
