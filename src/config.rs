//! Client configuration parsed from environment variables.

use std::time::Duration;

use crate::types::ChatError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_GROUP_WINDOW_SECS: u64 = 60;
pub const DEFAULT_SESSION_REFRESH_SECS: u64 = 300;

/// Name of the backend's authentication cookie.
pub const AUTH_COOKIE: &str = "FreddyAI_Auth";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
    /// Longest gap tolerated between two chunks of a streamed reply.
    pub stream_idle_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            stream_idle_secs: DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Backend origin; endpoint paths (`/api/...`) are appended to it.
    pub base_url: String,
    /// Value for the `FreddyAI_Auth` cookie, if the caller already holds one.
    pub auth_token: Option<String>,
    pub timeouts: Timeouts,
    /// Window within which consecutive user messages are grouped.
    pub group_window: Duration,
    pub session_refresh: Duration,
    /// Reload the thread after each turn to pick up server ids and ordering.
    pub reload_after_turn: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_token: None,
            timeouts: Timeouts::default(),
            group_window: Duration::from_secs(DEFAULT_GROUP_WINDOW_SECS),
            session_refresh: Duration::from_secs(DEFAULT_SESSION_REFRESH_SECS),
            reload_after_turn: false,
        }
    }
}

impl ChatConfig {
    /// Build typed config from environment variables.
    ///
    /// All optional:
    /// - `FREDDY_BASE_URL`: default `http://127.0.0.1:8000`
    /// - `FREDDY_AUTH_TOKEN`: value of the `FreddyAI_Auth` cookie
    /// - `FREDDY_REQUEST_TIMEOUT_SECS`: default 120
    /// - `FREDDY_CONNECT_TIMEOUT_SECS`: default 10
    /// - `FREDDY_STREAM_IDLE_TIMEOUT_SECS`: default 60
    /// - `FREDDY_GROUP_WINDOW_SECS`: default 60
    /// - `FREDDY_SESSION_REFRESH_SECS`: default 300
    /// - `FREDDY_RELOAD_AFTER_TURN`: `true`/`false`, default `false`
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConfigParse`] for a malformed base URL or boolean.
    pub fn from_env() -> Result<Self, ChatError> {
        let base_url = normalize_base_url(
            &std::env::var("FREDDY_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        )?;
        let auth_token = std::env::var("FREDDY_AUTH_TOKEN").ok().filter(|v| !v.trim().is_empty());
        let timeouts = Timeouts {
            request_secs: env_parse_u64("FREDDY_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("FREDDY_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
            stream_idle_secs: env_parse_u64(
                "FREDDY_STREAM_IDLE_TIMEOUT_SECS",
                DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
            ),
        };
        let group_window =
            Duration::from_secs(env_parse_u64("FREDDY_GROUP_WINDOW_SECS", DEFAULT_GROUP_WINDOW_SECS));
        let session_refresh =
            Duration::from_secs(env_parse_u64("FREDDY_SESSION_REFRESH_SECS", DEFAULT_SESSION_REFRESH_SECS));
        let reload_after_turn = parse_bool(std::env::var("FREDDY_RELOAD_AFTER_TURN").ok().as_deref())?;

        Ok(Self { base_url, auth_token, timeouts, group_window, session_refresh, reload_after_turn })
    }
}

/// Validate the scheme and strip trailing slashes.
///
/// # Errors
///
/// Returns [`ChatError::ConfigParse`] unless the URL is `http://` or `https://`.
pub fn normalize_base_url(raw: &str) -> Result<String, ChatError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ChatError::ConfigParse(format!("base URL must be http(s): {raw}")));
    }
    Ok(trimmed.to_string())
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_bool(raw: Option<&str>) -> Result<bool, ChatError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(false),
        Some("1" | "true" | "yes") => Ok(true),
        Some("0" | "false" | "no") => Ok(false),
        Some(other) => Err(ChatError::ConfigParse(format!("expected a boolean, got '{other}'"))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
