//! FreddyAI backend access.
//!
//! DESIGN
//! ======
//! [`ChatBackend`] is the seam between chat state and the network so the
//! session can be driven by a mock in tests. [`HttpBackend`] is the real
//! implementation: one reqwest client with a cookie jar, because the backend
//! authenticates with the `FreddyAI_Auth` cookie and tracks the selected
//! thread in a `FreddyAI_CurrentThread` cookie it sets itself.
//!
//! A streamed reply is handed back as a [`ChunkSource`] of raw body bytes.
//! Decoding stays in [`crate::sse`]; each read is bounded by the idle timeout
//! rather than a whole-request timeout, since replies can run for minutes.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::agents::{UsageRecord, UserSession};
use crate::config::{AUTH_COOKIE, ChatConfig};
use crate::threads::{ChatThread, RawThread};
use crate::types::{ChatError, CurrentThread, ThreadMessage};

/// Longest error body echoed back in a [`ChatError::Status`] message.
const MAX_ERROR_BODY_CHARS: usize = 200;

// =============================================================================
// TRAITS
// =============================================================================

/// Raw bytes of a streamed reply, in arrival order.
#[async_trait::async_trait]
pub trait ChunkSource: Send {
    /// Next chunk of the body, or `None` once the body is closed.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`] if the connection fails mid-body and
    /// [`ChatError::StreamTimeout`] if no chunk arrives within the idle timeout.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ChatError>;
}

/// Backend operations used by the chat session. Enables mocking in tests.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    async fn list_threads(&self) -> Result<Vec<ChatThread>, ChatError>;

    /// Create a thread and return its id.
    async fn create_thread(&self, title: &str, icon: &str) -> Result<String, ChatError>;

    async fn delete_thread(&self, thread_id: &str) -> Result<(), ChatError>;

    async fn set_current_thread(&self, thread_id: &str) -> Result<(), ChatError>;

    /// Messages of whichever thread the backend considers current.
    async fn current_thread(&self) -> Result<CurrentThread, ChatError>;

    async fn thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ChatError>;

    /// Post a user message and return the streamed reply body.
    ///
    /// # Errors
    ///
    /// Fails before any byte is streamed on transport errors or a non-OK
    /// status.
    async fn send_message(&self, text: &str) -> Result<Box<dyn ChunkSource>, ChatError>;

    async fn user_session(&self) -> Result<UserSession, ChatError>;

    async fn record_usage(&self, record: &UsageRecord) -> Result<(), ChatError>;

    async fn launch_agent(&self, agent_id: i64) -> Result<(), ChatError>;
}

// =============================================================================
// HTTP BACKEND
// =============================================================================

pub struct HttpBackend {
    http: reqwest::Client,
    base: Url,
    request_timeout: Duration,
    stream_idle: Duration,
}

impl HttpBackend {
    /// Build a backend client from config, seeding the cookie jar with the
    /// auth token when one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConfigParse`] for an unparsable base URL and
    /// [`ChatError::HttpClientBuild`] if the reqwest client fails to build.
    pub fn new(config: &ChatConfig) -> Result<Self, ChatError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ChatError::ConfigParse(format!("base URL: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ChatError::ConfigParse(format!("base URL cannot carry paths: {base}")));
        }

        let jar = Arc::new(Jar::default());
        if let Some(token) = &config.auth_token {
            jar.add_cookie_str(&format!("{AUTH_COOKIE}={token}; Path=/"), &base);
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .cookie_provider(jar)
            .build()
            .map_err(|e| ChatError::HttpClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            stream_idle: Duration::from_secs(config.timeouts.stream_idle_secs),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<serde_json::Value>,
    ) -> Result<T, ChatError> {
        let url = endpoint(&self.base, segments);
        tracing::debug!(%method, %url, "backend request");

        let request = self.http.request(method, url).timeout(self.request_timeout);
        let request = if let Some(json) = body { request.json(&json) } else { request };

        let response = request.send().await.map_err(|e| ChatError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| ChatError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(status_error(status, &text));
        }
        parse_body(&text)
    }
}

#[async_trait::async_trait]
impl ChatBackend for HttpBackend {
    async fn list_threads(&self) -> Result<Vec<ChatThread>, ChatError> {
        let raw: Vec<RawThread> = self.call(Method::GET, &["threads", "list"], None).await?;
        Ok(raw.into_iter().map(ChatThread::from).collect())
    }

    async fn create_thread(&self, title: &str, icon: &str) -> Result<String, ChatError> {
        // The web client sends `title`/`icon` while the route reads the
        // `thread_` prefixed keys; send both.
        let body = json!({ "title": title, "icon": icon, "thread_title": title, "thread_icon": icon });
        let created: CreatedThread = self.call(Method::POST, &["threads", "create"], Some(body)).await?;
        Ok(created.thread_id)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), ChatError> {
        let _: serde_json::Value = self.call(Method::DELETE, &["threads", "delete", thread_id], None).await?;
        Ok(())
    }

    async fn set_current_thread(&self, thread_id: &str) -> Result<(), ChatError> {
        let _: serde_json::Value =
            self.call(Method::POST, &["threads", "set-current", thread_id], None).await?;
        Ok(())
    }

    async fn current_thread(&self) -> Result<CurrentThread, ChatError> {
        self.call(Method::GET, &["threads", "current", "messages"], None).await
    }

    async fn thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ChatError> {
        let page: MessagePage =
            self.call(Method::GET, &["threads", "byid", thread_id, "messages"], None).await?;
        Ok(page.messages)
    }

    async fn send_message(&self, text: &str) -> Result<Box<dyn ChunkSource>, ChatError> {
        let url = endpoint(&self.base, &["threads", "message"]);
        tracing::debug!(%url, chars = text.chars().count(), "posting chat message");

        let request = self
            .http
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .json(&json!({ "message": text }));
        let response = tokio::time::timeout(self.stream_idle, request.send())
            .await
            .map_err(|_| ChatError::StreamTimeout { secs: self.stream_idle.as_secs() })?
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }
        if response.content_length() == Some(0) {
            return Err(ChatError::EmptyBody);
        }

        Ok(Box::new(ResponseChunks { response, idle: self.stream_idle }))
    }

    async fn user_session(&self) -> Result<UserSession, ChatError> {
        self.call(Method::GET, &["user", "session"], None).await
    }

    async fn record_usage(&self, record: &UsageRecord) -> Result<(), ChatError> {
        let body = serde_json::to_value(record).map_err(|e| ChatError::Parse(e.to_string()))?;
        let _: serde_json::Value = self.call(Method::POST, &["user", "usage", "record"], Some(body)).await?;
        Ok(())
    }

    async fn launch_agent(&self, agent_id: i64) -> Result<(), ChatError> {
        let body = json!({ "agent_id": agent_id });
        let _: serde_json::Value = self.call(Method::POST, &["user", "agents", "launch"], Some(body)).await?;
        Ok(())
    }
}

struct ResponseChunks {
    response: reqwest::Response,
    idle: Duration,
}

#[async_trait::async_trait]
impl ChunkSource for ResponseChunks {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ChatError> {
        match tokio::time::timeout(self.idle, self.response.chunk()).await {
            Err(_) => Err(ChatError::StreamTimeout { secs: self.idle.as_secs() }),
            Ok(Err(e)) => Err(ChatError::Transport(e.to_string())),
            Ok(Ok(chunk)) => Ok(chunk.map(|bytes| bytes.to_vec())),
        }
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct CreatedThread {
    thread_id: String,
}

#[derive(Deserialize)]
struct MessagePage {
    #[serde(default)]
    messages: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

// =============================================================================
// HELPERS
// =============================================================================

/// `{base}/api/{segments...}`, with each segment percent-encoded.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().push("api").extend(segments);
    }
    url
}

fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T, ChatError> {
    serde_json::from_str(text).map_err(|e| ChatError::Parse(e.to_string()))
}

fn status_error(status: StatusCode, body: &str) -> ChatError {
    ChatError::Status { status: status.as_u16(), message: error_message(status, body) }
}

/// Best human-readable message for a failed response: the body's `error`
/// field, then a string `detail`, then the raw body, then the status reason.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        let detail = parsed.detail.and_then(|d| d.as_str().map(str::to_owned));
        if let Some(message) = parsed.error.or(detail).filter(|m| !m.is_empty()) {
            return message;
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    }
    status.canonical_reason().unwrap_or("request failed").to_string()
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
