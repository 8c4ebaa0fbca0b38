//! Chat types: wire DTOs shared by the transcript, thread list and backend.
//!
//! DESIGN
//! ======
//! Field names mirror the FreddyAI backend JSON so serde stays schema-driven.
//! Optional numeric fields default to zero and nullable timestamps stay as the
//! raw ISO-8601 strings the server sent; grouping compares them verbatim.

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by chat client operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The HTTP request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Transport(String),

    /// The backend returned a non-success HTTP status.
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The response carried no body to stream from.
    #[error("no response body")]
    EmptyBody,

    /// A response body could not be deserialized.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// No stream chunk arrived within the idle timeout.
    #[error("stream idle for {secs}s")]
    StreamTimeout { secs: u64 },
}

impl ChatError {
    /// Whether resubmitting the same request may succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::EmptyBody
                | Self::StreamTimeout { .. }
                | Self::Status { status: 429 | 500..=599, .. }
        )
    }
}

// =============================================================================
// ROLE
// =============================================================================

/// Author of a thread message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    #[must_use]
    pub fn is_user(self) -> bool {
        self == Self::User
    }
}

impl<'de> Deserialize<'de> for Role {
    // The backend is not consistent about casing ("User", "ASSISTANT").
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(serde::de::Error::unknown_variant(other, &["user", "assistant", "system"])),
        }
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// A persisted or in-flight chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// Server ids may arrive as identity integers; they are kept as strings.
    #[serde(deserialize_with = "id_as_string")]
    pub message_id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default)]
    pub agent_name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub input_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub output_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_tokens: u64,
    /// Server-assigned position. Streamed messages carry `0` until reloaded.
    #[serde(default, deserialize_with = "null_as_default")]
    pub message_order: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_edited: bool,
    #[serde(default)]
    pub edited_date: Option<String>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub modified_date: Option<String>,
}

/// Payload of `GET /threads/current/messages`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CurrentThread {
    #[serde(default)]
    pub has_current_thread: bool,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub thread_title: Option<String>,
    #[serde(default)]
    pub thread_icon: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<ThreadMessage>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_messages: u64,
    /// Informational text, e.g. when no thread exists yet.
    #[serde(default)]
    pub message: Option<String>,
}

/// Treat an explicit `null` like a missing field. SQL-backed rows send `null`
/// for unset counters, flags and text columns.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

/// Accept an id sent as either a JSON string or a JSON integer.
pub(crate) fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Text(id)) => id,
        Some(RawId::Signed(id)) => id.to_string(),
        Some(RawId::Unsigned(id)) => id.to_string(),
        None => String::new(),
    })
}

// =============================================================================
// TIMESTAMPS
// =============================================================================

/// Current UTC time as an RFC 3339 string.
#[must_use]
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// Parse a backend timestamp. Accepts RFC 3339 and naive ISO-8601 (assumed UTC).
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    let naive = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");
    time::PrimitiveDateTime::parse(raw, naive)
        .ok()
        .map(time::PrimitiveDateTime::assume_utc)
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
