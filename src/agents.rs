//! User session, session agents and usage statistics.

use serde::{Deserialize, Serialize};

use crate::types::{id_as_string, null_as_default};

pub const DEFAULT_AGENT_ICON: &str = "🤖";

pub const MONTHLY_TOKEN_LIMIT: u64 = 100_000;
pub const MONTHLY_MESSAGE_LIMIT: u64 = 1_000;
pub const MONTHLY_THREAD_LIMIT: u64 = 100;

/// An agent launched into the user's session.
///
/// Rows come straight from SQL, so every text column may be `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionAgent {
    pub agent_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent_icon: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent_description: String,
    /// Sent by the backend as the agent row's `is_active`.
    #[serde(default, alias = "is_active", deserialize_with = "null_as_default")]
    pub is_current_agent: bool,
    #[serde(default)]
    pub launched_date: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStatistics {
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_month_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_month_messages: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_month_threads: u64,
}

/// Which monthly limits have been reached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsageLimits {
    pub tokens: bool,
    pub messages: bool,
    pub threads: bool,
}

impl UsageStatistics {
    #[must_use]
    pub fn limits(&self) -> UsageLimits {
        UsageLimits {
            tokens: self.current_month_tokens >= MONTHLY_TOKEN_LIMIT,
            messages: self.current_month_messages >= MONTHLY_MESSAGE_LIMIT,
            threads: self.current_month_threads >= MONTHLY_THREAD_LIMIT,
        }
    }

    /// `(tokens, messages, threads)` with thousands separators.
    #[must_use]
    pub fn formatted(&self) -> (String, String, String) {
        (
            group_thousands(self.current_month_tokens),
            group_thousands(self.current_month_messages),
            group_thousands(self.current_month_threads),
        )
    }
}

/// Body of `POST /user/usage/record`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    pub agent_id: i64,
    pub tokens_used: u64,
    pub message_count: u64,
}

/// Payload of `GET /user/session`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    #[serde(deserialize_with = "id_as_string")]
    pub session_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_active: bool,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub modified_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub session_agents: Vec<SessionAgent>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub usage_statistics: UsageStatistics,
}

impl UserSession {
    #[must_use]
    pub fn agent(&self, agent_id: i64) -> Option<&SessionAgent> {
        self.session_agents.iter().find(|a| a.agent_id == agent_id)
    }

    /// Fold a usage record the backend accepted into the local token count.
    /// Message and thread counts are only refreshed from the server.
    pub fn add_usage(&mut self, record: &UsageRecord) {
        let usage = &mut self.usage_statistics;
        usage.current_month_tokens = usage.current_month_tokens.saturating_add(record.tokens_used);
    }
}

/// Icon for a message's agent.
///
/// Tries the agent id, then the agent code (streamed messages carry the code
/// in `agent_name`), then the display name.
#[must_use]
pub fn agent_icon<'a>(
    session: Option<&'a UserSession>,
    agent_id: Option<i64>,
    agent_name: Option<&str>,
) -> &'a str {
    let Some(session) = session else {
        return DEFAULT_AGENT_ICON;
    };
    let by_id = agent_id.and_then(|id| session.agent(id));
    let by_code = || agent_name.and_then(|name| session.session_agents.iter().find(|a| a.agent_code == name));
    let by_name = || agent_name.and_then(|name| session.session_agents.iter().find(|a| a.agent_name == name));

    [by_id, by_code(), by_name()]
        .into_iter()
        .flatten()
        .map(|a| a.agent_icon.as_str())
        .find(|icon| !icon.is_empty())
        .unwrap_or(DEFAULT_AGENT_ICON)
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
#[path = "agents_test.rs"]
mod tests;
