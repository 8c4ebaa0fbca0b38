//! Thread list state for the chat sidebar.
//!
//! DESIGN
//! ======
//! The backend is inconsistent about field names (`thread_title` vs `title`,
//! `total_messages` vs `message_count`), so list rows go through [`RawThread`]
//! and are normalized into [`ChatThread`] on receipt. Everything past the
//! wire boundary sees one shape.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, Time};

use crate::types::parse_timestamp;

pub const DEFAULT_THREAD_TITLE: &str = "Untitled Thread";
pub const DEFAULT_THREAD_ICON: &str = "MessageSquare";

/// A conversation container as shown in the sidebar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatThread {
    pub thread_id: String,
    pub title: String,
    pub icon: String,
    pub created_date: Option<String>,
    pub last_activity_date: Option<String>,
    pub message_count: u64,
}

/// List row exactly as the backend sends it.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawThread {
    pub thread_id: String,
    #[serde(default)]
    pub thread_title: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thread_icon: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub last_activity_date: Option<String>,
    #[serde(default)]
    pub total_messages: Option<u64>,
    #[serde(default)]
    pub message_count: Option<u64>,
}

impl From<RawThread> for ChatThread {
    fn from(raw: RawThread) -> Self {
        Self {
            thread_id: raw.thread_id,
            title: first_non_empty(raw.thread_title, raw.title)
                .unwrap_or_else(|| DEFAULT_THREAD_TITLE.to_owned()),
            icon: first_non_empty(raw.thread_icon, raw.icon)
                .unwrap_or_else(|| DEFAULT_THREAD_ICON.to_owned()),
            created_date: raw.created_date,
            last_activity_date: raw.last_activity_date,
            message_count: raw.total_messages.or(raw.message_count).unwrap_or(0),
        }
    }
}

fn first_non_empty(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary.filter(|v| !v.is_empty()).or_else(|| fallback.filter(|v| !v.is_empty()))
}

// =============================================================================
// ICONS
// =============================================================================

/// Icon tags the sidebar knows how to draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadIcon {
    MessageSquare,
    FileText,
    BarChart,
    Target,
    Folder,
    Clock,
    Calendar,
}

impl FromStr for ThreadIcon {
    type Err = std::convert::Infallible;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Ok(match tag {
            "FileText" => Self::FileText,
            "BarChart" => Self::BarChart,
            "Target" => Self::Target,
            "Folder" => Self::Folder,
            "Clock" => Self::Clock,
            "Calendar" => Self::Calendar,
            _ => Self::MessageSquare,
        })
    }
}

impl ThreadIcon {
    #[must_use]
    pub fn glyph(self) -> &'static str {
        match self {
            Self::MessageSquare => "💬",
            Self::FileText => "📄",
            Self::BarChart => "📊",
            Self::Target => "🎯",
            Self::Folder => "📁",
            Self::Clock => "🕒",
            Self::Calendar => "📅",
        }
    }
}

impl ChatThread {
    #[must_use]
    pub fn icon_kind(&self) -> ThreadIcon {
        self.icon.parse().unwrap_or(ThreadIcon::MessageSquare)
    }
}

// =============================================================================
// TIME BUCKETS
// =============================================================================

/// Threads split by last activity, newest bucket first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupedThreads {
    pub today: Vec<ChatThread>,
    pub yesterday: Vec<ChatThread>,
    pub this_week: Vec<ChatThread>,
    pub older: Vec<ChatThread>,
}

impl GroupedThreads {
    /// Non-empty buckets with their headings, in display order.
    #[must_use]
    pub fn sections(&self) -> Vec<(&'static str, &[ChatThread])> {
        [
            ("Today", self.today.as_slice()),
            ("Yesterday", self.yesterday.as_slice()),
            ("This Week", self.this_week.as_slice()),
            ("Older", self.older.as_slice()),
        ]
        .into_iter()
        .filter(|(_, threads)| !threads.is_empty())
        .collect()
    }
}

/// Bucket threads by `last_activity_date` relative to `now`, using UTC days.
#[must_use]
pub fn group_by_activity(threads: &[ChatThread], now: OffsetDateTime) -> GroupedThreads {
    let today = now.replace_time(Time::MIDNIGHT);
    let yesterday = today - Duration::days(1);
    let week_ago = today - Duration::days(7);

    let mut groups = GroupedThreads::default();
    for thread in threads {
        let activity = thread.last_activity_date.as_deref().and_then(parse_timestamp);
        let bucket = match activity {
            Some(ts) if ts >= today => &mut groups.today,
            Some(ts) if ts >= yesterday => &mut groups.yesterday,
            Some(ts) if ts >= week_ago => &mut groups.this_week,
            _ => &mut groups.older,
        };
        bucket.push(thread.clone());
    }
    groups
}

// =============================================================================
// LIST STATE
// =============================================================================

/// Sidebar state: the thread list, which one is current, and the last error.
#[derive(Clone, Debug, Default)]
pub struct ThreadList {
    pub threads: Vec<ChatThread>,
    pub current_thread_id: Option<String>,
    pub error: Option<String>,
}

impl ThreadList {
    pub fn replace(&mut self, threads: Vec<ChatThread>) {
        self.threads = threads;
        self.error = None;
    }

    #[must_use]
    pub fn current(&self) -> Option<&ChatThread> {
        let id = self.current_thread_id.as_deref()?;
        self.threads.iter().find(|t| t.thread_id == id)
    }

    #[must_use]
    pub fn is_current(&self, thread_id: &str) -> bool {
        self.current_thread_id.as_deref() == Some(thread_id)
    }

    /// Drop a deleted thread. Returns true when it was the current one.
    pub fn remove(&mut self, thread_id: &str) -> bool {
        self.threads.retain(|t| t.thread_id != thread_id);
        if self.is_current(thread_id) {
            self.current_thread_id = None;
            return true;
        }
        false
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }
}

#[cfg(test)]
#[path = "threads_test.rs"]
mod tests;
