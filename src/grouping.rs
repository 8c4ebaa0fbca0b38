//! Visual grouping of consecutive messages.
//!
//! Grouping only decides which rows suppress the avatar and header and how
//! bubble corners are drawn. It never reorders or merges the messages
//! themselves.

use std::time::Duration;

use crate::config::DEFAULT_GROUP_WINDOW_SECS;
use crate::types::{Role, ThreadMessage, parse_timestamp};

/// Which side of the transcript a row renders on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl From<Role> for Side {
    fn from(role: Role) -> Self {
        if role.is_user() { Self::Right } else { Self::Left }
    }
}

/// Position of a row inside its visual group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupPosition {
    Single,
    First,
    Middle,
    Last,
}

impl GroupPosition {
    fn from_neighbors(joins_prev: bool, joins_next: bool) -> Self {
        match (joins_prev, joins_next) {
            (false, false) => Self::Single,
            (false, true) => Self::First,
            (true, true) => Self::Middle,
            (true, false) => Self::Last,
        }
    }

    /// Avatar, sender name and timestamp are only drawn on a group's first row.
    #[must_use]
    pub fn shows_header(self) -> bool {
        matches!(self, Self::Single | Self::First)
    }
}

/// Layout decision for one message row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowLayout {
    pub index: usize,
    pub side: Side,
    pub position: GroupPosition,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupingRule {
    /// Max gap between two user messages that still share a group.
    pub user_window: Duration,
}

impl Default for GroupingRule {
    fn default() -> Self {
        Self { user_window: Duration::from_secs(DEFAULT_GROUP_WINDOW_SECS) }
    }
}

impl GroupingRule {
    #[must_use]
    pub fn new(user_window: Duration) -> Self {
        Self { user_window }
    }

    /// Whether `next` visually continues `prev`.
    ///
    /// Assistant and system rows group only within one response burst: same
    /// agent name and the exact same `created_date`. User rows group when sent
    /// within the window.
    #[must_use]
    pub fn joins(&self, prev: &ThreadMessage, next: &ThreadMessage) -> bool {
        let prev_user = prev.role.is_user();
        if prev_user != next.role.is_user() {
            return false;
        }

        if !prev_user {
            return prev.agent_name == next.agent_name
                && prev.created_date.as_deref().unwrap_or_default()
                    == next.created_date.as_deref().unwrap_or_default();
        }

        let prev_ms = epoch_millis(prev.created_date.as_deref());
        let gap = prev_ms.abs_diff(epoch_millis(next.created_date.as_deref()));
        gap < self.user_window.as_millis()
    }

    /// Compute the layout of every row, in transcript order.
    #[must_use]
    pub fn layout(&self, messages: &[ThreadMessage]) -> Vec<RowLayout> {
        let joined: Vec<bool> = messages.windows(2).map(|pair| self.joins(&pair[0], &pair[1])).collect();

        messages
            .iter()
            .enumerate()
            .map(|(index, msg)| {
                let joins_prev = index > 0 && joined[index - 1];
                let joins_next = joined.get(index).copied().unwrap_or(false);
                RowLayout {
                    index,
                    side: Side::from(msg.role),
                    position: GroupPosition::from_neighbors(joins_prev, joins_next),
                }
            })
            .collect()
    }
}

// Missing or unparsable timestamps count as the epoch.
fn epoch_millis(raw: Option<&str>) -> i128 {
    raw.and_then(parse_timestamp)
        .map(|ts| ts.unix_timestamp_nanos() / 1_000_000)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "grouping_test.rs"]
mod tests;
