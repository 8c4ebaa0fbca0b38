//! Chat transcript assembler.
//!
//! DESIGN
//! ======
//! Holds one thread's messages plus at most one live [`StreamingFragment`].
//! `message` events fold into the fragment; an agent hand-off or `stream_end`
//! finalizes it into an `assistant` [`ThreadMessage`]. The fragment is never
//! part of `messages` until finalized.
//!
//! Every turn is identified by a [`TurnTicket`]. Loading another thread or
//! clearing the transcript bumps the generation, so events from a turn that
//! was started against the old state are dropped instead of leaking into the
//! new thread. The backend persists those replies on its own; the next reload
//! shows them.
//!
//! ORDERING
//! ========
//! Display order is the order of `messages`. Finalized stream messages carry
//! `message_order == 0` until the thread is reloaded from the server.

use crate::sse::StreamEvent;
use crate::types::{Role, ThreadMessage, now_rfc3339};

/// In-progress reply from a single agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingFragment {
    pub agent_code: String,
    pub content: String,
    /// Latest running token count reported by the backend.
    pub tokens: u64,
    pub created_date: String,
}

/// Handle for one submitted turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnTicket {
    generation: u64,
    turn: u64,
}

/// Where the current turn stands.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TurnState {
    #[default]
    Idle,
    Streaming,
    /// Terminal transport failure; resubmitting starts a new turn.
    Failed(String),
}

/// Effect of applying one stream event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Ticket belongs to an abandoned turn or an earlier thread.
    Stale,
    /// Event carried nothing for the transcript.
    Ignored,
    /// A new fragment started.
    Started,
    /// Content was appended to the live fragment.
    Extended,
    /// The previous agent's fragment was finalized and a new one started.
    HandedOff,
    /// The turn ended; `finalized` is true when a fragment became a message.
    Ended { finalized: bool },
}

#[derive(Debug, Default)]
pub struct Transcript {
    thread_id: Option<String>,
    messages: Vec<ThreadMessage>,
    fragment: Option<StreamingFragment>,
    state: TurnState,
    generation: u64,
    turn: u64,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    #[must_use]
    pub fn messages(&self) -> &[ThreadMessage] {
        &self.messages
    }

    #[must_use]
    pub fn fragment(&self) -> Option<&StreamingFragment> {
        self.fragment.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> &TurnState {
        &self.state
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state == TurnState::Streaming
    }

    /// Error text of the last failed turn, if the transcript is in that state.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            TurnState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Replace the transcript with a freshly loaded thread.
    pub fn load_history(&mut self, thread_id: Option<String>, messages: Vec<ThreadMessage>) {
        self.reset();
        tracing::debug!(
            thread_id = thread_id.as_deref().unwrap_or("-"),
            count = messages.len(),
            "loaded thread history"
        );
        self.thread_id = thread_id;
        self.messages = messages;
    }

    /// Drop all messages and any live fragment.
    pub fn clear(&mut self) {
        self.reset();
        self.thread_id = None;
        self.messages.clear();
    }

    fn reset(&mut self) {
        if self.is_streaming() {
            tracing::debug!(turn = self.turn, "abandoning in-flight turn");
        }
        self.generation += 1;
        self.fragment = None;
        self.state = TurnState::Idle;
    }

    /// Append the user's text optimistically and open a turn.
    ///
    /// Returns `None` without touching the transcript when the text is blank
    /// or a turn is already streaming.
    pub fn submit(&mut self, text: &str) -> Option<TurnTicket> {
        let text = text.trim();
        if text.is_empty() || self.is_streaming() {
            return None;
        }

        let message = ThreadMessage {
            message_id: local_message_id(),
            thread_id: self.thread_id.clone().unwrap_or_default(),
            agent_id: None,
            agent_name: None,
            role: Role::User,
            content: text.to_owned(),
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            message_order: self.messages.len() as u64 + 1,
            is_edited: false,
            edited_date: None,
            created_date: Some(now_rfc3339()),
            modified_date: None,
        };
        self.messages.push(message);

        self.turn += 1;
        self.fragment = None;
        self.state = TurnState::Streaming;
        Some(TurnTicket { generation: self.generation, turn: self.turn })
    }

    fn is_live(&self, ticket: TurnTicket) -> bool {
        self.is_streaming() && ticket.generation == self.generation && ticket.turn == self.turn
    }

    /// Fold one stream event into the transcript.
    pub fn apply(&mut self, ticket: TurnTicket, event: StreamEvent) -> Applied {
        if !self.is_live(ticket) {
            tracing::debug!(?ticket, "dropping event for stale turn");
            return Applied::Stale;
        }

        match event {
            StreamEvent::Message { agent_code, content, tokens, created_date } => {
                let same_agent = self.fragment.as_ref().map(|live| live.agent_code == agent_code);
                match same_agent {
                    Some(true) => {
                        if let Some(live) = self.fragment.as_mut() {
                            live.content.push_str(&content);
                            live.tokens = tokens;
                            if let Some(date) = created_date {
                                live.created_date = date;
                            }
                        }
                        Applied::Extended
                    }
                    Some(false) => {
                        self.finalize_fragment();
                        self.fragment = Some(new_fragment(agent_code, content, tokens, created_date));
                        Applied::HandedOff
                    }
                    None => {
                        self.fragment = Some(new_fragment(agent_code, content, tokens, created_date));
                        Applied::Started
                    }
                }
            }
            StreamEvent::StreamEnd => {
                let finalized = self.finalize_fragment();
                self.state = TurnState::Idle;
                Applied::Ended { finalized }
            }
            StreamEvent::Unknown => Applied::Ignored,
        }
    }

    /// The body closed; treat it as `stream_end` if the backend never sent one.
    pub fn finish(&mut self, ticket: TurnTicket) -> Applied {
        self.apply(ticket, StreamEvent::StreamEnd)
    }

    /// Mark the turn failed. Messages appended so far stay; the live fragment
    /// is discarded.
    pub fn fail(&mut self, ticket: TurnTicket, reason: impl Into<String>) -> bool {
        if !self.is_live(ticket) {
            return false;
        }
        let reason = reason.into();
        tracing::warn!(turn = self.turn, error = %reason, "chat turn failed");
        self.fragment = None;
        self.state = TurnState::Failed(reason);
        true
    }

    fn finalize_fragment(&mut self) -> bool {
        let Some(fragment) = self.fragment.take() else {
            return false;
        };
        self.messages.push(ThreadMessage {
            message_id: local_message_id(),
            thread_id: self.thread_id.clone().unwrap_or_default(),
            agent_id: None,
            agent_name: Some(fragment.agent_code),
            role: Role::Assistant,
            content: fragment.content,
            input_tokens: 0,
            output_tokens: fragment.tokens,
            total_tokens: fragment.tokens,
            message_order: 0,
            is_edited: false,
            edited_date: None,
            created_date: Some(fragment.created_date),
            modified_date: None,
        });
        true
    }
}

fn new_fragment(
    agent_code: String,
    content: String,
    tokens: u64,
    created_date: Option<String>,
) -> StreamingFragment {
    StreamingFragment { agent_code, content, tokens, created_date: created_date.unwrap_or_else(now_rfc3339) }
}

/// Client-side id; never matches a server id and is not stable across reloads.
fn local_message_id() -> String {
    format!("local-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
#[path = "transcript_test.rs"]
mod tests;
