//! Chat session: the state a chat window works against.
//!
//! DESIGN
//! ======
//! [`ChatSession`] owns the backend handle, the transcript, the thread list
//! and the user session. It is driven through `&mut self`, so a turn is read
//! to completion by a single consumer and no locking is needed. Each chunk is
//! decoded and folded into the transcript before the next read.
//!
//! Errors from list/session loads are recorded and logged rather than
//! propagated wherever the chat can keep working without them.

use std::time::{Duration, Instant};

use crate::agents::{UsageRecord, UserSession, agent_icon};
use crate::api::{ChatBackend, ChunkSource};
use crate::config::ChatConfig;
use crate::grouping::{GroupingRule, RowLayout};
use crate::sse::{SseDecoder, StreamEvent};
use crate::threads::ThreadList;
use crate::transcript::{Applied, Transcript, TurnTicket};
use crate::types::{ChatError, ThreadMessage};

/// Result of [`ChatSession::send_message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank text or a turn already streaming; nothing was sent.
    Ignored,
    /// The reply finished; `appended` counts the user message plus every
    /// finalized assistant message.
    Completed { appended: usize },
}

pub struct ChatSession<B: ChatBackend> {
    backend: B,
    transcript: Transcript,
    threads: ThreadList,
    user: Option<UserSession>,
    user_error: Option<String>,
    grouping: GroupingRule,
    refresh_every: Duration,
    last_refresh: Option<Instant>,
    reload_after_turn: bool,
}

impl<B: ChatBackend> ChatSession<B> {
    #[must_use]
    pub fn new(backend: B, config: &ChatConfig) -> Self {
        Self {
            backend,
            transcript: Transcript::new(),
            threads: ThreadList::default(),
            user: None,
            user_error: None,
            grouping: GroupingRule::new(config.group_window),
            refresh_every: config.session_refresh,
            last_refresh: None,
            reload_after_turn: config.reload_after_turn,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn threads(&self) -> &ThreadList {
        &self.threads
    }

    pub fn user_session(&self) -> Option<&UserSession> {
        self.user.as_ref()
    }

    /// Last error from loading the user session, if the latest load failed.
    pub fn user_error(&self) -> Option<&str> {
        self.user_error.as_deref()
    }

    /// Group layout of the finalized messages.
    pub fn layout(&self) -> Vec<RowLayout> {
        self.grouping.layout(self.transcript.messages())
    }

    /// Icon shown next to a message's agent.
    pub fn icon_for(&self, message: &ThreadMessage) -> &str {
        agent_icon(self.user.as_ref(), message.agent_id, message.agent_name.as_deref())
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Load the user session, the thread list and the current thread.
    ///
    /// # Errors
    ///
    /// Fails only if the current thread cannot be loaded. Session and list
    /// failures are recorded in [`Self::user_error`] and [`ThreadList::error`].
    pub async fn init(&mut self) -> Result<(), ChatError> {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "continuing init with partial session state");
        }
        self.reload_current().await
    }

    /// Reload the user session and the thread list.
    ///
    /// # Errors
    ///
    /// Returns the first failure after attempting both loads.
    pub async fn refresh(&mut self) -> Result<(), ChatError> {
        let user = self.load_user_session().await;
        let threads = self.load_threads().await;
        self.last_refresh = Some(Instant::now());
        user.and(threads)
    }

    /// [`Self::refresh`] when the configured interval has elapsed. Returns
    /// whether a refresh ran.
    ///
    /// # Errors
    ///
    /// Propagates the refresh failure.
    pub async fn refresh_if_due(&mut self) -> Result<bool, ChatError> {
        let due = self.last_refresh.is_none_or(|at| at.elapsed() >= self.refresh_every);
        if !due {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    /// Drop all in-memory state. Any turn started before this is abandoned.
    pub fn teardown(&mut self) {
        tracing::debug!("tearing down chat session");
        self.transcript.clear();
        self.threads = ThreadList::default();
        self.user = None;
        self.user_error = None;
        self.last_refresh = None;
    }

    async fn load_user_session(&mut self) -> Result<(), ChatError> {
        match self.backend.user_session().await {
            Ok(user) => {
                self.user = Some(user);
                self.user_error = None;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load user session");
                self.user_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn load_threads(&mut self) -> Result<(), ChatError> {
        match self.backend.list_threads().await {
            Ok(threads) => {
                self.threads.replace(threads);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load threads");
                self.threads.set_error(format!("Failed to load threads: {e}"));
                Err(e)
            }
        }
    }

    // =========================================================================
    // THREADS
    // =========================================================================

    /// Load whichever thread the backend has marked current.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the transcript is left untouched.
    pub async fn reload_current(&mut self) -> Result<(), ChatError> {
        let current = self.backend.current_thread().await?;
        let thread_id = if current.has_current_thread { current.thread_id } else { None };
        self.threads.current_thread_id.clone_from(&thread_id);
        self.transcript.load_history(thread_id, current.messages);
        Ok(())
    }

    /// Make `thread_id` current on the backend and load its messages.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the transcript is left untouched.
    pub async fn select_thread(&mut self, thread_id: &str) -> Result<(), ChatError> {
        self.backend.set_current_thread(thread_id).await?;
        let messages = self.backend.thread_messages(thread_id).await?;
        tracing::info!(thread_id, count = messages.len(), "selected thread");
        self.threads.current_thread_id = Some(thread_id.to_owned());
        self.transcript.load_history(Some(thread_id.to_owned()), messages);
        Ok(())
    }

    /// Create a thread, switch to it and refresh the list. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns the backend error from creating or selecting the thread.
    pub async fn new_thread(&mut self, title: &str, icon: &str) -> Result<String, ChatError> {
        let thread_id = self.backend.create_thread(title, icon).await?;
        tracing::info!(%thread_id, title, "created thread");
        self.select_thread(&thread_id).await?;
        // A stale sidebar is logged and kept on the list's error.
        self.load_threads().await.ok();
        Ok(thread_id)
    }

    /// Delete a thread. Deleting the current one clears the transcript.
    ///
    /// # Errors
    ///
    /// Returns the backend error; local state is only changed on success.
    pub async fn delete_thread(&mut self, thread_id: &str) -> Result<(), ChatError> {
        self.backend.delete_thread(thread_id).await?;
        if self.threads.remove(thread_id) {
            self.transcript.clear();
        }
        tracing::info!(thread_id, "deleted thread");
        Ok(())
    }

    async fn reload_thread(&mut self) -> Result<(), ChatError> {
        match self.transcript.thread_id().map(str::to_owned) {
            Some(thread_id) => {
                let messages = self.backend.thread_messages(&thread_id).await?;
                self.transcript.load_history(Some(thread_id), messages);
                Ok(())
            }
            None => self.reload_current().await,
        }
    }

    // =========================================================================
    // TURNS
    // =========================================================================

    /// Send `text` and read the streamed reply into the transcript.
    ///
    /// # Errors
    ///
    /// Returns the transport error. The turn is then marked failed, the live
    /// fragment is dropped and every message appended so far is kept.
    pub async fn send_message(&mut self, text: &str) -> Result<TurnOutcome, ChatError> {
        self.send_message_observed(text, |_, _| {}).await
    }

    /// [`Self::send_message`], calling `observer` after each event is applied.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send_message`].
    pub async fn send_message_observed<F>(
        &mut self,
        text: &str,
        mut observer: F,
    ) -> Result<TurnOutcome, ChatError>
    where
        F: FnMut(&StreamEvent, &Applied) + Send,
    {
        let before = self.transcript.messages().len();
        let Some(ticket) = self.transcript.submit(text) else {
            return Ok(TurnOutcome::Ignored);
        };

        if let Err(e) = self.stream_turn(ticket, text.trim(), &mut observer).await {
            self.transcript.fail(ticket, e.to_string());
            return Err(e);
        }
        let appended = self.transcript.messages().len().saturating_sub(before);

        // A first message lazily creates a thread on the backend; pick up its id.
        let new_thread = self.transcript.thread_id().is_none();
        if self.reload_after_turn || new_thread {
            if let Err(e) = self.reload_thread().await {
                tracing::warn!(error = %e, "failed to reload thread after turn");
            }
            if new_thread {
                self.load_threads().await.ok();
            }
        }

        Ok(TurnOutcome::Completed { appended })
    }

    async fn stream_turn<F>(
        &mut self,
        ticket: TurnTicket,
        text: &str,
        observer: &mut F,
    ) -> Result<(), ChatError>
    where
        F: FnMut(&StreamEvent, &Applied) + Send,
    {
        let mut chunks: Box<dyn ChunkSource> = self.backend.send_message(text).await?;
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = chunks.next_chunk().await? {
            for event in decoder.push(&chunk) {
                if self.apply(ticket, event, observer) {
                    return Ok(());
                }
            }
        }

        if let Some(event) = decoder.finish() {
            if self.apply(ticket, event, observer) {
                return Ok(());
            }
        }

        tracing::debug!(skipped = decoder.skipped(), "stream closed without stream_end");
        self.transcript.finish(ticket);
        Ok(())
    }

    // Returns true once the turn is over.
    fn apply<F>(&mut self, ticket: TurnTicket, event: StreamEvent, observer: &mut F) -> bool
    where
        F: FnMut(&StreamEvent, &Applied),
    {
        let applied = self.transcript.apply(ticket, event.clone());
        observer(&event, &applied);
        matches!(applied, Applied::Ended { .. } | Applied::Stale)
    }

    // =========================================================================
    // USAGE & AGENTS
    // =========================================================================

    /// Record usage on the backend and add the tokens to the local count.
    ///
    /// # Errors
    ///
    /// Returns the backend error; local counts are unchanged.
    pub async fn record_usage(&mut self, record: UsageRecord) -> Result<(), ChatError> {
        self.backend.record_usage(&record).await?;
        if let Some(user) = self.user.as_mut() {
            user.add_usage(&record);
        }
        Ok(())
    }

    /// Launch an agent into the session and reload the session's agents.
    ///
    /// # Errors
    ///
    /// Returns the backend error from the launch itself.
    pub async fn launch_agent(&mut self, agent_id: i64) -> Result<(), ChatError> {
        self.backend.launch_agent(agent_id).await?;
        tracing::info!(agent_id, "launched agent");
        // Reload failures land on `user_error`; the launch itself succeeded.
        self.load_user_session().await.ok();
        Ok(())
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
