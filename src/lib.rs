//! FreddyAI chat client.
//!
//! DESIGN
//! ======
//! The transcript assembler in [`transcript`] is the core: it turns the
//! backend's incremental `message` / `stream_end` events into an ordered list
//! of finalized messages plus at most one live fragment. [`sse`] decodes the
//! raw event-stream body, [`grouping`] decides how rows are visually grouped,
//! and [`session`] ties those to a [`api::ChatBackend`] together with the
//! thread list and the user's session.

pub mod agents;
pub mod api;
pub mod config;
pub mod grouping;
pub mod session;
pub mod sse;
pub mod threads;
pub mod transcript;
pub mod types;

pub use api::{ChatBackend, ChunkSource, HttpBackend};
pub use config::ChatConfig;
pub use session::{ChatSession, TurnOutcome};
pub use transcript::{Applied, Transcript, TurnState, TurnTicket};
pub use types::{ChatError, Role, ThreadMessage};
