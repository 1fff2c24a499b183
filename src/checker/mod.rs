//! Username availability checking core.
//!
//! The pipeline: a [`session::SessionRegistry`] holds one in-memory
//! [`session::Session`] per Telegram user; a [`worker::BatchWorker`] walks
//! the uploaded list, probing each name through a [`probe::Probe`] and
//! streaming batched results through a [`worker::Notifier`]; the
//! [`reaper`] evicts sessions idle for too long.

/// Availability probe and response classification
pub mod probe;
/// Periodic eviction of idle sessions
pub mod reaper;
/// Per-user sessions and the session registry
pub mod session;
/// Rotating User-Agent pool
pub mod user_agents;
/// The per-session batch-check worker
pub mod worker;

pub use probe::{Outcome, Probe, ProbeResult, UsernameProbe};
pub use reaper::spawn_reaper;
pub use session::{Session, SessionError, SessionRegistry, StatusSnapshot};
pub use user_agents::UserAgentPool;
pub use worker::{BatchWorker, Notifier, WorkerConfig};
