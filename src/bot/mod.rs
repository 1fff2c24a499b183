/// Access control: allow-list, privilege checks, denial cooldown
pub mod access;
/// Command and document handlers
pub mod handlers;
/// Outbound messaging: rate limiting, chunking, retries
pub mod messaging;

pub use access::{AllowList, DenialCooldown};
pub use messaging::{RateLimiter, TelegramNotifier};

use crate::checker::{Notifier, Probe, SessionRegistry};
use crate::config::Settings;
use std::sync::Arc;

/// Shared state injected into every handler.
pub struct CheckerState {
    /// Validated application settings
    pub settings: Arc<Settings>,
    /// Per-user session registry
    pub registry: Arc<SessionRegistry>,
    /// Availability probe used by spawned workers
    pub probe: Arc<dyn Probe>,
    /// Outbound notifier shared by workers and handlers
    pub notifier: Arc<dyn Notifier>,
    /// Runtime allow-list
    pub allow_list: Arc<AllowList>,
    /// Cooldown tracker for denial notices
    pub denial_cooldown: Arc<DenialCooldown>,
}
