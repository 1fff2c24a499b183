//! Access control for checker commands.
//!
//! Privilege resolution order: bot owner, runtime allow-list, then
//! membership of the configured privileged group chat. The allow-list is
//! process-memory only and mutated exclusively by the owner. Unauthorized
//! senders get at most one denial notice per cooldown window so the bot
//! cannot be baited into flooding Telegram.

use crate::config::Settings;
use moka::future::Cache;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatId, UserId};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Runtime set of user ids granted checker access by the owner.
#[derive(Default)]
pub struct AllowList {
    users: RwLock<HashSet<i64>>,
}

impl AllowList {
    /// Create an empty allow-list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant access. Returns `false` if the user was already listed.
    pub async fn insert(&self, user_id: i64) -> bool {
        self.users.write().await.insert(user_id)
    }

    /// Revoke access. Returns `false` if the user was not listed.
    pub async fn remove(&self, user_id: i64) -> bool {
        self.users.write().await.remove(&user_id)
    }

    /// Whether the user is listed.
    pub async fn contains(&self, user_id: i64) -> bool {
        self.users.read().await.contains(&user_id)
    }
}

/// Cooldown tracker for "access denied" notices.
///
/// Entries expire on their own; while a user is tracked, further denials
/// are silenced (and counted, with throttled logging).
pub struct DenialCooldown {
    cache: Cache<i64, ()>,
    silenced: AtomicU64,
}

impl DenialCooldown {
    /// Create a tracker with the given cooldown window and capacity bound.
    #[must_use]
    pub fn new(cooldown: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(cooldown)
            .build();
        Self {
            cache,
            silenced: AtomicU64::new(0),
        }
    }

    /// Whether a denial notice should be sent to this user now.
    pub async fn should_notify(&self, user_id: i64) -> bool {
        if self.cache.get(&user_id).await.is_none() {
            return true;
        }
        let count = self.silenced.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_multiple_of(100) {
            debug!(count, user_id, "silenced unauthorized attempts");
        }
        false
    }

    /// Start the cooldown window after a notice was delivered.
    pub async fn mark_notified(&self, user_id: i64) {
        self.cache.insert(user_id, ()).await;
    }

    /// Total denials silenced by the cooldown.
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced.load(Ordering::Relaxed)
    }
}

/// Send one cooldown-gated "no permission" notice to the chat.
///
/// Repeated denials inside the cooldown window are silenced.
///
/// # Errors
///
/// Returns an error if the notice cannot be delivered.
pub async fn notify_denied(
    bot: &Bot,
    chat_id: ChatId,
    state: &super::CheckerState,
    user_id: i64,
) -> anyhow::Result<()> {
    if state.denial_cooldown.should_notify(user_id).await {
        info!(user_id, "unauthorized checker command");
        bot.send_message(chat_id, "You don't have permission to use this command.")
            .await?;
        state.denial_cooldown.mark_notified(user_id).await;
    }
    Ok(())
}

/// Resolve whether `user_id` may use checker commands.
///
/// Owner and allow-listed users pass without network traffic; otherwise
/// the user must be a present member of the configured privileged group.
pub async fn is_privileged(
    bot: &Bot,
    settings: &Settings,
    allow_list: &AllowList,
    user_id: i64,
) -> bool {
    if user_id == settings.owner_id {
        return true;
    }
    if allow_list.contains(user_id).await {
        return true;
    }

    let Some(group_id) = settings.allowed_chat_id else {
        return false;
    };
    let Ok(member_id) = u64::try_from(user_id) else {
        return false;
    };

    match bot.get_chat_member(ChatId(group_id), UserId(member_id)).await {
        Ok(member) => member.kind.is_present(),
        Err(e) => {
            info!(user_id, error = %e, "privileged group membership lookup failed");
            false
        }
    }
}
