//! Outbound messaging with a global send gate.
//!
//! All checker output funnels through [`TelegramNotifier`]: long messages
//! are split into chunks, every chunk waits on the process-wide
//! [`RateLimiter`], transient Telegram errors are retried, and a chunk
//! that still fails is logged and dropped without aborting the rest of
//! the message.

use crate::checker::worker::Notifier;
use crate::config::MESSAGE_CHUNK_LIMIT;
use crate::utils::{retry_telegram_operation, split_long_message};
use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::warn;

/// Process-wide minimum-interval gate for outbound sends.
///
/// The clock is a single critical section: the lock is held across the
/// wait, so concurrent senders serialize and each send is spaced at least
/// the configured delay after the previous one, whatever session it came
/// from.
pub struct RateLimiter {
    delay: Duration,
    last_send: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a gate enforcing `delay` between sends.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_send: Mutex::new(None),
        }
    }

    /// Wait until at least the configured delay has passed since the
    /// previous gated send, then claim the slot.
    pub async fn wait_if_needed(&self) {
        let mut last = self.last_send.lock().await;
        if let Some(prev) = *last {
            let since_last = prev.elapsed();
            if since_last < self.delay {
                sleep(self.delay - since_last).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// [`Notifier`] implementation backed by the Telegram Bot API.
pub struct TelegramNotifier {
    bot: Bot,
    limiter: RateLimiter,
}

impl TelegramNotifier {
    /// Wrap a bot with the global send gate.
    #[must_use]
    pub fn new(bot: Bot, message_delay: Duration) -> Self {
        Self {
            bot,
            limiter: RateLimiter::new(message_delay),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in split_long_message(text, MESSAGE_CHUNK_LIMIT) {
            self.limiter.wait_if_needed().await;
            let delivery = retry_telegram_operation(|| async {
                self.bot
                    .send_message(ChatId(chat_id), chunk.clone())
                    .await
                    .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
            })
            .await;
            if let Err(e) = delivery {
                warn!(chat_id, error = %e, "failed to send message chunk");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_sends_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_secs(1));

        let start = Instant::now();
        limiter.wait_if_needed().await;
        let first = Instant::now();
        limiter.wait_if_needed().await;
        let second = Instant::now();

        // The first call passes immediately, the second waits out the delay.
        assert!(first - start < Duration::from_secs(1));
        assert!(second - first >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_is_shared_across_tasks() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(1)));
        let mut tasks = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                limiter.wait_if_needed().await;
                Instant::now()
            }));
        }

        let mut stamps = Vec::new();
        for task in tasks {
            stamps.push(task.await.expect("task"));
        }
        stamps.sort();
        assert!(stamps[1] - stamps[0] >= Duration::from_secs(1));
        assert!(stamps[2] - stamps[1] >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_gap_waives_the_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.wait_if_needed().await;

        tokio::time::advance(Duration::from_secs(5)).await;

        let before = Instant::now();
        limiter.wait_if_needed().await;
        assert!(Instant::now() - before < Duration::from_secs(1));
    }
}
