//! The per-session batch-check worker.
//!
//! One worker runs per active session. It walks the uploaded list in
//! order, probes each name, batches result lines toward the originating
//! chat, reports hits to the shared hits chat immediately, and sleeps a
//! random jitter between items. Cancellation is cooperative: the token is
//! checked before each probe and raced against the probe call and the
//! jitter sleep, so teardown never waits for more than one in-flight item.

use crate::checker::probe::{Probe, ProbeResult};
use crate::checker::session::Session;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outbound message delivery, implemented by the Telegram boundary and by
/// recording fakes in tests.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to `chat_id`. Implementations own chunking and rate
    /// limiting; a returned error means the whole message was lost.
    async fn send(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;
}

/// Static parameters of one worker run.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Result lines accumulated before a flush
    pub batch_size: usize,
    /// Lower jitter bound between items
    pub delay_min: Duration,
    /// Upper jitter bound between items
    pub delay_max: Duration,
    /// Chat the batches go to (where the run was started)
    pub origin_chat_id: i64,
    /// Shared chat receiving hit notifications
    pub hits_chat_id: i64,
}

/// How a pass over the list ended.
enum PassEnd {
    Completed,
    Cancelled,
}

/// Background task that checks one session's list.
pub struct BatchWorker {
    session: Arc<Session>,
    probe: Arc<dyn Probe>,
    notifier: Arc<dyn Notifier>,
    config: WorkerConfig,
}

impl BatchWorker {
    /// Build a worker bound to a session and its destinations.
    #[must_use]
    pub fn new(
        session: Arc<Session>,
        probe: Arc<dyn Probe>,
        notifier: Arc<dyn Notifier>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            session,
            probe,
            notifier,
            config,
        }
    }

    /// Run passes over the list until cancellation, a fault, or a pass
    /// completes with looping disabled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            chat_id = self.config.origin_chat_id,
            total = self.session.usernames().len(),
            "check worker started"
        );

        loop {
            match self.run_pass(&cancel).await {
                Ok(PassEnd::Cancelled) => {
                    info!(chat_id = self.config.origin_chat_id, "check worker cancelled");
                    return;
                }
                Ok(PassEnd::Completed) => {
                    if !self.session.loop_enabled() {
                        info!(
                            chat_id = self.config.origin_chat_id,
                            "looping disabled, check worker finished"
                        );
                        return;
                    }
                }
                Err(e) => {
                    warn!(
                        chat_id = self.config.origin_chat_id,
                        error = %e,
                        "check worker failed"
                    );
                    let note = format!("Error occurred during processing: {e}");
                    if let Err(send_err) = self
                        .notifier
                        .send(self.config.origin_chat_id, &note)
                        .await
                    {
                        warn!(error = %send_err, "failed to report worker error");
                    }
                    return;
                }
            }
        }
    }

    async fn run_pass(&self, cancel: &CancellationToken) -> anyhow::Result<PassEnd> {
        let usernames = self.session.usernames();
        let mut batch: Vec<String> = Vec::new();

        for (index, username) in usernames.iter().enumerate() {
            self.session.mark_progress(index + 1);

            if cancel.is_cancelled() {
                return Ok(PassEnd::Cancelled);
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return Ok(PassEnd::Cancelled),
                result = self.probe.check(username) => result,
            };

            if result.outcome.is_hit() {
                self.report_hit(&result).await;
            }
            batch.push(result.display);

            if batch.len() >= self.config.batch_size {
                self.flush(&mut batch).await;
            }

            let pause = self.jitter();
            tokio::select! {
                _ = cancel.cancelled() => return Ok(PassEnd::Cancelled),
                () = tokio::time::sleep(pause) => {}
            }
        }

        if !batch.is_empty() {
            self.flush(&mut batch).await;
        }
        self.session.finish_pass();

        Ok(PassEnd::Completed)
    }

    /// Best-effort hit notification; a delivery fault never stops the run.
    async fn report_hit(&self, result: &ProbeResult) {
        let text = format!("🎯 {}", result.display);
        if let Err(e) = self.notifier.send(self.config.hits_chat_id, &text).await {
            warn!(username = %result.username, error = %e, "failed to send hit notification");
        }
    }

    /// Best-effort batch flush; a delivery fault never stops the run.
    async fn flush(&self, batch: &mut Vec<String>) {
        let text = batch.join("\n");
        batch.clear();
        if let Err(e) = self.notifier.send(self.config.origin_chat_id, &text).await {
            warn!(
                chat_id = self.config.origin_chat_id,
                error = %e,
                "failed to flush result batch"
            );
        }
    }

    /// Uniformly random pause between the configured bounds.
    fn jitter(&self) -> Duration {
        let min = self.config.delay_min.min(self.config.delay_max);
        let max = self.config.delay_max.max(self.config.delay_min);
        if min == max {
            return min;
        }
        let millis = rand::rng().random_range(min.as_millis()..=max.as_millis());
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}
