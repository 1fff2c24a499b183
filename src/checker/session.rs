//! Per-user check sessions and the session registry.
//!
//! A [`Session`] is the in-memory record of one user's uploaded list,
//! progress counters, loop flag, and (at most one) running worker. The
//! [`SessionRegistry`] owns the map from Telegram user id to session and
//! is the only place sessions are created, replaced, or evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Session operation errors surfaced to command handlers.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A worker is already running for this session
    #[error("a check worker is already running for this session")]
    WorkerActive,
}

/// Point-in-time view of a session for the status command.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    /// Whether a worker is currently running
    pub running: bool,
    /// 1-based index of the item being processed, 0 between passes
    pub processed: usize,
    /// Number of uploaded usernames
    pub total: usize,
    /// Whether the worker restarts after finishing a pass
    pub loop_enabled: bool,
}

struct WorkerSlot {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct SessionState {
    usernames: Arc<Vec<String>>,
    loop_enabled: bool,
    processed: usize,
    total: usize,
    last_activity: Instant,
    worker: Option<WorkerSlot>,
}

/// One user's in-memory checking session.
///
/// Counter and flag access goes through a plain mutex held only for the
/// duration of the read or write; the async `lifecycle` lock serializes
/// teardown against worker installation so a new worker can never be
/// installed mid-teardown.
pub struct Session {
    state: Mutex<SessionState>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl Session {
    /// Create a session holding the given username list.
    #[must_use]
    pub fn new(usernames: Vec<String>) -> Self {
        let total = usernames.len();
        Self {
            state: Mutex::new(SessionState {
                usernames: Arc::new(usernames),
                loop_enabled: false,
                processed: 0,
                total,
                last_activity: Instant::now(),
                worker: None,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the uploaded list, shared with the worker.
    #[must_use]
    pub fn usernames(&self) -> Arc<Vec<String>> {
        self.lock().usernames.clone()
    }

    /// Whether the worker should restart after finishing a pass.
    #[must_use]
    pub fn loop_enabled(&self) -> bool {
        self.lock().loop_enabled
    }

    /// Toggle looping. Stamps activity.
    pub fn set_loop(&self, enabled: bool) {
        let mut st = self.lock();
        st.loop_enabled = enabled;
        st.last_activity = Instant::now();
    }

    /// Stamp activity without other changes.
    pub fn touch(&self) {
        self.lock().last_activity = Instant::now();
    }

    /// Record that the worker is on the `processed`-th item (1-based).
    /// Stamps activity.
    pub fn mark_progress(&self, processed: usize) {
        let mut st = self.lock();
        st.processed = processed;
        st.last_activity = Instant::now();
    }

    /// Reset the progress counter at the end of a pass.
    pub fn finish_pass(&self) {
        self.lock().processed = 0;
    }

    /// How long the session has been idle.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.lock().last_activity.elapsed()
    }

    /// Whether a worker is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock()
            .worker
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Point-in-time view for the status command.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        let st = self.lock();
        StatusSnapshot {
            running: st.worker.as_ref().is_some_and(|w| !w.handle.is_finished()),
            processed: st.processed,
            total: st.total,
            loop_enabled: st.loop_enabled,
        }
    }

    /// Install a new worker unless one is still running.
    ///
    /// The spawn closure receives the cancellation token the worker must
    /// poll; the returned handle is stored so teardown can await it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WorkerActive`] if a live worker exists; the
    /// running worker is unaffected.
    pub async fn install_worker<F>(&self, spawn: F) -> Result<(), SessionError>
    where
        F: FnOnce(CancellationToken) -> JoinHandle<()>,
    {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_running() {
            return Err(SessionError::WorkerActive);
        }
        let cancel = CancellationToken::new();
        let handle = spawn(cancel.clone());
        let mut st = self.lock();
        st.worker = Some(WorkerSlot { cancel, handle });
        st.last_activity = Instant::now();
        Ok(())
    }

    /// Cancel the worker (if any), await its completion, and clear the
    /// list and counters. Idempotent; concurrent teardowns serialize on
    /// the lifecycle lock.
    pub async fn teardown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let worker = self.lock().worker.take();
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                if e.is_panic() {
                    warn!(error = %e, "check worker panicked during teardown");
                }
            }
        }
        let mut st = self.lock();
        st.usernames = Arc::new(Vec::new());
        st.processed = 0;
        st.total = 0;
    }
}

/// Registry of per-user sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<i64, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the user's session with a fresh one holding `usernames`.
    ///
    /// Any existing session is fully torn down (worker cancelled and
    /// awaited) before the new one is installed.
    pub async fn upload(&self, user_id: i64, usernames: Vec<String>) -> Arc<Session> {
        if let Some(old) = self.get(user_id).await {
            old.teardown().await;
        }
        let session = Arc::new(Session::new(usernames));
        self.sessions.write().await.insert(user_id, session.clone());
        session
    }

    /// Look up the user's session.
    pub async fn get(&self, user_id: i64) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&user_id).cloned()
    }

    /// Tear down and evict the user's session.
    ///
    /// Returns `false` if the user had no session.
    pub async fn kill(&self, user_id: i64) -> bool {
        let session = self.sessions.write().await.remove(&user_id);
        match session {
            Some(session) => {
                session.teardown().await;
                true
            }
            None => false,
        }
    }

    /// Tear down and evict every session idle longer than `max_idle`.
    ///
    /// Returns the number of evicted sessions. Sessions touched between
    /// the scan and the sweep are re-checked and spared.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let stale: Vec<(i64, Arc<Session>)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| s.idle_for() > max_idle)
                .map(|(id, s)| (*id, s.clone()))
                .collect()
        };

        let mut evicted = 0;
        for (user_id, session) in stale {
            if session.idle_for() <= max_idle {
                continue;
            }
            info!(user_id, "cleaning up inactive session");
            session.teardown().await;
            self.sessions.write().await.remove(&user_id);
            evicted += 1;
        }
        evicted
    }

    /// Number of tracked sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("name{i}")).collect()
    }

    #[tokio::test]
    async fn test_upload_replaces_session_and_resets_counters() {
        let registry = SessionRegistry::new();
        let first = registry.upload(1, names(3)).await;
        first.mark_progress(2);
        first.set_loop(true);

        let second = registry.upload(1, names(5)).await;
        let status = second.status();
        assert_eq!(status.total, 5);
        assert_eq!(status.processed, 0);
        assert!(!status.loop_enabled);

        // The replaced session was torn down: list cleared, counters reset.
        assert!(first.usernames().is_empty());
        assert_eq!(first.status().processed, 0);
    }

    #[tokio::test]
    async fn test_second_worker_is_rejected_while_first_runs() {
        let session = Arc::new(Session::new(names(1)));

        let installed = session
            .install_worker(|cancel| tokio::spawn(async move { cancel.cancelled().await }))
            .await;
        assert!(installed.is_ok());
        assert!(session.is_running());

        let second = session
            .install_worker(|_| tokio::spawn(async {}))
            .await;
        assert!(matches!(second, Err(SessionError::WorkerActive)));
        // The first worker is unaffected.
        assert!(session.is_running());

        session.teardown().await;
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_teardown_awaits_worker_and_is_idempotent() {
        let session = Arc::new(Session::new(names(2)));
        session
            .install_worker(|cancel| tokio::spawn(async move { cancel.cancelled().await }))
            .await
            .expect("install");

        session.teardown().await;
        assert!(!session.is_running());
        assert!(session.usernames().is_empty());

        // Second teardown is a no-op.
        session.teardown().await;
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_install_after_finished_worker_succeeds() {
        let session = Arc::new(Session::new(names(1)));
        session
            .install_worker(|_| tokio::spawn(async {}))
            .await
            .expect("install");

        // Let the trivial worker finish.
        for _ in 0..10 {
            if !session.is_running() {
                break;
            }
            tokio::task::yield_now().await;
        }

        let again = session.install_worker(|_| tokio::spawn(async {})).await;
        assert!(again.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_idle_honors_threshold() {
        let registry = SessionRegistry::new();
        registry.upload(1, names(1)).await;
        registry.upload(2, names(1)).await;

        tokio::time::advance(Duration::from_secs(59 * 60)).await;
        let fresh = registry.get(2).await.expect("session");
        fresh.touch();
        tokio::time::advance(Duration::from_secs(2 * 60)).await;

        // User 1 has been idle 61 minutes, user 2 only 2 minutes.
        let evicted = registry.reap_idle(Duration::from_secs(3600)).await;
        assert_eq!(evicted, 1);
        assert!(registry.get(1).await.is_none());
        assert!(registry.get(2).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_spares_sessions_under_threshold() {
        let registry = SessionRegistry::new();
        registry.upload(7, names(1)).await;

        tokio::time::advance(Duration::from_secs(59 * 60)).await;
        let evicted = registry.reap_idle(Duration::from_secs(3600)).await;
        assert_eq!(evicted, 0);
        assert!(registry.get(7).await.is_some());
    }

    #[tokio::test]
    async fn test_kill_evicts() {
        let registry = SessionRegistry::new();
        registry.upload(9, names(1)).await;
        assert!(registry.kill(9).await);
        assert!(registry.get(9).await.is_none());
        assert!(!registry.kill(9).await);
    }
}
