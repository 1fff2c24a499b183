//! End-to-end worker lifecycle tests over the public crate API, using
//! scripted probe and notifier fakes instead of the network.

use async_trait::async_trait;
use namewatch::checker::{
    BatchWorker, Notifier, Outcome, Probe, ProbeResult, SessionError, SessionRegistry,
    WorkerConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const ORIGIN_CHAT: i64 = 10;
const HITS_CHAT: i64 = 20;

/// Probe fake: names starting with `free` are available, everything else
/// is taken. Counts every check.
struct ScriptedProbe {
    calls: AtomicUsize,
    check_delay: Duration,
}

impl ScriptedProbe {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            check_delay: Duration::ZERO,
        }
    }

    fn slow(check_delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            check_delay,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn check(&self, username: &str) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.check_delay.is_zero() {
            tokio::time::sleep(self.check_delay).await;
        }
        let outcome = if username.starts_with("free") {
            Outcome::Available
        } else {
            Outcome::Taken
        };
        let mark = if outcome.is_hit() { "✓" } else { "✗" };
        ProbeResult {
            username: username.to_string(),
            outcome,
            display: format!("{username} {mark}"),
        }
    }
}

/// Notifier fake recording every delivery, optionally failing them all.
struct RecordingNotifier {
    sent: Mutex<Vec<(i64, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn sent(&self) -> Vec<(i64, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn sent_to(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((chat_id, text.to_string()));
        if self.fail {
            anyhow::bail!("simulated delivery fault");
        }
        Ok(())
    }
}

fn worker_config(batch_size: usize) -> WorkerConfig {
    WorkerConfig {
        batch_size,
        delay_min: Duration::from_millis(500),
        delay_max: Duration::from_millis(2000),
        origin_chat_id: ORIGIN_CHAT,
        hits_chat_id: HITS_CHAT,
    }
}

fn taken_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("name{i}")).collect()
}

/// Poll until `cond` holds, advancing the paused clock.
async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn batch_of_25_flushes_two_full_batches_and_one_partial() {
    let registry = SessionRegistry::new();
    let session = registry.upload(1, taken_names(25)).await;
    let probe = Arc::new(ScriptedProbe::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let worker = BatchWorker::new(
        session.clone(),
        probe.clone(),
        notifier.clone(),
        worker_config(10),
    );
    worker.run(CancellationToken::new()).await;

    assert_eq!(probe.calls(), 25);

    let batches = notifier.sent_to(ORIGIN_CHAT);
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].lines().count(), 10);
    assert_eq!(batches[1].lines().count(), 10);
    assert_eq!(batches[2].lines().count(), 5);

    // Results arrive in list order.
    let all_lines: Vec<&str> = batches.iter().flat_map(|b| b.lines()).collect();
    let expected: Vec<String> = (0..25).map(|i| format!("name{i} ✗")).collect();
    assert_eq!(all_lines, expected);

    // The counter was reset at the end of the pass.
    let status = session.status();
    assert_eq!(status.processed, 0);
    assert_eq!(status.total, 25);
}

#[tokio::test(start_paused = true)]
async fn hits_are_reported_immediately_to_the_hits_chat() {
    let registry = SessionRegistry::new();
    let names = vec![
        "name0".to_string(),
        "freeAlpha".to_string(),
        "name1".to_string(),
        "freeBravo".to_string(),
    ];
    let session = registry.upload(1, names).await;
    let probe = Arc::new(ScriptedProbe::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let worker = BatchWorker::new(session, probe, notifier.clone(), worker_config(10));
    worker.run(CancellationToken::new()).await;

    let hits = notifier.sent_to(HITS_CHAT);
    assert_eq!(hits, vec!["🎯 freeAlpha ✓", "🎯 freeBravo ✓"]);

    // Taken names never reach the hits chat.
    assert!(hits.iter().all(|h| !h.contains("name")));
}

#[tokio::test(start_paused = true)]
async fn worker_ends_after_one_pass_when_looping_disabled() {
    let registry = SessionRegistry::new();
    let session = registry.upload(1, taken_names(3)).await;
    let probe = Arc::new(ScriptedProbe::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let worker = BatchWorker::new(
        session.clone(),
        probe.clone(),
        notifier,
        worker_config(10),
    );
    session
        .install_worker(|cancel| tokio::spawn(worker.run(cancel)))
        .await
        .expect("install worker");

    wait_for(|| !session.is_running()).await;
    assert_eq!(probe.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn looping_starts_a_second_pass_without_restart() {
    let registry = SessionRegistry::new();
    let session = registry.upload(1, taken_names(3)).await;
    session.set_loop(true);
    let probe = Arc::new(ScriptedProbe::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let worker = BatchWorker::new(
        session.clone(),
        probe.clone(),
        notifier,
        worker_config(10),
    );
    session
        .install_worker(|cancel| tokio::spawn(worker.run(cancel)))
        .await
        .expect("install worker");

    // Strictly more checks than the list length means a second pass began
    // with no manual restart in between.
    let probe_for_wait = probe.clone();
    wait_for(move || probe_for_wait.calls() > 3).await;
    assert!(session.is_running());

    session.teardown().await;
    assert!(!session.is_running());
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_in_flight_work_without_error_notice() {
    let registry = SessionRegistry::new();
    let session = registry.upload(1, taken_names(100)).await;
    let probe = Arc::new(ScriptedProbe::slow(Duration::from_secs(3600)));
    let notifier = Arc::new(RecordingNotifier::new());

    let worker = BatchWorker::new(
        session.clone(),
        probe.clone(),
        notifier.clone(),
        worker_config(10),
    );
    session
        .install_worker(|cancel| tokio::spawn(worker.run(cancel)))
        .await
        .expect("install worker");

    // Wait until the worker is inside its first (very slow) probe call.
    let probe_for_wait = probe.clone();
    wait_for(move || probe_for_wait.calls() == 1).await;

    // Teardown returns only once the worker task has finished.
    session.teardown().await;
    assert!(!session.is_running());
    assert_eq!(probe.calls(), 1);

    // Cancellation is silent: no batch, no error notice.
    assert!(notifier.sent().is_empty());

    // Counters and list were cleared.
    let status = session.status();
    assert_eq!(status.processed, 0);
    assert_eq!(status.total, 0);
    assert!(session.usernames().is_empty());
}

#[tokio::test(start_paused = true)]
async fn starting_twice_is_rejected_without_touching_the_first_worker() {
    let registry = SessionRegistry::new();
    let session = registry.upload(1, taken_names(50)).await;
    let probe = Arc::new(ScriptedProbe::slow(Duration::from_secs(60)));
    let notifier = Arc::new(RecordingNotifier::new());

    let worker = BatchWorker::new(
        session.clone(),
        probe.clone(),
        notifier.clone(),
        worker_config(10),
    );
    session
        .install_worker(|cancel| tokio::spawn(worker.run(cancel)))
        .await
        .expect("install worker");

    let second = BatchWorker::new(
        session.clone(),
        probe.clone(),
        notifier,
        worker_config(10),
    );
    let rejected = session
        .install_worker(|cancel| tokio::spawn(second.run(cancel)))
        .await;
    assert!(matches!(rejected, Err(SessionError::WorkerActive)));
    assert!(session.is_running());

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn delivery_faults_do_not_stop_the_pass() {
    let registry = SessionRegistry::new();
    let session = registry.upload(1, vec!["freeOne".to_string(), "name0".to_string()]).await;
    let probe = Arc::new(ScriptedProbe::new());
    let notifier = Arc::new(RecordingNotifier::failing());

    let worker = BatchWorker::new(
        session.clone(),
        probe.clone(),
        notifier.clone(),
        worker_config(1),
    );
    worker.run(CancellationToken::new()).await;

    // Every item was still processed and every send was attempted.
    assert_eq!(probe.calls(), 2);
    let attempts = notifier.sent();
    assert!(attempts.iter().any(|(chat, _)| *chat == HITS_CHAT));
    assert_eq!(
        attempts.iter().filter(|(chat, _)| *chat == ORIGIN_CHAT).count(),
        2
    );
    assert_eq!(session.status().processed, 0);
}

#[tokio::test(start_paused = true)]
async fn fresh_upload_supersedes_a_running_worker() {
    let registry = SessionRegistry::new();
    let session = registry.upload(1, taken_names(50)).await;
    let probe = Arc::new(ScriptedProbe::slow(Duration::from_secs(60)));
    let notifier = Arc::new(RecordingNotifier::new());

    let worker = BatchWorker::new(
        session.clone(),
        probe.clone(),
        notifier,
        worker_config(10),
    );
    session
        .install_worker(|cancel| tokio::spawn(worker.run(cancel)))
        .await
        .expect("install worker");

    let probe_for_wait = probe.clone();
    wait_for(move || probe_for_wait.calls() >= 1).await;

    // Uploading tears the old session down (awaiting its worker) before
    // installing the fresh one.
    let fresh = registry.upload(1, taken_names(2)).await;
    assert!(!session.is_running());
    assert!(session.usernames().is_empty());
    assert_eq!(fresh.status().total, 2);
    assert!(!fresh.is_running());
}
