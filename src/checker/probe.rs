//! Availability probe for the profile-lookup endpoint.
//!
//! Every check resolves to a [`ProbeResult`]; the probe never returns an
//! error. Transient failures (timeouts, transport errors, unparseable
//! bodies, unexpected statuses) are retried up to [`PROBE_MAX_ATTEMPTS`]
//! times inside an explicit attempt loop, then collapsed into a terminal
//! outcome.
//!
//! Two classification rules are endpoint-contract assumptions observed in
//! production rather than documented API behavior: HTTP 500 on this route
//! means the profile does not exist, and a 200 body carrying error code 53
//! (or an empty list) means the same.

use crate::checker::user_agents::UserAgentPool;
use crate::config::{
    PROBE_BLOCKED_DELAY, PROBE_MAX_ATTEMPTS, PROBE_RETRY_DELAY, PROBE_TIMEOUT,
    PROFILE_NOT_FOUND_ERROR_CODE,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Final classification of one username check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The name is free to claim
    Available,
    /// The name is already in use
    Taken,
    /// Empty input, no request was made
    Skipped,
    /// The endpoint answered 200 but the body never parsed
    AmbiguousBody,
    /// The endpoint kept answering 403
    Blocked,
    /// Every attempt timed out
    Timeout,
    /// Every attempt failed at the transport level
    RequestError,
    /// Attempts exhausted on unexpected status codes
    ExhaustedRetries,
}

impl Outcome {
    /// Whether this outcome is a genuine positive hit worth reporting.
    #[must_use]
    pub const fn is_hit(self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Result of one username check: classification plus the display line
/// shown to the user.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// The trimmed username that was checked
    pub username: String,
    /// Final classification
    pub outcome: Outcome,
    /// User-facing result line
    pub display: String,
}

impl ProbeResult {
    fn new(username: &str, outcome: Outcome, last_status: Option<u16>) -> Self {
        Self {
            username: username.to_string(),
            outcome,
            display: render_display(username, outcome, last_status),
        }
    }

    fn skipped() -> Self {
        Self {
            username: String::new(),
            outcome: Outcome::Skipped,
            display: "Empty username skipped".to_string(),
        }
    }
}

fn render_display(username: &str, outcome: Outcome, last_status: Option<u16>) -> String {
    match outcome {
        Outcome::Available => format!("{username} ✓"),
        Outcome::Taken => format!("{username} ✗"),
        Outcome::Skipped => "Empty username skipped".to_string(),
        Outcome::AmbiguousBody => format!("{username} - JSON parse error"),
        Outcome::Blocked => format!("{username} - blocked (403)"),
        Outcome::Timeout => format!("{username} - timeout"),
        Outcome::RequestError => format!("{username} - request error"),
        Outcome::ExhaustedRetries => last_status.map_or_else(
            || format!("{username} - failed after {PROBE_MAX_ATTEMPTS} attempts"),
            |status| format!("{username} - HTTP {status}"),
        ),
    }
}

/// A username availability check. Object-safe so workers can run against
/// the HTTP probe in production and scripted fakes in tests.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Check one username. Always resolves to a result, never an error.
    async fn check(&self, username: &str) -> ProbeResult;
}

/// What a single attempt concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// A definitive classification; no further attempts
    Definitive(Outcome),
    /// A transient failure eligible for retry
    Retryable(Failure),
}

/// Transient failure classes and their terminal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    BadBody,
    Forbidden,
    UnexpectedStatus(u16),
    TimedOut,
    Transport,
}

impl Failure {
    /// Backoff before the next attempt. A 403 gets the longer pause.
    const fn backoff(self) -> std::time::Duration {
        match self {
            Self::Forbidden => PROBE_BLOCKED_DELAY,
            _ => PROBE_RETRY_DELAY,
        }
    }

    /// Outcome reported when attempts run out on this failure class.
    const fn terminal_outcome(self) -> Outcome {
        match self {
            Self::BadBody => Outcome::AmbiguousBody,
            Self::Forbidden => Outcome::Blocked,
            Self::UnexpectedStatus(_) => Outcome::ExhaustedRetries,
            Self::TimedOut => Outcome::Timeout,
            Self::Transport => Outcome::RequestError,
        }
    }

    const fn status(self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus(status) => Some(status),
            _ => None,
        }
    }
}

/// HTTP probe against the profile-lookup endpoint.
pub struct UsernameProbe {
    http: Client,
    endpoint: String,
    user_agents: Arc<UserAgentPool>,
}

impl UsernameProbe {
    /// Create a probe for the given endpoint base URL.
    #[must_use]
    pub fn new(endpoint: String, user_agents: Arc<UserAgentPool>) -> Self {
        let http = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            endpoint,
            user_agents,
        }
    }

    async fn attempt(&self, username: &str) -> Attempt {
        let request = self
            .http
            .get(self.endpoint.as_str())
            .query(&[("usernames", username)])
            .header(reqwest::header::USER_AGENT, self.user_agents.pick());

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(username, "probe request timed out");
                return Attempt::Retryable(Failure::TimedOut);
            }
            Err(e) => {
                warn!(username, error = %e, "probe request failed");
                return Attempt::Retryable(Failure::Transport);
            }
        };

        let status = response.status();
        debug!(username, status = status.as_u16(), "probe response");

        match status {
            StatusCode::OK => match response.text().await {
                Ok(body) => match serde_json::from_str::<Value>(&body) {
                    Ok(json) => Attempt::Definitive(classify_profile_body(&json)),
                    Err(e) => {
                        warn!(username, error = %e, "unparseable profile body");
                        Attempt::Retryable(Failure::BadBody)
                    }
                },
                Err(e) if e.is_timeout() => Attempt::Retryable(Failure::TimedOut),
                Err(e) => {
                    warn!(username, error = %e, "failed to read profile body");
                    Attempt::Retryable(Failure::Transport)
                }
            },
            // Server error on this route means the profile does not exist.
            StatusCode::INTERNAL_SERVER_ERROR => Attempt::Definitive(Outcome::Available),
            StatusCode::FORBIDDEN => {
                warn!(username, "probe blocked with 403");
                Attempt::Retryable(Failure::Forbidden)
            }
            other => {
                warn!(username, status = other.as_u16(), "unexpected probe status");
                Attempt::Retryable(Failure::UnexpectedStatus(other.as_u16()))
            }
        }
    }
}

#[async_trait]
impl Probe for UsernameProbe {
    async fn check(&self, username: &str) -> ProbeResult {
        let username = username.trim();
        if username.is_empty() {
            return ProbeResult::skipped();
        }
        run_attempts(username, |_| self.attempt(username)).await
    }
}

/// Drive the attempt loop: up to [`PROBE_MAX_ATTEMPTS`] attempts with the
/// failure-specific backoff between them.
async fn run_attempts<F, Fut>(username: &str, mut attempt: F) -> ProbeResult
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt>,
{
    let mut last_failure = Failure::Transport;
    for n in 1..=PROBE_MAX_ATTEMPTS {
        match attempt(n).await {
            Attempt::Definitive(outcome) => return ProbeResult::new(username, outcome, None),
            Attempt::Retryable(failure) => {
                debug!(username, attempt = n, ?failure, "retryable probe failure");
                last_failure = failure;
                if n < PROBE_MAX_ATTEMPTS {
                    tokio::time::sleep(failure.backoff()).await;
                }
            }
        }
    }
    ProbeResult::new(
        username,
        last_failure.terminal_outcome(),
        last_failure.status(),
    )
}

/// Classify a parsed 200 body: the profile is absent (name available) when
/// the endpoint reports its not-found error code or an empty list.
fn classify_profile_body(body: &Value) -> Outcome {
    if body.get("error").and_then(Value::as_i64) == Some(PROFILE_NOT_FOUND_ERROR_CODE) {
        return Outcome::Available;
    }
    if body.as_array().is_some_and(Vec::is_empty) {
        return Outcome::Available;
    }
    Outcome::Taken
}
