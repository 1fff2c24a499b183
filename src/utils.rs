//! Utility functions for message chunking and resilient Telegram API calls.

use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

/// Splits a long message into parts that fit within the given length limit.
///
/// Splitting is line-oriented: lines are packed into parts without breaking
/// them. A single line longer than `max_length` is split by grapheme
/// clusters so multi-byte characters are never cut in half.
///
/// # Examples
///
/// ```
/// use namewatch::utils::split_long_message;
/// let long_msg = "a line of results\n".repeat(300);
/// let parts = split_long_message(&long_msg, 4000);
/// assert!(parts.len() > 1);
/// ```
#[must_use]
pub fn split_long_message(message: &str, max_length: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }

    if message.len() <= max_length {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for line in message.lines() {
        if line.len() > max_length {
            if !current.is_empty() {
                parts.push(current.trim_end().to_string());
                current.clear();
            }
            push_oversized_line(line, max_length, &mut parts, &mut current);
            continue;
        }

        if current.len() + line.len() + 1 > max_length && !current.is_empty() {
            parts.push(current.trim_end().to_string());
            current.clear();
        }
        current.push_str(line);
        current.push('\n');
    }

    if !current.is_empty() {
        parts.push(current.trim_end().to_string());
    }

    parts
}

/// Split one oversized line by grapheme clusters (Unicode-safe).
fn push_oversized_line(
    line: &str,
    max_length: usize,
    parts: &mut Vec<String>,
    current: &mut String,
) {
    let mut chunk = String::new();
    for grapheme in line.graphemes(true) {
        if chunk.len() + grapheme.len() > max_length {
            parts.push(chunk.clone());
            chunk.clear();
        }
        chunk.push_str(grapheme);
    }
    if !chunk.is_empty() {
        current.push_str(&chunk);
        current.push('\n');
    }
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// # Examples
///
/// ```
/// use namewatch::utils::truncate_str;
/// assert_eq!(truncate_str("Привет, мир!", 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Retry a Telegram API operation with exponential backoff.
///
/// Used for sends and file downloads that may fail on transient network
/// errors. Backoff starts at 500 ms, is capped at 4 s, and carries jitter
/// to avoid thundering herd.
///
/// # Errors
///
/// Returns the last error if all attempts fail.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}
