#![deny(missing_docs)]
//! NameWatch - a Telegram bot that batch-checks username availability.
//!
//! Users upload a list of candidate names, the bot probes a profile-lookup
//! endpoint for each one at a throttled, jittered pace, and available names
//! are reported to a shared hits channel.

/// Telegram bot boundary: handlers, access control, outbound messaging.
pub mod bot;
/// Availability checking core: probe, sessions, workers, reaper.
pub mod checker;
/// Configuration management.
pub mod config;
pub mod utils;
