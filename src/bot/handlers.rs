//! Telegram command and document handlers.
//!
//! Thin boundary over the checker core: validates input, resolves
//! permissions, and translates commands into registry/session operations.
//! Nothing here blocks the dispatcher: starting a check only spawns the
//! worker task.

use crate::bot::access::{is_privileged, notify_denied};
use crate::checker::{BatchWorker, SessionError, WorkerConfig};
use crate::utils::retry_telegram_operation;
use anyhow::Result;
use std::sync::Arc;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::Document;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

use super::CheckerState;

/// Checker command surface.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Username checker commands:")]
pub enum Command {
    /// Start the worker for the uploaded list
    #[command(description = "start checking the uploaded list")]
    Run,
    /// Stop the worker and drop the session
    #[command(description = "stop the current check and clear your session")]
    Kill,
    /// Enable looping
    #[command(description = "enable continuous looping")]
    On,
    /// Disable looping
    #[command(description = "disable looping")]
    Off,
    /// Report progress
    #[command(description = "show the status of your check")]
    Status,
    /// Grant checker access (owner only)
    #[command(description = "add a user to the allowed list (owner only)")]
    Allow(i64),
    /// Revoke checker access (owner only)
    #[command(description = "remove a user from the allowed list (owner only)")]
    Deny(i64),
    /// Show command help
    #[command(description = "show this help")]
    Help,
}

/// Telegram user id of the sender, or 0 when absent (channel posts).
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Dispatch one parsed command.
///
/// # Errors
///
/// Returns an error if a reply cannot be delivered.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<CheckerState>,
) -> Result<()> {
    match cmd {
        Command::Run => run_check(&bot, &msg, &state).await,
        Command::Kill => kill_check(&bot, &msg, &state).await,
        Command::On => set_looping(&bot, &msg, &state, true).await,
        Command::Off => set_looping(&bot, &msg, &state, false).await,
        Command::Status => report_status(&bot, &msg, &state).await,
        Command::Allow(user) => mutate_allow_list(&bot, &msg, &state, user, true).await,
        Command::Deny(user) => mutate_allow_list(&bot, &msg, &state, user, false).await,
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
            Ok(())
        }
    }
}

async fn run_check(bot: &Bot, msg: &Message, state: &Arc<CheckerState>) -> Result<()> {
    let user_id = get_user_id_safe(msg);
    if !is_privileged(bot, &state.settings, &state.allow_list, user_id).await {
        return notify_denied(bot, msg.chat.id, state, user_id).await;
    }

    let Some(session) = state.registry.get(user_id).await else {
        bot.send_message(msg.chat.id, "Upload a .txt file with usernames first.")
            .await?;
        return Ok(());
    };
    let usernames = session.usernames();
    if usernames.is_empty() {
        bot.send_message(msg.chat.id, "Upload a .txt file with usernames first.")
            .await?;
        return Ok(());
    }

    let (delay_min, delay_max) = state.settings.request_delay_bounds();
    let config = WorkerConfig {
        batch_size: state.settings.batch_size,
        delay_min,
        delay_max,
        origin_chat_id: msg.chat.id.0,
        hits_chat_id: state.settings.hits_chat_id,
    };
    let worker = BatchWorker::new(
        session.clone(),
        state.probe.clone(),
        state.notifier.clone(),
        config,
    );

    match session
        .install_worker(|cancel| tokio::spawn(worker.run(cancel)))
        .await
    {
        Ok(()) => {
            info!(user_id, total = usernames.len(), "check started");
            let looping = if session.loop_enabled() {
                "enabled"
            } else {
                "disabled"
            };
            bot.send_message(
                msg.chat.id,
                format!(
                    "Started checking {} usernames. Looping: {looping}",
                    usernames.len()
                ),
            )
            .await?;
        }
        Err(SessionError::WorkerActive) => {
            bot.send_message(
                msg.chat.id,
                "You already have a running process. Use /kill to stop it first.",
            )
            .await?;
        }
    }
    Ok(())
}

async fn kill_check(bot: &Bot, msg: &Message, state: &Arc<CheckerState>) -> Result<()> {
    let user_id = get_user_id_safe(msg);
    if state.registry.kill(user_id).await {
        info!(user_id, "check killed");
        bot.send_message(
            msg.chat.id,
            "Your batch check has been stopped and cleaned up.",
        )
        .await?;
    } else {
        bot.send_message(msg.chat.id, "You have no running process to stop.")
            .await?;
    }
    Ok(())
}

async fn set_looping(
    bot: &Bot,
    msg: &Message,
    state: &Arc<CheckerState>,
    enabled: bool,
) -> Result<()> {
    let user_id = get_user_id_safe(msg);
    if !is_privileged(bot, &state.settings, &state.allow_list, user_id).await {
        return notify_denied(bot, msg.chat.id, state, user_id).await;
    }

    let Some(session) = state.registry.get(user_id).await else {
        bot.send_message(msg.chat.id, "Upload a .txt file with usernames first.")
            .await?;
        return Ok(());
    };

    session.set_loop(enabled);
    info!(user_id, enabled, "looping toggled");
    let text = if enabled {
        "Looping enabled for your account."
    } else {
        "Looping disabled for your account."
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn report_status(bot: &Bot, msg: &Message, state: &Arc<CheckerState>) -> Result<()> {
    let user_id = get_user_id_safe(msg);
    let Some(session) = state.registry.get(user_id).await else {
        bot.send_message(msg.chat.id, "No data found. Upload a .txt file first.")
            .await?;
        return Ok(());
    };

    let status = session.status();
    session.touch();
    let text = format!(
        "Status Report\nStatus: {}\nProgress: {}/{}\nLooping: {}\nTotal usernames: {}",
        if status.running { "Running" } else { "Stopped" },
        status.processed,
        status.total,
        if status.loop_enabled {
            "Enabled"
        } else {
            "Disabled"
        },
        status.total,
    );
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn mutate_allow_list(
    bot: &Bot,
    msg: &Message,
    state: &Arc<CheckerState>,
    target: i64,
    grant: bool,
) -> Result<()> {
    let user_id = get_user_id_safe(msg);
    if user_id != state.settings.owner_id {
        bot.send_message(msg.chat.id, "Only the owner can use this command.")
            .await?;
        return Ok(());
    }

    let text = if grant {
        if state.allow_list.insert(target).await {
            info!(user = target, "user added to allow-list");
            format!("Added {target} to the allowed users list.")
        } else {
            format!("User {target} is already in the allowed users list.")
        }
    } else if state.allow_list.remove(target).await {
        info!(user = target, "user removed from allow-list");
        format!("Removed {target} from the allowed users list.")
    } else {
        format!("User {target} was not in the allowed users list.")
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handle an uploaded document: validate, download, and replace the
/// sender's session with the parsed username list.
///
/// # Errors
///
/// Returns an error if a reply cannot be delivered.
pub async fn handle_document(bot: Bot, msg: Message, state: Arc<CheckerState>) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    if !is_privileged(&bot, &state.settings, &state.allow_list, user_id).await {
        return notify_denied(&bot, msg.chat.id, &state, user_id).await;
    }

    let Some(doc) = msg.document() else {
        return Ok(());
    };

    if !has_txt_extension(doc) {
        bot.send_message(msg.chat.id, "Only .txt files are supported.")
            .await?;
        return Ok(());
    }
    if doc.file.size > state.settings.max_file_size {
        bot.send_message(
            msg.chat.id,
            format!(
                "File too large. Maximum size: {} bytes",
                state.settings.max_file_size
            ),
        )
        .await?;
        return Ok(());
    }

    let buffer = retry_telegram_operation(|| async {
        let file = bot.get_file(doc.file.id.clone()).await?;
        let mut buf = Vec::new();
        bot.download_file(&file.path, &mut buf).await?;
        Ok(buf)
    })
    .await;

    let buffer = match buffer {
        Ok(buffer) => buffer,
        Err(e) => {
            warn!(user_id, error = %e, "document download failed");
            bot.send_message(msg.chat.id, "Error processing file.")
                .await?;
            return Ok(());
        }
    };

    let usernames = parse_username_list(&String::from_utf8_lossy(&buffer));
    let count = usernames.len();
    state.registry.upload(user_id, usernames).await;

    info!(user_id, count, "username list uploaded");
    bot.send_message(msg.chat.id, format!("File uploaded. {count} usernames stored."))
        .await?;
    Ok(())
}

fn has_txt_extension(doc: &Document) -> bool {
    doc.file_name
        .as_deref()
        .is_some_and(|name| name.to_lowercase().ends_with(".txt"))
}

/// Trimmed, non-empty lines of an uploaded list.
fn parse_username_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_username_list_trims_and_drops_blanks() {
        let content = "Alpha\n  Bravo  \n\n\r\nCharlie\n   \n";
        assert_eq!(
            parse_username_list(content),
            vec!["Alpha", "Bravo", "Charlie"]
        );
    }

    #[test]
    fn test_parse_username_list_empty_input() {
        assert!(parse_username_list("").is_empty());
        assert!(parse_username_list("\n\n").is_empty());
    }
}
