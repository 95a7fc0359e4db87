use crate::error::{as_user_facing, notice_embed};
use crate::tcg::{BattleReport, MatchOutcome};
use crate::{
    BATTLE_TARGET, COMMAND_TARGET, CONSOLE_TARGET, Data, ERROR_TARGET, EVENT_TARGET, Error,
    TCG_TARGET,
};
use dashmap::DashMap;
use poise::{Context, CreateReply, FrameworkError};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Command log file name
pub const COMMAND_LOG_FILE: &str = "commands";
/// Battle log file name
pub const BATTLE_LOG_FILE: &str = "battles";

/// Initialize the logging system with console and file outputs
///
/// # Errors
/// Returns an error if the log directory cannot be created
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let command_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, COMMAND_LOG_FILE);
    let battle_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, BATTLE_LOG_FILE);

    // Human-readable console output
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // Command and error events as JSON
    let command_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(command_file)
        .with_filter(filter_fn(|meta| {
            meta.target() == COMMAND_TARGET || meta.target() == ERROR_TARGET
        }));

    let battle_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(battle_file)
        .with_filter(filter_fn(|meta| in_battle_file(meta.target())));

    // Default to INFO, but keep serenity's heartbeat chatter out
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,serenity=error"))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(command_layer)
        .with(battle_layer)
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

// Card store and challenge events share the battle file
fn in_battle_file(target: &str) -> bool {
    target == BATTLE_TARGET || target == TCG_TARGET
}

// Start times keyed by invocation id
static COMMAND_STARTS: LazyLock<DashMap<u64, Instant>> = LazyLock::new(DashMap::new);

fn guild_label(ctx: Context<'_, Data, Error>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution (pre-command hook)
pub fn log_command_start(ctx: Context<'_, Data, Error>) {
    COMMAND_STARTS.insert(ctx.id(), Instant::now());

    let args = if ctx.command().parameters.is_empty() {
        String::new()
    } else {
        format!("{:?}", ctx.invocation_string())
    };

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        arguments = %args,
        event = "start",
        "Command execution started"
    );
}

/// Log the end of a command execution (post-command hook)
pub fn log_command_end(ctx: Context<'_, Data, Error>) {
    let duration = COMMAND_STARTS
        .remove(&ctx.id())
        .map(|(_, start)| start.elapsed());
    let duration_ms = u64::try_from(duration.map_or(0, |d| d.as_millis())).unwrap_or_default();

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        duration_ms = duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log errors that occur during command execution
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            COMMAND_STARTS.remove(&ctx.id());
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                error = %error,
                "Command error"
            );
        }
        FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let error_msg = error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string);

            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                error = %error_msg,
                "Command check failed"
            );
        }
        err => {
            error!(
                target: ERROR_TARGET,
                error = ?err,
                "Other framework error"
            );
        }
    }
}

/// Framework error hook: log, then tell the member what went wrong
pub async fn on_error(error: FrameworkError<'_, Data, Error>) {
    log_command_error(&error);

    match error {
        FrameworkError::Command { error, ctx, .. } => {
            let reply = match as_user_facing(&error) {
                Some(notice) => CreateReply::default().embed(notice_embed(notice)),
                None => CreateReply::default()
                    .content("Something went wrong while running that command."),
            };
            if let Err(e) = ctx.send(reply.ephemeral(true)).await {
                warn!(target: ERROR_TARGET, error = %e, "Failed to send error notice");
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                warn!(target: ERROR_TARGET, error = %e, "Default error handler failed");
            }
        }
    }
}

/// Log a finished battle
pub fn log_battle(report: &BattleReport) {
    let winner = match report.outcome {
        MatchOutcome::Winner(_) => report
            .winner_id()
            .map_or_else(String::new, |id| id.to_string()),
        MatchOutcome::Tie => "tie".to_string(),
    };
    info!(
        target: BATTLE_TARGET,
        battle_id = %report.battle_id,
        die_roll = %report.die_roll,
        challenger_id = %report.challenger_id,
        opponent_id = %report.opponent_id,
        winner = %winner,
        stats_played = report.stats.len(),
        event = "battle_announced",
        "Battle announced"
    );
}

/// Log a component interaction handled outside of a command
pub fn log_interaction(custom_id: &str, user_id: u64, outcome: &str) {
    info!(
        target: EVENT_TARGET,
        custom_id = %custom_id,
        user_id = %user_id,
        outcome = %outcome,
        event = "component",
        "Component interaction handled"
    );
}

pub fn log_console(message: String) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battle_file_targets() {
        assert!(in_battle_file(BATTLE_TARGET));
        assert!(in_battle_file(TCG_TARGET));
        assert!(!in_battle_file(COMMAND_TARGET));
        assert!(!in_battle_file("rent_a_ra::tcg::store"));
    }
}
