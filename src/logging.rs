use crate::{COMMAND_TARGET, CONSOLE_TARGET, Context, Data, ERROR_TARGET, Error, MODERATION_TARGET};
use poise::FrameworkError;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};
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
/// Moderation audit log file name
pub const MODERATION_LOG_FILE: &str = "moderation";

/// Default directives when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info,serenity=error";

fn is_moderation_target(target: &str) -> bool {
    target == MODERATION_TARGET
}

fn is_command_target(target: &str) -> bool {
    target == COMMAND_TARGET || target == ERROR_TARGET
}

/// Initialize the logging system with console and file outputs
///
/// # Errors
/// Fails if the log directory cannot be created.
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let command_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, COMMAND_LOG_FILE);
    let moderation_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, MODERATION_LOG_FILE);

    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    let command_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(command_file)
        .with_filter(filter_fn(|metadata| is_command_target(metadata.target())));

    // Every warn, strike, ban, kick and timeout lands here
    let moderation_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(moderation_file)
        .with_filter(filter_fn(|metadata| is_moderation_target(metadata.target())));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(command_layer)
        .with(moderation_layer)
        .init();

    info!("Logging system initialized");
    Ok(())
}

thread_local! {
    static COMMAND_START_TIME: std::cell::RefCell<Option<Instant>> = const { std::cell::RefCell::new(None) };
}

fn guild_label(ctx: Context<'_>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution (pre-command hook)
pub fn log_command_start(ctx: Context<'_>) {
    COMMAND_START_TIME.with(|cell| {
        *cell.borrow_mut() = Some(Instant::now());
    });

    let command_name = ctx.command().qualified_name.clone();
    let user_id = ctx.author().id.get().to_string();
    let args = if ctx.command().parameters.is_empty() {
        String::new()
    } else {
        format!("{:?}", ctx.invocation_string())
    };

    info!(
        target: COMMAND_TARGET,
        command = %command_name,
        guild_id = %guild_label(ctx),
        user_id = %user_id,
        arguments = %args,
        event = "start",
        "Command execution started"
    );
}

/// Log the end of a command execution (post-command hook)
pub fn log_command_end(ctx: Context<'_>) {
    let duration =
        COMMAND_START_TIME.with(|cell| cell.borrow_mut().take().map(|start| start.elapsed()));

    let command_name = ctx.command().qualified_name.clone();
    let user_id = ctx.author().id.get().to_string();

    let duration_ms = u64::try_from(duration.map_or(0, |d| d.as_millis())).unwrap_or_default();
    info!(
        target: COMMAND_TARGET,
        command = %command_name,
        guild_id = %guild_label(ctx),
        user_id = %user_id,
        duration_ms = duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log errors that occur during command execution
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id.get(),
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
                user_id = %ctx.author().id.get(),
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
    fn test_moderation_filter() {
        assert!(is_moderation_target(MODERATION_TARGET));
        assert!(!is_moderation_target(COMMAND_TARGET));
        assert!(!is_moderation_target("warden::moderation::service"));
    }

    #[test]
    fn test_command_filter() {
        assert!(is_command_target(COMMAND_TARGET));
        assert!(is_command_target(ERROR_TARGET));
        assert!(!is_command_target(CONSOLE_TARGET));
    }
}
