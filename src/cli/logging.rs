//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The level comes from `LUACM_LOG` when it names a level, otherwise from
//! `--verbosity`. Logs go to stderr so stdout carries only script output.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::fmt;

pub const LOG_ENV: &str = "LUACM_LOG";

pub fn init_logging(verbosity: u8, timestamps: bool) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let level = resolve_level(verbosity, env.as_deref());

    let builder = fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = if timestamps {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };
    installed.map_err(|e| anyhow!("failed to install logger: {e}"))
}

pub fn resolve_level(verbosity: u8, env: Option<&str>) -> Level {
    env.and_then(parse_level_str)
        .unwrap_or_else(|| level_for_verbosity(verbosity))
}

pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
