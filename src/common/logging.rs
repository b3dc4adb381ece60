use anyhow::{anyhow, Result};
use clap::ValueEnum;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum LogLevel {
    No,
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Option<Level> {
        match self {
            LogLevel::No => None,
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Warning => Some(Level::WARN),
            LogLevel::Error => Some(Level::ERROR),
        }
    }
}

/// Installs the global subscriber. With a non-empty `log_file` output goes to a
/// daily rolled file next to it, and the returned guard must outlive the process
/// main loop or buffered lines are lost.
pub fn init_logger(log_level: LogLevel, log_file: &str) -> Result<Option<WorkerGuard>> {
    let Some(level) = log_level.to_tracing_level() else {
        return Ok(None);
    };

    let env_filter =
        EnvFilter::from_default_env().add_directive(LevelFilter::from_level(level).into());

    if log_file.is_empty() {
        let subscriber = fmt()
            .with_writer(io::stdout)
            .with_env_filter(env_filter)
            .with_file(false)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| anyhow!("Couldn't install stdout logger: {}", e))?;

        return Ok(None);
    }

    let path = Path::new(log_file);
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("Log file {} has no file name", log_file))?;

    let file_appender = rolling::daily(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(env_filter)
        .with_file(false)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Couldn't install file logger: {}", e))?;

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(LogLevel::No.to_tracing_level(), None);
        assert_eq!(LogLevel::Warning.to_tracing_level(), Some(Level::WARN));
    }

    #[test]
    fn test_no_logging_installs_nothing() {
        assert!(init_logger(LogLevel::No, "").unwrap().is_none());
    }
}
