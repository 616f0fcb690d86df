//! 观测性初始化。

pub mod events;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::orchestrator::config::env_flag;

const LOG_FILE_NAME: &str = "callbridge.log";

#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub json: bool,
    pub log_dir: Option<PathBuf>,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            json: env_flag("RELAY_LOG_JSON").unwrap_or(false),
            log_dir: std::env::var("RELAY_LOG_DIR")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

/// Installs the global subscriber. Keep the returned guard alive for as long
/// as logs should be flushed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<WorkerGuard> {
    let (writer, guard) = make_writer(config.log_dir.as_deref())?;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if config.json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer().with_target(false).with_writer(writer).boxed()
    };

    let subscriber = Registry::default().with(env_filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global subscriber")?;
    Ok(guard)
}

fn make_writer(log_dir: Option<&Path>) -> Result<(NonBlocking, WorkerGuard)> {
    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            Ok(tracing_appender::non_blocking(appender))
        }
        None => Ok(tracing_appender::non_blocking(io::stdout())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn file_writer_lands_in_log_dir() {
        let directory = tempdir().expect("tempdir for logs");
        let log_dir = directory.path().join("logs");

        let (mut writer, guard) = make_writer(Some(&log_dir)).expect("writer created");
        writer
            .write_all(b"relay started\n")
            .expect("line accepted");
        drop(writer);
        drop(guard);

        let contents =
            std::fs::read_to_string(log_dir.join(LOG_FILE_NAME)).expect("log file readable");
        assert!(contents.contains("relay started"));
    }
}
