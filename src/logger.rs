use std::path::PathBuf;

use anyhow::Result;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Initialize tracing for the host binary.
///
/// - `log_level` is an `EnvFilter` directive (e.g. `"info"`), overridable via
///   `RUST_LOG`.
/// - `log_file` adds a daily-rolling plain-text appender next to the
///   stderr layer.
pub fn init_tracing(log_level: &str, log_file: Option<PathBuf>) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            std::fs::create_dir_all(dir)?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "openwork.log".to_string());
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, file_name);
            let file_layer = fmt::layer().with_writer(appender).with_ansi(false);
            Registry::default()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        None => {
            Registry::default().with(env_filter).with(stderr_layer).init();
        }
    }

    Ok(())
}
