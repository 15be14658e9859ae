//! Logging setup.
//!
//! Everything logs through the `log` facade. By default `RUST_LOG` drives
//! stderr output; `--log` redirects debug records into a file instead so the
//! terminal stays readable.

use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

/// Debug log that is a no-op unless file logging was enabled
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if $crate::logger::is_logging_enabled() {
            log::debug!($($arg)*);
        }
    };
}

pub fn enable_logging() {
    LOGGING_ENABLED.store(true, Ordering::Relaxed);
}

pub fn disable_logging() {
    LOGGING_ENABLED.store(false, Ordering::Relaxed);
}

pub fn is_logging_enabled() -> bool {
    LOGGING_ENABLED.load(Ordering::Relaxed)
}

/// Initialize the global logger.
///
/// With `log_file` set, all records at debug level and above go to that file.
/// Otherwise the usual `RUST_LOG` filter applies, defaulting to `warn`.
/// Calling this twice is harmless; the second logger is dropped.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("warn"));

    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        builder
            .target(Target::Pipe(Box::new(file)))
            .filter_level(LevelFilter::Debug)
            .write_style(env_logger::WriteStyle::Never);
        enable_logging();
    } else {
        disable_logging();
    }

    builder.try_init().ok();
    Ok(())
}
