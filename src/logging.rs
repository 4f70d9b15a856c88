//! Logging setup
//!
//! Warnings go to stderr (overridable with `RUST_LOG`). With `enable_logging`
//! set, a debug-level log is also appended to a file.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used for stderr when `RUST_LOG` is unset
const DEFAULT_STDERR_FILTER: &str = "gscdata=warn";

/// Filter used for the debug log file
const FILE_FILTER: &str = "gscdata=debug";

/// Installs the global subscriber
///
/// `log_file` enables the file layer. Returns the file actually opened, or
/// `None` if no file layer is active; a file that cannot be opened only
/// costs the file layer. Installing twice is a no-op.
pub fn init(log_file: Option<&Path>) -> Option<PathBuf> {
    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_STDERR_FILTER));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let opened = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some((path.to_path_buf(), file)),
        Err(e) => {
            eprintln!("gscdata: cannot open log file {}: {}", path.display(), e);
            None
        }
    });
    let active_path = opened.as_ref().map(|(path, _)| path.clone());
    let file_layer = opened.map(|(_, file)| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(EnvFilter::new(FILE_FILTER))
    });

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    active_path
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Deletes the log file; returns whether one existed
pub fn clear_log(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
