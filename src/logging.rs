// Logging setup and conditional logging macros.
// `debug_log!`/`info_log!` are only active in debug builds; they carry the
// per-line and per-frame tracing that would flood a release log.

use chrono::Local;
use env_logger::{Builder, Env, Target};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const DEFAULT_FILTER: &str = "sokoban_festival=info";
const LOG_FILE_NAME: &str = "festival.log";

#[cfg(debug_assertions)]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        log::debug!($($arg)*);
    };
}

#[cfg(not(debug_assertions))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {{}};
}

#[cfg(debug_assertions)]
#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {
        log::info!($($arg)*);
    };
}

#[cfg(not(debug_assertions))]
#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {{}};
}

/// Default log file location when the terminal UI owns stdout/stderr.
#[must_use]
pub fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("sokoban-festival").join(LOG_FILE_NAME))
}

/// Initialise `env_logger`, honouring `RUST_LOG`.
///
/// With `log_file` set, records go to that file (created along with its
/// parent directory); otherwise they go to stderr.
pub fn init_logging(log_file: Option<&Path>) -> io::Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    // A second initialisation (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_path_uses_crate_directory() {
        if let Some(path) = default_log_path() {
            assert!(path.ends_with("sokoban-festival/festival.log"));
        }
    }

    #[test]
    fn test_init_logging_creates_log_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("festival.log");
        init_logging(Some(&path)).expect("logging initialised");
        assert!(path.exists());
    }
}
