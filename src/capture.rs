//! Scoped redirection of a logger into a per-phase log file.
//!
//! Acquiring a [`CaptureScope`] opens (truncates) the log file and
//! installs it as the logger's teed sink; dropping the scope removes the
//! sink and flushes it on every exit path, including unwinding out of a
//! failed phase body. Captures are exclusive per logger.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::logger::Logger;

#[derive(Debug)]
pub struct CaptureScope {
    logger: Logger,
    path: PathBuf,
}

impl CaptureScope {
    /// Redirect `logger` into the log file at `path` for the lifetime of
    /// the returned scope.
    pub fn redirect(logger: &Logger, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory '{}'", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("creating log file '{}'", path.display()))?;
        logger.install_sink(file)?;
        Ok(Self {
            logger: logger.clone(),
            path: path.to_path_buf(),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        if let Some(mut file) = self.logger.remove_sink() {
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_capture_tees_and_restores() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state/foo__do_build.log");
        let logger = Logger::new();

        {
            let _scope = CaptureScope::redirect(&logger, &path).unwrap();
            assert!(logger.capture_active());
            logger.out("inside capture");
        }

        assert!(!logger.capture_active());
        logger.out("outside capture");

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "inside capture\n");
    }

    #[test]
    fn test_capture_released_on_unwind() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("panic.log");
        let logger = Logger::new();

        let logger2 = logger.clone();
        let path2 = path.clone();
        let result = std::panic::catch_unwind(move || {
            let _scope = CaptureScope::redirect(&logger2, &path2).unwrap();
            panic!("phase body exploded");
        });
        assert!(result.is_err());
        assert!(!logger.capture_active());
    }

    #[test]
    fn test_nested_capture_rejected() {
        let temp = TempDir::new().unwrap();
        let logger = Logger::new();

        let _outer = CaptureScope::redirect(&logger, &temp.path().join("outer.log")).unwrap();
        let err = CaptureScope::redirect(&logger, &temp.path().join("inner.log")).unwrap_err();
        assert!(err.to_string().contains("already active"));
    }
}
