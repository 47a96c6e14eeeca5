//! Terminal logging with an optional teed file sink.
//!
//! Every line goes to the terminal. While a capture scope is active
//! (see [`crate::capture`]), the same line is also written to the phase
//! log file and flushed immediately, so a crash mid-phase still leaves
//! partial output on disk.

use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

/// Clonable logging handle shared between a buildable unit and the
/// drain threads of any command it runs.
#[derive(Clone, Default, Debug)]
pub struct Logger {
    sink: Arc<Mutex<Option<File>>>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Informational line.
    pub fn out(&self, msg: &str) {
        println!("{msg}");
        self.tee(msg);
    }

    /// Warning line.
    pub fn warn(&self, msg: &str) {
        eprintln!("WARNING: {msg}");
        self.tee(&format!("WARNING: {msg}"));
    }

    /// Highlighted error line.
    pub fn out_red(&self, msg: &str) {
        eprintln!("ERROR: {msg}");
        self.tee(&format!("ERROR: {msg}"));
    }

    fn tee(&self, line: &str) {
        let mut guard = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{line}");
            let _ = file.flush();
        }
    }

    pub fn capture_active(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub(crate) fn install_sink(&self, file: File) -> Result<()> {
        let mut guard = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            bail!("output capture is already active; captures do not nest");
        }
        *guard = Some(file);
        Ok(())
    }

    pub(crate) fn remove_sink(&self) -> Option<File> {
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}
