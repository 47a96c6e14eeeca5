//! Per-phase state records under the package state directory.
//!
//! Each completed phase leaves a small JSON document behind so that
//! outer tooling can tell which phases already ran for a package without
//! re-parsing logs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const RECORD_SUBDIR: &str = "phases";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: String,
    pub status: String,
    pub created_at_utc: String,
    pub finished_at_utc: Option<String>,
}

pub fn record_path(statedir: &Path, phase: &str) -> PathBuf {
    statedir.join(RECORD_SUBDIR).join(format!("{phase}.json"))
}

pub fn now_utc() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("formatting UTC timestamp")
}

/// Record a successfully completed phase.
pub fn write_phase_record(statedir: &Path, phase: &str, created_at_utc: &str) -> Result<()> {
    let record = PhaseRecord {
        phase: phase.to_string(),
        status: "success".to_string(),
        created_at_utc: created_at_utc.to_string(),
        finished_at_utc: Some(now_utc()?),
    };
    let path = record_path(statedir, phase);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating phase record directory '{}'", parent.display()))?;
    }
    let bytes =
        serde_json::to_vec_pretty(&record).with_context(|| "serializing phase record")?;
    fs::write(&path, bytes)
        .with_context(|| format!("writing phase record '{}'", path.display()))?;
    Ok(())
}

/// Load all phase records for a package. A missing directory is an empty
/// history, not an error.
pub fn load_phase_records(statedir: &Path) -> Result<Vec<PhaseRecord>> {
    let dir = statedir.join(RECORD_SUBDIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut records = Vec::new();
    for entry in fs::read_dir(&dir)
        .with_context(|| format!("reading phase record directory '{}'", dir.display()))?
    {
        let entry = entry
            .with_context(|| format!("iterating phase record directory '{}'", dir.display()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let bytes = fs::read(&path)
            .with_context(|| format!("reading phase record '{}'", path.display()))?;
        let parsed: PhaseRecord = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing phase record '{}'", path.display()))?;
        records.push(parsed);
    }
    records.sort_by(|a, b| a.created_at_utc.cmp(&b.created_at_utc));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_load_records() {
        let temp = TempDir::new().unwrap();
        let statedir = temp.path().join(".xbps-foo");

        write_phase_record(&statedir, "fetch", &now_utc().unwrap()).unwrap();
        write_phase_record(&statedir, "build", &now_utc().unwrap()).unwrap();

        let records = load_phase_records(&statedir).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status == "success"));
        assert!(records.iter().any(|r| r.phase == "fetch"));
        assert!(records.iter().all(|r| r.finished_at_utc.is_some()));
    }

    #[test]
    fn test_missing_statedir_is_empty_history() {
        let temp = TempDir::new().unwrap();
        let records = load_phase_records(&temp.path().join("nope")).unwrap();
        assert!(records.is_empty());
    }
}
