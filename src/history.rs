//! Hook invocation history.
//!
//! Append-only JSONL records at ~/.chatterbox-hook-history/
//! YYYY-MM-DD.jsonl. Diagnostic only; every failure here is swallowed
//! with a warning.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
pub struct HookRecord {
    pub timestamp: String,
    pub event: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub duration_ms: u64,
    pub service_up: bool,
}

pub fn default_history_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatterbox-hook-history")
}

pub fn now_timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

pub fn save_record(dir: &Path, record: &HookRecord) {
    if let Err(e) = fs::create_dir_all(dir) {
        warn!("Failed to create history dir: {e}");
        return;
    }

    // Date from timestamp (first 10 chars: YYYY-MM-DD)
    let date = record.timestamp.get(..10).unwrap_or("unknown");
    let path = dir.join(format!("{date}.jsonl"));

    let mut file = match fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to open history file: {e}");
            return;
        }
    };

    match serde_json::to_string(record) {
        Ok(line) => {
            if let Err(e) = writeln!(file, "{line}") {
                warn!("Failed to write history record: {e}");
            }
        }
        Err(e) => warn!("Failed to serialize history record: {e}"),
    }
}

pub fn load_records(dir: &Path, date: &str) -> Vec<HookRecord> {
    let path = dir.join(format!("{date}.jsonl"));
    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    contents
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_append_to_daily_file() {
        let dir = tempfile::tempdir().unwrap();

        for action in ["spoke", "skipped"] {
            save_record(
                dir.path(),
                &HookRecord {
                    timestamp: "2026-08-24T10:00:00.000".into(),
                    event: "Stop".into(),
                    action: action.into(),
                    detail: None,
                    text: Some("done".into()),
                    duration_ms: 12,
                    service_up: true,
                },
            );
        }

        let records = load_records(dir.path(), "2026-08-24");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, "spoke");
        assert_eq!(records[1].action, "skipped");
    }

    #[test]
    fn missing_day_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_records(dir.path(), "1999-01-01").is_empty());
    }

    #[test]
    fn none_fields_are_omitted_from_the_line() {
        let record = HookRecord {
            timestamp: now_timestamp(),
            event: "Notification".into(),
            action: "skipped".into(),
            detail: None,
            text: None,
            duration_ms: 3,
            service_up: false,
        };
        let line = serde_json::to_string(&record).unwrap();
        assert!(!line.contains("detail"));
        assert!(!line.contains("\"text\""));
    }
}
