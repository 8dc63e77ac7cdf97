//! Historical log entries
//!
//! Trackers hand a timestamped sample to a `HistoryRecorder` every
//! `HISTORY_INTERVAL_BEATS` beats, independent of their polling heartrate.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Beats between history entries
pub const HISTORY_INTERVAL_BEATS: u64 = 300;

/// Beat within the interval at which entries are recorded
pub const HISTORY_PHASE: u64 = 5;

/// Errors that can occur when recording history
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode history entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Values captured in one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistorySample {
    Weather {
        temperature: f64,
        humidity: f64,
        pressure: f64,
    },
    Motion {
        motion: bool,
    },
}

/// A timestamped history sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub sample: HistorySample,
}

/// Sink for history entries, provided by the host
pub trait HistoryRecorder: Send + Sync {
    /// Append an entry for a location
    fn record(&self, location: &str, entry: &HistoryEntry) -> Result<(), HistoryError>;

    /// Drop all history of a location
    fn remove(&self, location: &str) -> Result<(), HistoryError>;
}

/// Appends entries as JSON lines, one file per location
#[derive(Debug, Clone)]
pub struct JsonlHistory {
    dir: PathBuf,
}

impl JsonlHistory {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Path of the history file for a location
    pub fn path(&self, location: &str) -> PathBuf {
        self.dir
            .join(format!("history_{}.jsonl", file_key(location)))
    }
}

impl HistoryRecorder for JsonlHistory {
    fn record(&self, location: &str, entry: &HistoryEntry) -> Result<(), HistoryError> {
        fs::create_dir_all(&self.dir)?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(location))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn remove(&self, location: &str) -> Result<(), HistoryError> {
        match fs::remove_file(self.path(location)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<(String, HistoryEntry)>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries recorded for a location, oldest first
    pub fn entries(&self, location: &str) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(key, _)| key == location)
                    .map(|(_, entry)| entry.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl HistoryRecorder for MemoryHistory {
    fn record(&self, location: &str, entry: &HistoryEntry) -> Result<(), HistoryError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((location.to_string(), entry.clone()));
        }
        Ok(())
    }

    fn remove(&self, location: &str) -> Result<(), HistoryError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(key, _)| key != location);
        }
        Ok(())
    }
}

/// File-name-safe form of a location key
pub fn file_key(location: &str) -> String {
    location
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
