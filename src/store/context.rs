//! Context store for persisting resolved locations to disk
//!
//! Provides a `ContextStore` that keeps one JSON file per tracked location in
//! an XDG data directory.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::data::ResolvedLocation;
use crate::history::file_key;

const CONTEXT_PREFIX: &str = "context_";

/// State kept for a tracked location across restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationContext {
    /// Location key as configured
    pub location: String,
    /// Coordinates the key resolved to
    pub resolved: ResolvedLocation,
    /// When the context was written
    pub saved_at: DateTime<Utc>,
}

/// Default directory for persisted state
///
/// Uses `~/.local/share/wsbridge/` on Linux, or the equivalent on other
/// platforms. Returns `None` if no home directory can be determined.
pub fn default_state_dir() -> Option<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "wsbridge")?;
    Some(project_dirs.data_dir().to_path_buf())
}

/// Reads and writes location contexts
#[derive(Debug, Clone)]
pub struct ContextStore {
    /// Directory where context files are stored
    dir: PathBuf,
}

impl ContextStore {
    /// Creates a ContextStore with a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn context_path(&self, location: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}.json", CONTEXT_PREFIX, file_key(location)))
    }

    /// Writes the context of a location, replacing any previous one
    pub fn save(&self, location: &str, resolved: &ResolvedLocation) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let context = LocationContext {
            location: location.to_string(),
            resolved: resolved.clone(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&context)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        fs::write(self.context_path(location), json)
    }

    /// Reads the context of a location
    ///
    /// Returns `None` if it doesn't exist or cannot be parsed.
    pub fn load(&self, location: &str) -> Option<LocationContext> {
        let content = fs::read_to_string(self.context_path(location)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Reads every stored context, skipping unreadable files
    pub fn load_all(&self) -> Vec<LocationContext> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut contexts: Vec<LocationContext> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_context_file(path))
            .filter_map(|path| {
                let parsed = fs::read_to_string(&path)
                    .ok()
                    .and_then(|content| serde_json::from_str(&content).ok());
                if parsed.is_none() {
                    warn!("ignoring unreadable context file {}", path.display());
                }
                parsed
            })
            .collect();
        contexts.sort_by(|a, b| a.location.cmp(&b.location));
        contexts
    }

    /// Deletes the context of a location
    pub fn forget(&self, location: &str) -> io::Result<()> {
        match fs::remove_file(self.context_path(location)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

fn is_context_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|name| name.to_str()).unwrap_or("");
    name.starts_with(CONTEXT_PREFIX) && name.ends_with(".json")
}
