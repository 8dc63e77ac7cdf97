//! Command-line interface parsing for wsbridge
//!
//! This module handles parsing of CLI arguments using clap and turns them
//! into the paths and limits the daemon starts with.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::store::default_state_dir;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// No `--state-dir` given and no home directory to derive one from
    #[error("cannot determine a state directory, pass --state-dir")]
    NoStateDir,

    #[error("--beats must be at least 1")]
    ZeroBeats,
}

/// wsbridge - publish OpenWeatherMap observations as accessory state
#[derive(Parser, Debug)]
#[command(name = "wsbridge")]
#[command(about = "Poll OpenWeatherMap and publish the observations as sensor state")]
#[command(version)]
pub struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    pub config: PathBuf,

    /// Directory for persisted location contexts and history
    ///
    /// Defaults to the platform data directory, e.g. ~/.local/share/wsbridge
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Stop after this many heartbeats instead of running until interrupted
    #[arg(long, value_name = "N")]
    pub beats: Option<u64>,
}

/// Settings derived from CLI arguments for daemon startup
#[derive(Debug, Clone, PartialEq)]
pub struct StartupConfig {
    pub config_path: PathBuf,
    pub state_dir: PathBuf,
    pub beats: Option<u64>,
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let state_dir = match &cli.state_dir {
            Some(dir) => dir.clone(),
            None => default_state_dir().ok_or(CliError::NoStateDir)?,
        };
        if cli.beats == Some(0) {
            return Err(CliError::ZeroBeats);
        }
        Ok(Self {
            config_path: cli.config.clone(),
            state_dir,
            beats: cli.beats,
        })
    }

    /// Directory of the context store
    pub fn contexts_dir(&self) -> PathBuf {
        self.state_dir.join("contexts")
    }

    /// Directory of the history files
    pub fn history_dir(&self) -> PathBuf {
        self.state_dir.join("history")
    }
}
