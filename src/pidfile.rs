//! Persisted PID record.
//!
//! One plain-integer file at a well-known location; absence means
//! "not running". A corrupt or unreadable record is self-healing: it
//! is discarded with a warning, never surfaced as an error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the recorded PID. Corrupt or unreadable records are
    /// deleted and reported as absent.
    pub fn load(&self) -> Option<u32> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read PID record {}: {e}, discarding", self.path.display());
                self.clear();
                return None;
            }
        };

        match contents.trim().parse::<u32>() {
            Ok(pid) => Some(pid),
            Err(_) => {
                warn!("Corrupt PID record {}, discarding", self.path.display());
                self.clear();
                None
            }
        }
    }

    /// Persist a new PID, replacing any previous record.
    pub fn store(&self, pid: u32) {
        if let Some(dir) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!("Failed to create state dir {}: {e}", dir.display());
                return;
            }
        }
        if let Err(e) = fs::write(&self.path, format!("{pid}\n")) {
            warn!("Failed to write PID record {}: {e}", self.path.display());
        } else {
            info!("Recorded PID {pid} at {}", self.path.display());
        }
    }

    /// Remove the record. Missing files are fine.
    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove PID record {}: {e}", self.path.display()),
        }
    }
}
