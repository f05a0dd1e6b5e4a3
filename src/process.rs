//! OS process collaborators: liveness/identity inspection, signal
//! delivery, and detached spawning of the service process.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::info;

use crate::config::ServiceConfig;

/// Process-table seam: the supervisor never touches the OS directly.
pub trait ProcessTable {
    fn is_alive(&self, pid: u32) -> bool;
    /// Full command line of the process, if it can be inspected.
    fn command_line(&self, pid: u32) -> Option<String>;
    /// SIGTERM. Returns false when the process is already gone.
    fn terminate(&self, pid: u32) -> bool;
    /// SIGKILL. Returns false when the process is already gone.
    fn kill(&self, pid: u32) -> bool;
}

pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn is_alive(&self, pid: u32) -> bool {
        signal_process(pid, None)
    }

    fn command_line(&self, pid: u32) -> Option<String> {
        let raw = fs::read(format!("/proc/{pid}/cmdline")).ok()?;
        if raw.is_empty() {
            return None;
        }
        let joined = raw
            .split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(" ");
        Some(joined)
    }

    fn terminate(&self, pid: u32) -> bool {
        signal_process(pid, Some(Signal::SIGTERM))
    }

    fn kill(&self, pid: u32) -> bool {
        signal_process(pid, Some(Signal::SIGKILL))
    }
}

/// Signal 0 probes liveness without delivering anything. EPERM means
/// the process exists but belongs to another user.
fn signal_process(pid: u32, signal: Option<Signal>) -> bool {
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to create log directory {}: {source}", path.display())]
    LogDir {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to open log file {}: {source}", path.display())]
    LogOpen {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to launch {command}: {source}")]
    Launch {
        command: String,
        source: io::Error,
    },
}

/// Spawner seam for `start()`.
pub trait ServiceSpawner {
    fn spawn(&self) -> Result<u32, SpawnError>;
}

/// Launches the configured service command in its own process group,
/// with stdout/stderr appended to the service log files, so it
/// survives the short-lived supervisor invocation.
pub struct CommandSpawner {
    command: String,
    args: Vec<String>,
    stdout_log: PathBuf,
    stderr_log: PathBuf,
}

impl CommandSpawner {
    pub fn new(service: &ServiceConfig) -> Self {
        Self {
            command: service.command.clone(),
            args: service.args.clone(),
            stdout_log: service.stdout_log(),
            stderr_log: service.stderr_log(),
        }
    }
}

impl ServiceSpawner for CommandSpawner {
    fn spawn(&self) -> Result<u32, SpawnError> {
        if let Some(dir) = self.stdout_log.parent() {
            fs::create_dir_all(dir).map_err(|source| SpawnError::LogDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let stdout = open_append(&self.stdout_log)?;
        let stderr = open_append(&self.stderr_log)?;

        let child = {
            use std::os::unix::process::CommandExt;
            Command::new(&self.command)
                .args(&self.args)
                .stdin(Stdio::null())
                .stdout(stdout)
                .stderr(stderr)
                .process_group(0)
                .spawn()
                .map_err(|source| SpawnError::Launch {
                    command: self.command.clone(),
                    source,
                })?
        };

        let pid = child.id();
        info!("Launched {} with PID {pid}", self.command);
        Ok(pid)
    }
}

fn open_append(path: &Path) -> Result<fs::File, SpawnError> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SpawnError::LogOpen {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_alive() {
        let table = SystemProcessTable;
        assert!(table.is_alive(std::process::id()));
    }

    #[test]
    fn dead_pid_is_not_alive() {
        let table = SystemProcessTable;
        // PID from far beyond the default pid_max.
        assert!(!table.is_alive(4_194_304 + 1));
    }

    #[test]
    fn own_command_line_is_readable() {
        let table = SystemProcessTable;
        let cmdline = table.command_line(std::process::id()).unwrap();
        assert!(!cmdline.is_empty());
    }

    #[test]
    fn spawn_failure_reports_command() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = CommandSpawner {
            command: "definitely-not-a-real-binary".into(),
            args: vec![],
            stdout_log: dir.path().join("logs/out.log"),
            stderr_log: dir.path().join("logs/err.log"),
        };
        let err = spawner.spawn().unwrap_err();
        assert!(matches!(err, SpawnError::Launch { .. }));
        assert!(err.to_string().contains("definitely-not-a-real-binary"));
    }
}
