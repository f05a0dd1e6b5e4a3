//! Service lifecycle supervisor.
//!
//! Owns one background TTS service process: derives its state from
//! the PID record and the health endpoint, starts it detached, stops
//! it gracefully-then-forcefully, restarts it, and reports status.
//!
//! The PID record and the health endpoint are two independent,
//! occasionally-inconsistent sources of truth: the process can exist
//! but still be loading its model, and the endpoint can be healthy
//! with no local PID record (started by another tool). State checks
//! prioritise "is it serving traffic" over "do we have a PID", but a
//! live unresponsive process keeps its record so a slow model load
//! never triggers a false restart.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::config::SupervisorConfig;
use crate::health::{HealthProbe, HealthReport, Probe};
use crate::pidfile::PidFile;
use crate::process::{ProcessTable, ServiceSpawner, SpawnError};

/// Service state, derived fresh on every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotRunning,
    /// Our recorded process is alive and the endpoint answers.
    Responsive,
    /// Our recorded process is alive but the endpoint does not answer
    /// yet. The PID record is retained.
    Unresponsive,
    /// The endpoint answers but no PID record exists; some other
    /// invocation started the service. No PID is adopted.
    External,
}

impl ServiceState {
    /// The boolean the rest of the system cares about: is the service
    /// serving traffic.
    pub fn is_up(self) -> bool {
        matches!(self, Self::Responsive | Self::External)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRunning => write!(f, "not running"),
            Self::Responsive => write!(f, "running"),
            Self::Unresponsive => write!(f, "running (not responsive yet)"),
            Self::External => write!(f, "running (started externally)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The service was already up; nothing was spawned.
    AlreadyRunning,
    /// Spawned and confirmed ready within the timeout.
    Ready { pid: u32 },
    /// Degraded success: spawned, but readiness was not confirmed
    /// within the timeout. The process may still become ready.
    Launched { pid: u32 },
    /// Another invocation holds the start lock; nothing was spawned.
    AlreadyStarting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The stop sequence ran; the record is cleared.
    Stopped,
    /// The recorded process was already gone.
    AlreadyExited,
    /// No usable PID record existed.
    NoRecord,
}

/// Snapshot for the `status` subcommand.
#[derive(Debug)]
pub struct StatusReport {
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub health: Option<HealthReport>,
}

pub struct Supervisor<P, H, S> {
    config: SupervisorConfig,
    signature: String,
    pid_file: PidFile,
    table: P,
    probe: H,
    spawner: S,
}

impl<P, H, S> Supervisor<P, H, S>
where
    P: ProcessTable,
    H: HealthProbe,
    S: ServiceSpawner,
{
    pub fn new(
        config: SupervisorConfig,
        signature: String,
        pid_file: PidFile,
        table: P,
        probe: H,
        spawner: S,
    ) -> Self {
        Self {
            config,
            signature,
            pid_file,
            table,
            probe,
            spawner,
        }
    }

    /// Derive the current service state.
    ///
    /// A recorded PID is trusted only if the process is alive and its
    /// command line matches the expected signature; stale and foreign
    /// records are discarded on sight.
    pub async fn check(&self) -> ServiceState {
        if let Some(pid) = self.pid_file.load() {
            if !self.table.is_alive(pid) {
                info!("Recorded PID {pid} is gone, clearing record");
                self.pid_file.clear();
                return ServiceState::NotRunning;
            }

            match self.table.command_line(pid) {
                Some(cmdline) if cmdline.contains(&self.signature) => {
                    return match self.probe.check(self.config.health_timeout()).await {
                        Probe::Ok(_) => ServiceState::Responsive,
                        Probe::Unreachable => ServiceState::Unresponsive,
                    };
                }
                _ => {
                    warn!("PID {pid} no longer belongs to the service, clearing record");
                    self.pid_file.clear();
                }
            }
        }

        match self.probe.check(self.config.probe_timeout()).await {
            Probe::Ok(_) => {
                info!("Service is responding without a PID record (started externally)");
                ServiceState::External
            }
            Probe::Unreachable => ServiceState::NotRunning,
        }
    }

    /// Spawn the service if it is not already up, then wait for the
    /// model to finish loading.
    ///
    /// A launch that does not reach readiness within the timeout is a
    /// degraded success, not a failure; only the spawn itself can
    /// hard-fail.
    pub async fn start(&self) -> Result<StartOutcome, SpawnError> {
        if self.check().await.is_up() {
            info!("Service is already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        // Advisory lock narrows the check-then-spawn race between
        // concurrent invocations; it cannot close it entirely.
        let lock_path = self.pid_file.path().with_extension("lock");
        let Some(_lock) = StartLock::acquire(lock_path, self.config.start_timeout()) else {
            info!("Another invocation is already starting the service");
            return Ok(StartOutcome::AlreadyStarting);
        };

        info!("Starting ChatterBox TTS service...");
        let pid = self.spawner.spawn()?;
        self.pid_file.store(pid);

        info!("Waiting for service to be ready...");
        if self.wait_for_ready().await {
            info!("Service is ready (PID {pid})");
            Ok(StartOutcome::Ready { pid })
        } else {
            warn!(
                "Service started (PID {pid}) but not responsive within {:.0}s",
                self.config.start_timeout
            );
            Ok(StartOutcome::Launched { pid })
        }
    }

    /// Poll the health endpoint until it reports both HTTP success
    /// and a loaded model, or the start timeout elapses.
    async fn wait_for_ready(&self) -> bool {
        let deadline = Instant::now() + self.config.start_timeout();
        loop {
            if self
                .probe
                .check(self.config.probe_timeout())
                .await
                .model_loaded()
            {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.config.poll_interval()).await;
        }
    }

    /// Graceful-then-forced termination of the recorded process.
    ///
    /// The PID record is cleared unconditionally once the sequence
    /// completes; the intent was to stop the service.
    pub async fn stop(&self) -> StopOutcome {
        let Some(pid) = self.pid_file.load() else {
            info!("No PID record found");
            return StopOutcome::NoRecord;
        };

        info!("Stopping service with PID {pid}...");
        if !self.table.terminate(pid) {
            info!("Process already stopped");
            self.pid_file.clear();
            return StopOutcome::AlreadyExited;
        }

        sleep(self.config.stop_grace()).await;

        if self.table.is_alive(pid) {
            warn!("PID {pid} survived SIGTERM, sending SIGKILL");
            self.table.kill(pid);
            sleep(self.config.kill_wait()).await;
        }

        self.pid_file.clear();
        info!("Service stopped");
        StopOutcome::Stopped
    }

    /// Stop, wait for the old listener to release its port, start.
    pub async fn restart(&self) -> Result<StartOutcome, SpawnError> {
        info!("Restarting service...");
        self.stop().await;
        sleep(self.config.restart_delay()).await;
        self.start().await
    }

    /// The one operation external callers use: idempotent and free of
    /// side effects when the service is already up.
    pub async fn ensure_running(&self) -> Result<StartOutcome, SpawnError> {
        if self.check().await.is_up() {
            return Ok(StartOutcome::AlreadyRunning);
        }
        self.start().await
    }

    pub async fn status(&self) -> StatusReport {
        let state = self.check().await;
        let pid = self.pid_file.load();
        let health = match self.probe.check(self.config.health_timeout()).await {
            Probe::Ok(report) => Some(report),
            Probe::Unreachable => None,
        };
        StatusReport { state, pid, health }
    }
}

/// Advisory start lock: a create-new file next to the PID record.
/// Held for the duration of one start sequence and removed on drop.
struct StartLock {
    path: PathBuf,
}

impl StartLock {
    fn acquire(path: PathBuf, stale_after: Duration) -> Option<Self> {
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Some(Self { path }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !lock_is_stale(&path, stale_after) {
                    return None;
                }
                warn!("Reclaiming stale start lock at {}", path.display());
                let _ = fs::remove_file(&path);
                match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                    Ok(_) => Some(Self { path }),
                    Err(_) => None,
                }
            }
            Err(e) => {
                // Lock file I/O must not block a start; proceed unlocked.
                warn!("Could not create start lock {}: {e}", path.display());
                Some(Self { path })
            }
        }
    }
}

impl Drop for StartLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove start lock {}: {e}", self.path.display()),
        }
    }
}

/// A lock older than one full start timeout belongs to a crashed or
/// wedged invocation.
fn lock_is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > stale_after)
        .unwrap_or(true)
}
