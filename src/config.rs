//! Configuration management for chatterbox-rs.
//!
//! Loads config from YAML files in standard locations. Every section
//! has full defaults so the binaries work with no config file at all.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Command used to launch the TTS service process.
    pub command: String,
    pub args: Vec<String>,
    /// Base URL of the running service.
    pub url: String,
    /// Substring matched against /proc/<pid>/cmdline to confirm a
    /// recorded PID still belongs to our service (guards PID reuse).
    pub signature: String,
    /// Directory for the PID record and log files. Defaults to
    /// ~/.local/state/chatterbox.
    pub state_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            command: "chatterbox-server".into(),
            args: vec![
                "--host".into(),
                "127.0.0.1".into(),
                "--port".into(),
                "8000".into(),
            ],
            url: "http://127.0.0.1:8000".into(),
            signature: "chatterbox-server".into(),
            state_dir: None,
        }
    }
}

impl ServiceConfig {
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local/state/chatterbox")
        })
    }

    pub fn pid_path(&self) -> PathBuf {
        self.state_dir().join("chatterbox.pid")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.log_dir().join("chatterbox.log")
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.log_dir().join("chatterbox.error.log")
    }

    /// The supervisor's own timestamped activity log, separate from
    /// the spawned service's output logs.
    pub fn activity_log(&self) -> PathBuf {
        self.log_dir().join("manager.log")
    }
}

/// Timeouts and intervals for the lifecycle supervisor, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Health-check timeout when a recorded PID is alive.
    pub health_timeout: f64,
    /// Shorter probe timeout for the no-PID external check.
    pub probe_timeout: f64,
    /// How long start() waits for the model to finish loading.
    pub start_timeout: f64,
    /// Interval between readiness polls during start().
    pub poll_interval: f64,
    /// Grace period after SIGTERM before escalating to SIGKILL.
    pub stop_grace: f64,
    /// Settle time after SIGKILL.
    pub kill_wait: f64,
    /// Delay between stop and start during restart(), so the old
    /// process can release its listening port.
    pub restart_delay: f64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_timeout: 2.0,
            probe_timeout: 1.0,
            start_timeout: 30.0,
            poll_interval: 0.5,
            stop_grace: 2.0,
            kill_wait: 1.0,
            restart_delay: 2.0,
        }
    }
}

impl SupervisorConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.health_timeout)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.probe_timeout)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.start_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs_f64(self.stop_grace)
    }

    pub fn kill_wait(&self) -> Duration {
        Duration::from_secs_f64(self.kill_wait)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs_f64(self.restart_delay)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    /// Timeout for synthesis requests, in seconds.
    pub speak_timeout: f64,
    /// Timeout for the pre-speak health check, in seconds.
    pub health_timeout: f64,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            speak_timeout: 30.0,
            health_timeout: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub voice_id: String,
    pub model_id: String,
    /// External player used for the fallback MP3.
    pub player: String,
    pub player_args: Vec<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            voice_id: "EXAVITQu4vr4xnSDxMaL".into(),
            model_id: "eleven_turbo_v2_5".into(),
            player: "mpv".into(),
            player_args: vec!["--really-quiet".into()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub supervisor: SupervisorConfig,
    pub speaker: SpeakerConfig,
    pub fallback: FallbackConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/chatterbox/config.yaml
    /// 3. /etc/chatterbox/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/chatterbox/config.yaml")),
                Some(PathBuf::from("/etc/chatterbox/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_no_file() {
        let config = Config::load(Some(Path::new("/nonexistent/config.yaml")));
        assert_eq!(config.service.url, "http://127.0.0.1:8000");
        assert_eq!(config.supervisor.start_timeout, 30.0);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "supervisor:\n  start_timeout: 5.0\nservice:\n  url: http://127.0.0.1:9000\n";
        let config: Config = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.supervisor.start_timeout, 5.0);
        // untouched fields keep their defaults
        assert_eq!(config.supervisor.poll_interval, 0.5);
        assert_eq!(config.service.url, "http://127.0.0.1:9000");
        assert_eq!(config.service.command, "chatterbox-server");
        assert!(config.fallback.enabled);
    }

    #[test]
    fn load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "service:\n  signature: my-tts").unwrap();

        let config = Config::load(Some(&path));
        assert_eq!(config.service.signature, "my-tts");
    }

    #[test]
    fn state_paths_derive_from_state_dir() {
        let config = ServiceConfig {
            state_dir: Some(PathBuf::from("/tmp/cb-state")),
            ..ServiceConfig::default()
        };
        assert_eq!(config.pid_path(), PathBuf::from("/tmp/cb-state/chatterbox.pid"));
        assert_eq!(config.stdout_log(), PathBuf::from("/tmp/cb-state/logs/chatterbox.log"));
        assert_eq!(config.activity_log(), PathBuf::from("/tmp/cb-state/logs/manager.log"));
    }
}
