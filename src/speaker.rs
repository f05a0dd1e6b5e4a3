//! TTS client used by the hooks.
//!
//! Tries the local ChatterBox service first (health pre-check, then
//! POST /speak with server-side playback). On any failure it falls
//! back to the ElevenLabs API, writing the returned MP3 to a temp
//! file and playing it through an external player. Every failure
//! degrades to silence; nothing here can abort the caller.

use std::env;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;

const ELEVENLABS_API: &str = "https://api.elevenlabs.io";
const PLAYBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// How a message ended up being (or not being) spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Spoken by the local service.
    Local,
    /// Spoken via the ElevenLabs fallback.
    Fallback,
    /// Both paths failed; the message was dropped.
    Failed,
}

impl SpeakOutcome {
    pub fn spoke(self) -> bool {
        !matches!(self, Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Fallback => "fallback",
            Self::Failed => "failed",
        }
    }
}

#[derive(Serialize)]
struct SpeakRequest {
    text: String,
    play: bool,
}

pub struct Speaker {
    client: Client,
    service_url: String,
    health_timeout: Duration,
    speak_timeout: Duration,
    fallback_enabled: bool,
    voice_id: String,
    model_id: String,
    player: String,
    player_args: Vec<String>,
}

impl Speaker {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(500))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            service_url: config.service.url.trim_end_matches('/').to_string(),
            health_timeout: Duration::from_secs_f64(config.speaker.health_timeout),
            speak_timeout: Duration::from_secs_f64(config.speaker.speak_timeout),
            fallback_enabled: config.fallback.enabled,
            voice_id: config.fallback.voice_id.clone(),
            model_id: config.fallback.model_id.clone(),
            player: config.fallback.player.clone(),
            player_args: config.fallback.player_args.clone(),
        }
    }

    pub async fn speak(&self, text: &str) -> SpeakOutcome {
        if self.speak_local(text).await {
            return SpeakOutcome::Local;
        }
        if self.fallback_enabled {
            debug!("Local TTS failed, trying ElevenLabs");
            if self.speak_elevenlabs(text).await {
                return SpeakOutcome::Fallback;
            }
        }
        SpeakOutcome::Failed
    }

    async fn speak_local(&self, text: &str) -> bool {
        // Quick health pre-check so a down service costs ~1s, not the
        // full synthesis timeout.
        let health = self
            .client
            .get(format!("{}/health", self.service_url))
            .timeout(self.health_timeout)
            .send()
            .await;
        match health {
            Ok(resp) if resp.status().is_success() => {}
            _ => {
                debug!("Local TTS service unavailable");
                return false;
            }
        }

        let request = SpeakRequest {
            text: text.to_string(),
            play: true,
        };
        match self
            .client
            .post(format!("{}/speak", self.service_url))
            .timeout(self.speak_timeout)
            .json(&request)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!("Local TTS returned {}", resp.status());
                false
            }
            Err(e) => {
                warn!("Local TTS request failed: {e}");
                false
            }
        }
    }

    async fn speak_elevenlabs(&self, text: &str) -> bool {
        let Some(api_key) = resolve_api_key() else {
            debug!("No ElevenLabs API key found");
            return false;
        };

        let url = format!("{ELEVENLABS_API}/v1/text-to-speech/{}", self.voice_id);
        let body = json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.5
            }
        });

        let resp = match self
            .client
            .post(&url)
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", api_key)
            .timeout(self.speak_timeout)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("ElevenLabs request failed: {e}");
                return false;
            }
        };

        if !resp.status().is_success() {
            warn!("ElevenLabs API error: {}", resp.status());
            return false;
        }

        let audio = match resp.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read ElevenLabs audio: {e}");
                return false;
            }
        };

        self.play_audio(&audio).await
    }

    async fn play_audio(&self, audio: &[u8]) -> bool {
        let mut scratch = match tempfile::Builder::new().suffix(".mp3").tempfile() {
            Ok(file) => file,
            Err(e) => {
                warn!("Failed to create audio scratch file: {e}");
                return false;
            }
        };
        if let Err(e) = scratch.write_all(audio) {
            warn!("Failed to write audio scratch file: {e}");
            return false;
        }

        let mut command = tokio::process::Command::new(&self.player);
        command
            .args(&self.player_args)
            .arg(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match tokio::time::timeout(PLAYBACK_TIMEOUT, command.status()).await {
            Ok(Ok(status)) if status.success() => true,
            Ok(Ok(status)) => {
                warn!("{} exited with {status}", self.player);
                false
            }
            Ok(Err(e)) => {
                warn!("Failed to run {}: {e}", self.player);
                false
            }
            Err(_) => {
                warn!("Audio playback timed out");
                false
            }
        }
    }
}

/// ElevenLabs API key lookup: environment first, then the dotenv
/// files the hooks historically shared.
pub fn resolve_api_key() -> Option<String> {
    if let Ok(key) = env::var("ELEVENLABS_API_KEY") {
        if !key.is_empty() {
            return Some(key);
        }
    }

    let home = dirs::home_dir()?;
    [home.join(".env"), home.join(".claude/.env")]
        .iter()
        .find_map(|path| key_from_env_file(path))
}

fn key_from_env_file(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    for line in contents.lines() {
        if let Some(value) = line.strip_prefix("ELEVENLABS_API_KEY=") {
            let key = value.trim().trim_matches('"').trim_matches('\'');
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_from_missing_file_is_none() {
        assert_eq!(key_from_env_file(Path::new("/nonexistent/.env")), None);
    }

    #[test]
    fn key_parsed_from_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "OTHER=1\nELEVENLABS_API_KEY=sk-abc123\n").unwrap();
        assert_eq!(key_from_env_file(&path), Some("sk-abc123".to_string()));
    }

    #[test]
    fn quoted_key_is_unquoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "ELEVENLABS_API_KEY=\"sk-quoted\"\n").unwrap();
        assert_eq!(key_from_env_file(&path), Some("sk-quoted".to_string()));
    }

    #[test]
    fn empty_key_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "ELEVENLABS_API_KEY=\n").unwrap();
        assert_eq!(key_from_env_file(&path), None);
    }

    #[test]
    fn outcome_spoke_covers_both_backends() {
        assert!(SpeakOutcome::Local.spoke());
        assert!(SpeakOutcome::Fallback.spoke());
        assert!(!SpeakOutcome::Failed.spoke());
    }
}
