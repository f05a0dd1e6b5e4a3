//! notify-hook: Claude Code hook binary for spoken notifications.
//!
//! Reads event JSON from stdin, templates a short message for the
//! current project, ensures the ChatterBox service is running on
//! SessionStart, and speaks via the local service with ElevenLabs
//! fallback. Logs every invocation to
//! ~/.chatterbox-hook-history/YYYY-MM-DD.jsonl and always exits 0 —
//! a TTS outage must never break the surrounding session.

use std::io::Read;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Deserialize;

use chatterbox_rs::config::Config;
use chatterbox_rs::history::{default_history_dir, now_timestamp, save_record, HookRecord};
use chatterbox_rs::speaker::{SpeakOutcome, Speaker};

/// Wall-clock cap on `chatterbox-rs ensure`: service start timeout
/// plus headroom.
const ENSURE_TIMEOUT: Duration = Duration::from_secs(40);

/// Event JSON from Claude Code. Unknown fields are ignored; every
/// known field may be absent.
#[derive(Debug, Default, Deserialize)]
struct HookEvent {
    hook_event_name: Option<String>,
    source: Option<String>,
    message: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let t0 = Instant::now();

    let mut input = String::new();
    let _ = std::io::stdin().read_to_string(&mut input);
    let event: HookEvent = serde_json::from_str(&input).unwrap_or_default();

    // The event name comes from the payload when present, with the
    // legacy env var as fallback.
    let event_name = event
        .hook_event_name
        .clone()
        .or_else(|| std::env::var("CLAUDE_HOOK_TYPE").ok())
        .unwrap_or_else(|| "unknown".to_string());

    let project = project_name();
    let config = Config::load(None);

    // Bring the service up at session start so later events have a
    // local backend; its own timeouts bound this.
    let mut detail = None;
    if event_name.contains("SessionStart") && !ensure_service().await {
        detail = Some("ensure did not confirm readiness".to_string());
    }

    let text = compose_message(&event_name, &event, &project);

    let speaker = Speaker::new(&config);
    let outcome = speaker.speak(&text).await;

    save_record(
        &default_history_dir(),
        &HookRecord {
            timestamp: now_timestamp(),
            event: event_name,
            action: outcome.as_str().to_string(),
            detail,
            text: Some(text),
            duration_ms: u64::try_from(t0.elapsed().as_millis()).unwrap_or(u64::MAX),
            service_up: outcome == SpeakOutcome::Local,
        },
    );
}

fn project_name() -> String {
    let dir = std::env::var("CLAUDE_PROJECT_DIR")
        .map(PathBuf::from)
        .or_else(|_| std::env::current_dir())
        .unwrap_or_else(|_| PathBuf::from("."));
    dir.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "this project".to_string())
}

/// Run the supervisor's `ensure` subcommand as a subprocess so the
/// hook itself stays short-lived. Prefers the sibling binary next to
/// this executable, falling back to PATH.
async fn ensure_service() -> bool {
    let manager = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("chatterbox-rs")))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from("chatterbox-rs"));

    let mut command = tokio::process::Command::new(manager);
    command
        .arg("ensure")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    matches!(
        tokio::time::timeout(ENSURE_TIMEOUT, command.status()).await,
        Ok(Ok(status)) if status.success()
    )
}

/// Build the spoken message for an event.
fn compose_message(event_name: &str, event: &HookEvent, project: &str) -> String {
    // An explicit message wins, with the idle prompt reworded.
    if let Some(message) = &event.message {
        if message.to_lowercase().contains("waiting for your input") {
            return format!("Claude needs your help in {project}");
        }
        return message.clone();
    }

    let source = event.source.as_deref().unwrap_or("").to_lowercase();

    if event_name.contains("SessionStart") {
        if source.contains("compact") {
            return format!("Compacted the context window in {project}");
        }
        return match source.as_str() {
            "resume" => format!("Resuming work on {project}"),
            "clear" => format!("Context cleared, ready for {project}"),
            _ => format!("Ready to work on {project}"),
        };
    }
    if event_name.contains("SubagentStop") {
        return format!("A subagent finished its work in {project}, moving on now");
    }
    if event_name.contains("PreCompact") {
        return format!("About to compact the context window in {project}");
    }
    if event_name.contains("Notification") {
        return format!("Claude needs your help in {project}");
    }
    if event_name.contains("Stop") {
        return format!("Finished the task in {project}");
    }
    format!("Claude needs your input in {project}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(source: Option<&str>, message: Option<&str>) -> HookEvent {
        HookEvent {
            hook_event_name: None,
            source: source.map(String::from),
            message: message.map(String::from),
        }
    }

    #[test]
    fn explicit_message_is_spoken_verbatim() {
        let msg = compose_message("Notification", &event(None, Some("Build finished")), "proj");
        assert_eq!(msg, "Build finished");
    }

    #[test]
    fn idle_prompt_message_is_reworded() {
        let msg = compose_message(
            "Notification",
            &event(None, Some("Claude is waiting for your input")),
            "proj",
        );
        assert_eq!(msg, "Claude needs your help in proj");
    }

    #[test]
    fn session_start_varies_by_source() {
        assert_eq!(
            compose_message("SessionStart", &event(Some("startup"), None), "proj"),
            "Ready to work on proj"
        );
        assert_eq!(
            compose_message("SessionStart", &event(Some("resume"), None), "proj"),
            "Resuming work on proj"
        );
        assert_eq!(
            compose_message("SessionStart", &event(Some("clear"), None), "proj"),
            "Context cleared, ready for proj"
        );
    }

    #[test]
    fn compaction_restart_is_announced() {
        let msg = compose_message("SessionStart", &event(Some("compact"), None), "proj");
        assert_eq!(msg, "Compacted the context window in proj");
    }

    #[test]
    fn stop_and_subagent_stop_are_distinct() {
        assert_eq!(
            compose_message("Stop", &event(None, None), "proj"),
            "Finished the task in proj"
        );
        assert_eq!(
            compose_message("SubagentStop", &event(None, None), "proj"),
            "A subagent finished its work in proj, moving on now"
        );
    }

    #[test]
    fn precompact_is_announced_before_compaction() {
        assert_eq!(
            compose_message("PreCompact", &event(None, None), "proj"),
            "About to compact the context window in proj"
        );
    }

    #[test]
    fn unknown_events_get_the_generic_prompt() {
        assert_eq!(
            compose_message("SomethingNew", &event(None, None), "proj"),
            "Claude needs your input in proj"
        );
    }
}
