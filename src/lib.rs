//! chatterbox-rs: lifecycle supervisor and Claude Code hooks for a
//! local ChatterBox TTS service.
//!
//! The supervisor owns one background service process: it derives the
//! current state from a persisted PID record plus the service's health
//! endpoint, starts the process detached, stops it gracefully-then-
//! forcefully, and reports status. The hook binary forwards short
//! spoken messages to the service, falling back to ElevenLabs.

pub mod config;
pub mod health;
pub mod history;
pub mod pidfile;
pub mod process;
pub mod speaker;
pub mod supervisor;
