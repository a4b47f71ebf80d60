//! tokgate — local gateway orchestrator and streaming chat client.
//!
//! tokgate manages the lifecycle of a locally installed `tokligence-gateway`
//! binary: it resolves the right release asset for this platform, downloads
//! and unpacks it into a managed directory, spawns and supervises the process,
//! and talks to its OpenAI-compatible chat API with incremental streaming.
//!
//! Anything that starts a process or downloads an executable goes through the
//! consent gate first, so nothing runs on this machine without an explicit
//! (and optionally persisted) user decision.
//!
//! Core modules:
//!
//! - [`gateway`] — Release resolution, installation, supervision, health
//! - [`chat`] — Streaming chat sessions against the running gateway
//! - [`consent`] — User authorization for downloads and process starts
//! - [`config`] — Layered TOML configuration
//! - [`paths`] — Platform config/data directory layout

pub mod chat;
pub mod config;
pub mod consent;
pub mod error;
pub mod gateway;
pub mod paths;

pub use chat::ChatSession;
pub use config::Config;
pub use consent::{ConsentDecision, ConsentGate, ConsentKind, ConsentPrompt};
pub use error::{GatewayError, Result};
pub use gateway::{GatewayStatus, GatewaySupervisor, HealthProbe, HealthStatus, StartOutcome};
