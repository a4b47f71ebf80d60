//! Incremental chat client for the gateway's OpenAI-compatible API.
//!
//! - [`session`] — Conversation state and the send/cancel lifecycle
//! - [`sse`] — Line-level server-sent-events parsing
//! - [`wire`] — Request and response body shapes

pub mod session;
pub mod sse;
pub mod wire;

pub use session::ChatSession;
pub use sse::{DONE_SENTINEL, SseParser};
pub use wire::ChatMessage;
