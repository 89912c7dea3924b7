//! Murmur Client Library
//!
//! Client-side streaming response engine for the Murmur chat service.
//! One session owns one duplex WebSocket channel and turns the inbound
//! stream into two things an embedding UI can render: an ordered message
//! log assembled from text fragments, and gapless playback of binary
//! audio chunks through the default (or a configured) output device.
//!
//! The embedding shell is responsible for all rendering, routing and
//! styling; this crate deliberately exposes no UI surface.

pub mod audio;
pub mod chat;
pub mod config;
pub mod session;

pub use chat::log::{ChatEntry, MessageLog, Sender};
pub use config::ClientConfig;
pub use session::engine::{ChatEvent, ChatSessionHandle, ConnectionState, SessionConfig};
