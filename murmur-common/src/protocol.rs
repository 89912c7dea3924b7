//! Chat protocol constants and response modes
//!
//! The service exposes one WebSocket endpoint per response mode. Outbound
//! frames are plain user text; inbound frames are either UTF-8 response
//! fragments (text mode) or binary audio chunks (audio mode). A streamed
//! text response is terminated by an in-band marker embedded in the
//! response text itself.

use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// End-of-stream marker for text-mode responses
///
/// The server embeds this string in the final fragment of a streamed
/// response. Detection runs over the *accumulated* message text, so a
/// marker split across two fragments is still found.
///
/// The wire contract provides no escaping: a response that legitimately
/// contained this string would be sealed early. Known protocol weakness,
/// kept as-is rather than papered over on the client.
pub const END_OF_RESPONSE_MARKER: &str = "END_OF_RESPONSE";

/// Endpoint path for streamed text responses
pub const TEXT_CHAT_PATH: &str = "/ws";

/// Endpoint path for streamed audio responses
pub const AUDIO_CHAT_PATH: &str = "/audio_chat";

/// Default service address
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";

/// Default service port
pub const DEFAULT_SERVER_PORT: u16 = 5001;

// =============================================================================
// Chat Mode
// =============================================================================

/// Response mode of a chat session
///
/// A session connects to exactly one endpoint; the mode decides which one
/// and what kind of inbound frames to expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Incremental text fragments terminated by [`END_OF_RESPONSE_MARKER`]
    #[default]
    Text,
    /// Sequential binary audio chunks for gapless playback
    Audio,
}

impl ChatMode {
    /// Endpoint path for this mode
    pub fn path(self) -> &'static str {
        match self {
            ChatMode::Text => TEXT_CHAT_PATH,
            ChatMode::Audio => AUDIO_CHAT_PATH,
        }
    }
}

// =============================================================================
// Completion Test
// =============================================================================

/// Check whether accumulated response text contains the end-of-stream marker
///
/// Must be called with the full text assembled so far, not just the latest
/// fragment, since the marker can straddle a fragment boundary.
pub fn response_complete(text: &str) -> bool {
    text.contains(END_OF_RESPONSE_MARKER)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_paths() {
        assert_eq!(ChatMode::Text.path(), "/ws");
        assert_eq!(ChatMode::Audio.path(), "/audio_chat");
    }

    #[test]
    fn test_default_mode_is_text() {
        assert_eq!(ChatMode::default(), ChatMode::Text);
    }

    #[test]
    fn test_mode_serde_roundtrip() {
        let json = serde_json::to_string(&ChatMode::Audio).expect("serialize");
        assert_eq!(json, "\"audio\"");
        let mode: ChatMode = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(mode, ChatMode::Audio);
    }

    #[test]
    fn test_response_complete() {
        assert!(!response_complete(""));
        assert!(!response_complete("Hello world"));
        assert!(response_complete("END_OF_RESPONSE"));
        assert!(response_complete("Hello world END_OF_RESPONSE"));
        // Marker buried in the middle still counts
        assert!(response_complete("before END_OF_RESPONSE after"));
    }

    #[test]
    fn test_response_complete_partial_marker() {
        // A prefix of the marker alone is not completion
        assert!(!response_complete("Hello END_OF_RESP"));
        // ...but once the rest accumulates, the full text matches
        let mut text = String::from("Hello END_OF_RESP");
        text.push_str("ONSE");
        assert!(response_complete(&text));
    }
}
