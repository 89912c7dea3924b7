//! Chat message log
//!
//! An ordered sequence of chat entries consumed by the embedding UI.
//! The log is append-only with one controlled exception: the single
//! most-recent Assistant entry may stay "open" while a response is still
//! streaming, and is then mutated in place by the assembler. The open
//! entry is tracked by an explicit index rather than by inspecting the
//! log tail, so a concurrent reader never has to guess.

use chrono::{DateTime, Local};

// =============================================================================
// Constants
// =============================================================================

/// Default maximum number of retained entries (0 = unlimited)
pub const DEFAULT_MAX_SCROLLBACK: usize = 1000;

/// Display text for the placeholder entry covering a run of audio chunks
pub const AUDIO_PLACEHOLDER_TEXT: &str = "Audio response";

// =============================================================================
// Chat Entry
// =============================================================================

/// Who authored a chat entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    /// The local user
    User,
    /// The remote model
    Assistant,
}

/// One entry in the chat log
#[derive(Debug, Clone)]
pub struct ChatEntry {
    /// Message text, or [`AUDIO_PLACEHOLDER_TEXT`] for audio entries
    pub text: String,
    /// Entry author
    pub sender: Sender,
    /// When the entry was created
    pub created_at: DateTime<Local>,
    /// False while the entry is still receiving streamed fragments.
    /// Once true, never reverts.
    pub is_complete: bool,
    /// True for the placeholder entry representing an audio response
    pub is_audio: bool,
}

impl ChatEntry {
    /// Create a completed User entry
    pub(crate) fn user(text: String) -> Self {
        Self {
            text,
            sender: Sender::User,
            created_at: Local::now(),
            is_complete: true,
            is_audio: false,
        }
    }

    /// Create an Assistant text entry
    pub(crate) fn assistant(text: String, is_complete: bool) -> Self {
        Self {
            text,
            sender: Sender::Assistant,
            created_at: Local::now(),
            is_complete,
            is_audio: false,
        }
    }

    /// Create the audio-response placeholder entry
    ///
    /// Audio placeholders are complete on creation; they never take part
    /// in the open-entry mechanism.
    pub(crate) fn audio_placeholder() -> Self {
        Self {
            text: AUDIO_PLACEHOLDER_TEXT.to_string(),
            sender: Sender::Assistant,
            created_at: Local::now(),
            is_complete: true,
            is_audio: true,
        }
    }
}

// =============================================================================
// Message Log
// =============================================================================

/// Ordered log of chat entries with at most one open Assistant entry
pub struct MessageLog {
    /// Entries in arrival order, oldest first
    pub(crate) entries: Vec<ChatEntry>,
    /// Index of the open (incomplete) Assistant entry, if any
    pub(crate) open_entry: Option<usize>,
    /// Maximum retained entries (0 = unlimited)
    max_scrollback: usize,
}

impl MessageLog {
    /// Create an empty log with the default scrollback limit
    pub fn new() -> Self {
        Self::with_scrollback(DEFAULT_MAX_SCROLLBACK)
    }

    /// Create an empty log with a specific scrollback limit (0 = unlimited)
    pub fn with_scrollback(max_scrollback: usize) -> Self {
        Self {
            entries: Vec::new(),
            open_entry: None,
            max_scrollback,
        }
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    /// Number of entries in the log
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent entry, if any
    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }

    /// The open (incomplete) Assistant entry, if any
    pub fn open_entry(&self) -> Option<&ChatEntry> {
        self.open_entry.and_then(|idx| self.entries.get(idx))
    }

    /// Whether a response is currently streaming into an open entry
    pub fn has_open_entry(&self) -> bool {
        self.open_entry.is_some()
    }

    /// Append a completed User entry
    pub fn push_user(&mut self, text: &str) {
        self.entries.push(ChatEntry::user(text.to_string()));
        self.truncate_scrollback();
    }

    /// Trim oldest entries past the scrollback limit
    ///
    /// The open entry is never trimmed; its index is adjusted when older
    /// entries are removed.
    pub(crate) fn truncate_scrollback(&mut self) {
        if self.max_scrollback == 0 || self.entries.len() <= self.max_scrollback {
            return;
        }

        let mut excess = self.entries.len() - self.max_scrollback;
        if let Some(open) = self.open_entry {
            excess = excess.min(open);
        }
        if excess == 0 {
            return;
        }

        self.entries.drain(0..excess);
        if let Some(open) = self.open_entry {
            self.open_entry = Some(open - excess);
        }
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_log() {
        let log = MessageLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert!(log.last().is_none());
        assert!(!log.has_open_entry());
    }

    #[test]
    fn test_push_user() {
        let mut log = MessageLog::new();
        log.push_user("hello");

        assert_eq!(log.len(), 1);
        let entry = log.last().expect("entry");
        assert_eq!(entry.text, "hello");
        assert_eq!(entry.sender, Sender::User);
        assert!(entry.is_complete);
        assert!(!entry.is_audio);
        // User entries never open
        assert!(!log.has_open_entry());
    }

    #[test]
    fn test_scrollback_trims_oldest() {
        let mut log = MessageLog::with_scrollback(3);
        for i in 0..5 {
            log.push_user(&format!("msg {}", i));
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.entries()[0].text, "msg 2");
        assert_eq!(log.entries()[2].text, "msg 4");
    }

    #[test]
    fn test_scrollback_zero_is_unlimited() {
        let mut log = MessageLog::with_scrollback(0);
        for i in 0..50 {
            log.push_user(&format!("msg {}", i));
        }
        assert_eq!(log.len(), 50);
    }

    #[test]
    fn test_scrollback_preserves_open_entry() {
        let mut log = MessageLog::with_scrollback(2);
        log.apply_fragment("streaming...");
        assert!(log.has_open_entry());

        // Pushing past the limit must not trim the open entry away
        log.push_user("one");
        log.push_user("two");
        log.push_user("three");

        let open = log.open_entry().expect("open entry survives trimming");
        assert_eq!(open.text, "streaming...");
    }

    #[test]
    fn test_scrollback_adjusts_open_index() {
        let mut log = MessageLog::with_scrollback(3);
        log.push_user("old");
        log.apply_fragment("streaming...");
        log.push_user("newer");
        // 4 entries, limit 3: "old" is trimmed, open index shifts from 1 to 0
        log.push_user("newest");

        assert_eq!(log.len(), 3);
        let open = log.open_entry().expect("open entry");
        assert_eq!(open.text, "streaming...");
        assert!(!open.is_complete);
    }
}
