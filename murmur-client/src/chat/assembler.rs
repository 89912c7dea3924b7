//! Streamed response assembly
//!
//! Decides, for each inbound unit, whether it continues the in-progress
//! response or starts a new one. Text fragments append to the single open
//! Assistant entry and the accumulated text is re-tested for the
//! end-of-stream marker; consecutive audio chunks collapse into a single
//! placeholder entry instead of one entry per chunk.

use murmur_common::protocol::response_complete;

use super::log::{ChatEntry, MessageLog, Sender};

impl MessageLog {
    /// Apply one inbound text fragment
    ///
    /// If an Assistant entry is open, the fragment is appended to it and
    /// the *cumulative* text is re-tested for the end-of-stream marker.
    /// Otherwise a new Assistant entry opens, seeded with the fragment.
    ///
    /// Completion is a one-way latch: once the marker has been observed
    /// the entry is sealed and any later fragment starts a successor
    /// entry, even if the stream misbehaves and keeps sending.
    pub fn apply_fragment(&mut self, fragment: &str) {
        if let Some(idx) = self.open_entry {
            let entry = &mut self.entries[idx];
            entry.text.push_str(fragment);
            if response_complete(&entry.text) {
                entry.is_complete = true;
                self.open_entry = None;
            }
        } else {
            let is_complete = response_complete(fragment);
            self.entries
                .push(ChatEntry::assistant(fragment.to_string(), is_complete));
            if !is_complete {
                self.open_entry = Some(self.entries.len() - 1);
            }
            self.truncate_scrollback();
        }
    }

    /// Note the arrival of one inbound audio chunk
    ///
    /// Appends an audio placeholder entry unless the latest entry already
    /// is one, so a run of chunks shows as a single "Audio response".
    /// Returns whether an entry was appended.
    pub fn apply_audio_chunk(&mut self) -> bool {
        if let Some(last) = self.entries.last()
            && last.sender == Sender::Assistant
            && last.is_audio
        {
            return false;
        }

        self.entries.push(ChatEntry::audio_placeholder());
        self.truncate_scrollback();
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
