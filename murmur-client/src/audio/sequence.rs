//! Arrival-order resequencing for decoded audio chunks
//!
//! Chunks are tagged with a monotonic sequence number the moment they
//! arrive on the channel, but decoding runs concurrently and may finish
//! out of order. The sequencer holds completed buffers until their turn
//! and releases them strictly in arrival order, so the playback queue
//! only ever sees chunks the way the server sent them. A failed decode
//! releases its slot instead of blocking it - one bad chunk must not
//! stall the rest of the stream.

use std::collections::BTreeMap;

use super::decode::DecodedBuffer;

// =============================================================================
// Chunk Sequencer
// =============================================================================

/// Reorders decode results back into chunk-arrival order
pub struct ChunkSequencer {
    /// Finished slots waiting for their turn, keyed by arrival sequence.
    /// `None` marks a failed decode whose slot is skipped at release time.
    slots: BTreeMap<u64, Option<DecodedBuffer>>,
    /// Next sequence number to hand out at arrival
    next_seq: u64,
    /// Next sequence number eligible for release
    release_seq: u64,
}

impl ChunkSequencer {
    /// Create an empty sequencer
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            next_seq: 0,
            release_seq: 0,
        }
    }

    /// Assign the arrival sequence number for a newly received chunk
    pub fn assign(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Record a completed decode for a previously assigned sequence
    ///
    /// Returns `false` if the sequence was never assigned, already
    /// released, or already filled.
    pub fn push_decoded(&mut self, seq: u64, buffer: DecodedBuffer) -> bool {
        self.fill_slot(seq, Some(buffer))
    }

    /// Record a failed decode; the slot is skipped at release time
    pub fn push_failed(&mut self, seq: u64) -> bool {
        self.fill_slot(seq, None)
    }

    fn fill_slot(&mut self, seq: u64, slot: Option<DecodedBuffer>) -> bool {
        if seq >= self.next_seq || seq < self.release_seq || self.slots.contains_key(&seq) {
            return false;
        }
        self.slots.insert(seq, slot);
        true
    }

    /// Pop every buffer that is ready to play, in arrival order
    ///
    /// Releases the contiguous run of finished slots starting at the
    /// release cursor. Failed slots advance the cursor without producing
    /// a buffer.
    pub fn pop_ready(&mut self) -> Vec<DecodedBuffer> {
        let mut ready = Vec::new();
        while let Some(slot) = self.slots.remove(&self.release_seq) {
            if let Some(buffer) = slot {
                ready.push(buffer);
            }
            self.release_seq += 1;
        }
        ready
    }

    /// Number of chunks assigned but not yet released
    pub fn pending(&self) -> u64 {
        self.next_seq - self.release_seq
    }
}

impl Default for ChunkSequencer {
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

    fn buf(marker: f32) -> DecodedBuffer {
        DecodedBuffer {
            samples: vec![marker; 4],
        }
    }

    fn markers(buffers: &[DecodedBuffer]) -> Vec<f32> {
        buffers.iter().map(|b| b.samples[0]).collect()
    }

    #[test]
    fn test_assign_is_monotonic() {
        let mut seq = ChunkSequencer::new();
        assert_eq!(seq.assign(), 0);
        assert_eq!(seq.assign(), 1);
        assert_eq!(seq.assign(), 2);
    }

    #[test]
    fn test_in_order_completion_releases_immediately() {
        let mut seq = ChunkSequencer::new();
        let a = seq.assign();
        let b = seq.assign();

        assert!(seq.push_decoded(a, buf(0.1)));
        assert_eq!(markers(&seq.pop_ready()), vec![0.1]);

        assert!(seq.push_decoded(b, buf(0.2)));
        assert_eq!(markers(&seq.pop_ready()), vec![0.2]);
        assert_eq!(seq.pending(), 0);
    }

    #[test]
    fn test_out_of_order_completion_releases_in_arrival_order() {
        let mut seq = ChunkSequencer::new();
        let a = seq.assign();
        let b = seq.assign();
        let c = seq.assign();

        // Decode finishes in reverse order
        seq.push_decoded(c, buf(0.3));
        assert!(seq.pop_ready().is_empty());
        seq.push_decoded(b, buf(0.2));
        assert!(seq.pop_ready().is_empty());
        seq.push_decoded(a, buf(0.1));

        assert_eq!(markers(&seq.pop_ready()), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_failed_decode_does_not_stall() {
        // Scenario: chunk 2 of 3 fails, 1 and 3 still play in order
        let mut seq = ChunkSequencer::new();
        let a = seq.assign();
        let b = seq.assign();
        let c = seq.assign();

        seq.push_decoded(a, buf(0.1));
        seq.push_decoded(c, buf(0.3));
        assert_eq!(markers(&seq.pop_ready()), vec![0.1]);

        seq.push_failed(b);
        assert_eq!(markers(&seq.pop_ready()), vec![0.3]);
        assert_eq!(seq.pending(), 0);
    }

    #[test]
    fn test_partial_run_released_early() {
        let mut seq = ChunkSequencer::new();
        let a = seq.assign();
        let b = seq.assign();
        let c = seq.assign();

        seq.push_decoded(b, buf(0.2));
        seq.push_decoded(a, buf(0.1));
        // c still decoding: release only the contiguous prefix
        assert_eq!(markers(&seq.pop_ready()), vec![0.1, 0.2]);
        assert_eq!(seq.pending(), 1);

        seq.push_decoded(c, buf(0.3));
        assert_eq!(markers(&seq.pop_ready()), vec![0.3]);
    }

    #[test]
    fn test_unassigned_sequence_rejected() {
        let mut seq = ChunkSequencer::new();
        assert!(!seq.push_decoded(5, buf(0.5)));
        assert!(!seq.push_failed(5));
    }

    #[test]
    fn test_duplicate_completion_rejected() {
        let mut seq = ChunkSequencer::new();
        let a = seq.assign();
        assert!(seq.push_decoded(a, buf(0.1)));
        assert!(!seq.push_decoded(a, buf(0.9)));
        assert_eq!(markers(&seq.pop_ready()), vec![0.1]);
    }

    #[test]
    fn test_released_sequence_rejected() {
        let mut seq = ChunkSequencer::new();
        let a = seq.assign();
        seq.push_decoded(a, buf(0.1));
        seq.pop_ready();
        assert!(!seq.push_decoded(a, buf(0.9)));
    }
}
