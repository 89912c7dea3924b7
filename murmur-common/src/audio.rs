//! Fixed audio chunk format for audio-mode responses
//!
//! Each inbound binary frame carries one complete WAV file: mono, 16-bit
//! signed PCM at 24 kHz. The format is fixed by the service; there is no
//! negotiation. Chunks vary in length and are meant to be played
//! back-to-back with no gap.

// =============================================================================
// Constants
// =============================================================================

/// Sample rate of audio chunks in Hz
pub const AUDIO_SAMPLE_RATE: u32 = 24_000;

/// Number of audio channels (mono)
pub const AUDIO_CHANNELS: u16 = 1;

/// Bits per PCM sample
pub const AUDIO_BITS_PER_SAMPLE: u16 = 16;

/// Maximum accepted chunk size in bytes (4 MB)
///
/// At 24 kHz mono s16 this is roughly 87 seconds of audio, far above any
/// chunk the service produces. Larger frames are treated as malformed.
pub const MAX_AUDIO_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Bytes of PCM payload per second of audio
pub const AUDIO_BYTES_PER_SECOND: u32 =
    AUDIO_SAMPLE_RATE * AUDIO_CHANNELS as u32 * (AUDIO_BITS_PER_SAMPLE as u32 / 8);

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        // 24kHz mono s16 = 48000 bytes of PCM per second
        assert_eq!(AUDIO_BYTES_PER_SECOND, 48_000);
        assert_eq!(AUDIO_CHANNELS, 1);
        assert_eq!(AUDIO_BITS_PER_SAMPLE, 16);
    }

    #[test]
    fn test_chunk_limit_headroom() {
        // The size guard must comfortably exceed one second of audio
        assert!(MAX_AUDIO_CHUNK_SIZE > AUDIO_BYTES_PER_SECOND as usize);
    }
}
