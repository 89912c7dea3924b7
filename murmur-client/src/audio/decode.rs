//! Audio chunk decoding
//!
//! Turns one inbound binary chunk (a complete WAV file in the fixed wire
//! format) into a playable sample buffer. A chunk that fails to decode is
//! simply dropped by the caller; decode errors never take the session
//! down and never stall later chunks.

use std::io::Cursor;

use hound::{SampleFormat, WavReader};

use murmur_common::audio::{
    AUDIO_BITS_PER_SAMPLE, AUDIO_CHANNELS, AUDIO_SAMPLE_RATE, MAX_AUDIO_CHUNK_SIZE,
};

// =============================================================================
// Decoded Buffer
// =============================================================================

/// A decoded, ready-to-play audio buffer
///
/// Mono f32 samples at the wire sample rate. Ownership moves from the
/// decoder through the resequencer into the playback queue, which frees
/// the buffer once it has been fully consumed by the device callback.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    /// Samples normalized to -1.0..1.0
    pub samples: Vec<f32>,
}

impl DecodedBuffer {
    /// Number of samples in the buffer
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one audio chunk into a playable buffer
///
/// The chunk must be a complete WAV file matching the fixed wire format
/// (mono, 16-bit PCM, 24 kHz). Anything else - malformed header, wrong
/// format, truncated sample data, oversized frame - is an error and the
/// chunk is dropped.
///
/// # Returns
/// * `Ok(DecodedBuffer)` - Samples ready for the playback queue
/// * `Err(String)` - Why the chunk was rejected
pub fn decode_chunk(bytes: &[u8]) -> Result<DecodedBuffer, String> {
    if bytes.len() > MAX_AUDIO_CHUNK_SIZE {
        return Err(format!(
            "Chunk too large: {} bytes (max {})",
            bytes.len(),
            MAX_AUDIO_CHUNK_SIZE
        ));
    }

    let reader =
        WavReader::new(Cursor::new(bytes)).map_err(|e| format!("Invalid WAV chunk: {}", e))?;

    let spec = reader.spec();
    if spec.channels != AUDIO_CHANNELS
        || spec.sample_rate != AUDIO_SAMPLE_RATE
        || spec.bits_per_sample != AUDIO_BITS_PER_SAMPLE
        || spec.sample_format != SampleFormat::Int
    {
        return Err(format!(
            "Unexpected chunk format: {} ch, {} Hz, {} bit",
            spec.channels, spec.sample_rate, spec.bits_per_sample
        ));
    }

    // Truncated sample data surfaces as a read error mid-iteration
    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<i16>, _>>()
        .map_err(|e| format!("Truncated WAV chunk: {}", e))?;

    Ok(DecodedBuffer {
        samples: samples.iter().map(|&s| f32::from(s) / 32768.0).collect(),
    })
}

// =============================================================================
// Tests
// =============================================================================
