//! Gapless audio playback queue
//!
//! Decoded buffers play strictly in arrival order with no gap and no
//! overlap: the device callback consumes the head buffer and, when it
//! runs dry mid-callback, keeps filling from the next buffer in the same
//! pass. Exactly one buffer is sounding at any time; the queue is never
//! reordered. A shared flag exposes whether anything is currently
//! sounding so the UI can poll it without touching the queue.
//!
//! The scheduling core ([`PlaybackQueue`]) is plain state behind a mutex;
//! [`AudioPlayer`] is the cpal adapter that drains it from the output
//! stream callback.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, Stream, StreamConfig};

use murmur_common::audio::AUDIO_SAMPLE_RATE;

use super::decode::DecodedBuffer;

// =============================================================================
// Constants
// =============================================================================

/// System default device display name
pub const SYSTEM_DEFAULT_DEVICE_NAME: &str = "System Default";

// =============================================================================
// Playback Queue
// =============================================================================

/// Queue state shared with the audio callback
struct QueueState {
    /// Buffers awaiting playback, head first
    buffers: VecDeque<DecodedBuffer>,
    /// Read position within the head buffer
    head_pos: usize,
    /// Whether a sink is attached; when detached, buffers are discarded
    /// instead of queued so the stream never stalls on a dead device
    attached: bool,
}

/// Strict-FIFO playback queue shared between producer and device callback
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct PlaybackQueue {
    state: Arc<Mutex<QueueState>>,
    /// True while a buffer is sounding (or queued to sound)
    playing: Arc<AtomicBool>,
}

impl PlaybackQueue {
    /// Create an empty, attached queue
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                buffers: VecDeque::new(),
                head_pos: 0,
                attached: true,
            })),
            playing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Append a buffer to the tail
    ///
    /// Enqueueing into an idle queue starts playback (the flag flips
    /// immediately; audio starts at the next device callback). Empty
    /// buffers complete immediately and are not queued. On a detached
    /// queue the buffer is discarded.
    pub fn enqueue(&self, buffer: DecodedBuffer) {
        if buffer.is_empty() {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            if !state.attached {
                return;
            }
            state.buffers.push_back(buffer);
            self.playing.store(true, Ordering::SeqCst);
        }
    }

    /// Whether a buffer is currently sounding
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Shared handle to the playing flag for UI polling
    pub fn playing_flag(&self) -> Arc<AtomicBool> {
        self.playing.clone()
    }

    /// Number of buffers awaiting or in playback
    pub fn queued(&self) -> usize {
        self.state.lock().map(|s| s.buffers.len()).unwrap_or(0)
    }

    /// Drop all queued audio
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.buffers.clear();
            state.head_pos = 0;
        }
        self.playing.store(false, Ordering::SeqCst);
    }

    /// Detach the sink: discard queued and future buffers
    ///
    /// Used when no output device is available or the device failed.
    /// The queue keeps advancing (by discarding) rather than stalling.
    pub fn detach(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.attached = false;
            state.buffers.clear();
            state.head_pos = 0;
        }
        self.playing.store(false, Ordering::SeqCst);
    }

    /// Fill an output slice with queued mono samples
    ///
    /// Called from the device callback. Consumes the head buffer and, on
    /// exhaustion, continues from the next buffer within the same call -
    /// this is what makes playback gapless. Whatever the queue cannot
    /// cover is filled with silence. Returns the number of buffers that
    /// finished during this call.
    pub fn fill(&self, out: &mut [f32]) -> usize {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => {
                out.fill(0.0);
                return 0;
            }
        };

        let mut written = 0;
        let mut completed = 0;

        while written < out.len() {
            let (taken, head_done) = {
                let Some(head) = state.buffers.front() else {
                    break;
                };
                let remaining = head.samples.len() - state.head_pos;
                let taken = remaining.min(out.len() - written);
                out[written..written + taken]
                    .copy_from_slice(&head.samples[state.head_pos..state.head_pos + taken]);
                (taken, taken == remaining)
            };

            written += taken;
            if head_done {
                state.buffers.pop_front();
                state.head_pos = 0;
                completed += 1;
            } else {
                state.head_pos += taken;
            }
        }

        out[written..].fill(0.0);

        if state.buffers.is_empty() {
            self.playing.store(false, Ordering::SeqCst);
        }

        completed
    }
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Device Enumeration
// =============================================================================

/// List available audio output device names
///
/// The system default entry is always first.
pub fn list_output_devices() -> Vec<String> {
    let mut devices = vec![SYSTEM_DEFAULT_DEVICE_NAME.to_string()];

    if let Ok(outputs) = cpal::default_host().output_devices() {
        for device in outputs {
            if let Ok(desc) = device.description() {
                let name = desc.name().to_string();
                if !devices.iter().any(|d| d == &name) {
                    devices.push(name);
                }
            }
        }
    }

    devices
}

/// Find an output device by name, or return the default
fn find_output_device(name: &str) -> Option<Device> {
    let host = cpal::default_host();

    if name.is_empty() || name == SYSTEM_DEFAULT_DEVICE_NAME {
        return host.default_output_device();
    }

    host.output_devices()
        .ok()?
        .find(|d| d.description().is_ok_and(|desc| desc.name() == name))
        .or_else(|| host.default_output_device())
}

// =============================================================================
// Audio Player
// =============================================================================

/// Output stream adapter that drains a [`PlaybackQueue`]
///
/// The stream runs for the lifetime of the player, pulling samples from
/// the queue and emitting silence while the queue is idle. Stream errors
/// are reported through a channel and polled by the session engine.
pub struct AudioPlayer {
    /// The cpal output stream
    _stream: Stream,
    /// Receiver for audio stream errors
    error_rx: std_mpsc::Receiver<String>,
}

impl AudioPlayer {
    /// Open the output device and start draining the queue
    ///
    /// Tries a mono config at the wire sample rate first, then stereo
    /// (mono samples are upmixed by duplication).
    ///
    /// # Arguments
    /// * `device_name` - Device name, or empty string for system default
    /// * `queue` - The queue this player drains
    ///
    /// # Returns
    /// * `Ok(AudioPlayer)` - Stream running
    /// * `Err(String)` - Device not found, unsupported, or failed to start
    pub fn new(device_name: &str, queue: PlaybackQueue) -> Result<Self, String> {
        let device =
            find_output_device(device_name).ok_or_else(|| "Output device not found".to_string())?;

        let (error_tx, error_rx) = std_mpsc::channel();
        let supported_formats = [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16];

        let mono_config = device
            .supported_output_configs()
            .map_err(|e| format!("Failed to get supported configs: {}", e))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= AUDIO_SAMPLE_RATE
                    && c.max_sample_rate() >= AUDIO_SAMPLE_RATE
                    && supported_formats.contains(&c.sample_format())
            });

        let (channels, sample_format) = if let Some(cfg) = mono_config {
            (1u16, cfg.sample_format())
        } else {
            let stereo_config = device
                .supported_output_configs()
                .map_err(|e| format!("Failed to get supported configs: {}", e))?
                .find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= AUDIO_SAMPLE_RATE
                        && c.max_sample_rate() >= AUDIO_SAMPLE_RATE
                        && supported_formats.contains(&c.sample_format())
                });

            if let Some(cfg) = stereo_config {
                (2u16, cfg.sample_format())
            } else {
                let supported_rates: Vec<String> = device
                    .supported_output_configs()
                    .map(|configs| {
                        configs
                            .map(|c| {
                                if c.min_sample_rate() == c.max_sample_rate() {
                                    format!("{}Hz", c.min_sample_rate())
                                } else {
                                    format!("{}-{}Hz", c.min_sample_rate(), c.max_sample_rate())
                                }
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let rates_str = if supported_rates.is_empty() {
                    "unknown".to_string()
                } else {
                    supported_rates.join(", ")
                };
                return Err(format!(
                    "Output device doesn't support {}Hz playback. Device supports: {}",
                    AUDIO_SAMPLE_RATE, rates_str
                ));
            }
        };

        let config = StreamConfig {
            channels,
            sample_rate: AUDIO_SAMPLE_RATE,
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match (channels, sample_format) {
            (1, SampleFormat::F32) => {
                build_player_stream_mono::<f32>(&device, &config, queue, error_tx)
            }
            (1, SampleFormat::I16) => {
                build_player_stream_mono::<i16>(&device, &config, queue, error_tx)
            }
            (1, SampleFormat::U16) => {
                build_player_stream_mono::<u16>(&device, &config, queue, error_tx)
            }
            (2, SampleFormat::F32) => {
                build_player_stream_stereo::<f32>(&device, &config, queue, error_tx)
            }
            (2, SampleFormat::I16) => {
                build_player_stream_stereo::<i16>(&device, &config, queue, error_tx)
            }
            (2, SampleFormat::U16) => {
                build_player_stream_stereo::<u16>(&device, &config, queue, error_tx)
            }
            _ => Err("Unsupported audio format".to_string()),
        }?;

        stream
            .play()
            .map_err(|e| format!("Failed to start playback: {}", e))?;

        Ok(Self {
            _stream: stream,
            error_rx,
        })
    }

    /// Check for audio stream errors (non-blocking)
    ///
    /// Returns the first error if one has occurred. The engine detaches
    /// the queue on error rather than stalling on a dead device.
    pub fn check_error(&self) -> Option<String> {
        self.error_rx.try_recv().ok()
    }
}

/// Build a mono output stream draining the queue
fn build_player_stream_mono<T>(
    device: &Device,
    config: &StreamConfig,
    queue: PlaybackQueue,
    error_tx: std_mpsc::Sender<String>,
) -> Result<Stream, String>
where
    T: Sample + cpal::SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                queue.fill(&mut scratch);
                for (dst, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *dst = T::from_sample(sample);
                }
            },
            {
                let error_tx = error_tx.clone();
                move |err| {
                    let _ = error_tx.send(format!("Playback error: {}", err));
                }
            },
            None,
        )
        .map_err(|e| format!("Failed to build output stream: {}", e))
}

/// Build a stereo output stream (upmixes mono by duplication)
fn build_player_stream_stereo<T>(
    device: &Device,
    config: &StreamConfig,
    queue: PlaybackQueue,
    error_tx: std_mpsc::Sender<String>,
) -> Result<Stream, String>
where
    T: Sample + cpal::SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / 2;
                scratch.resize(frames, 0.0);
                queue.fill(&mut scratch);
                for (frame, &sample) in data.chunks_exact_mut(2).zip(scratch.iter()) {
                    let value = T::from_sample(sample);
                    frame[0] = value;
                    frame[1] = value;
                }
            },
            {
                let error_tx = error_tx.clone();
                move |err| {
                    let _ = error_tx.send(format!("Playback error: {}", err));
                }
            },
            None,
        )
        .map_err(|e| format!("Failed to build stereo output stream: {}", e))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(marker: f32, len: usize) -> DecodedBuffer {
        DecodedBuffer {
            samples: vec![marker; len],
        }
    }

    #[test]
    fn test_enqueue_into_idle_queue_starts_playback() {
        let queue = PlaybackQueue::new();
        assert!(!queue.is_playing());

        queue.enqueue(buf(0.1, 8));
        assert!(queue.is_playing());
        assert_eq!(queue.queued(), 1);
    }

    #[test]
    fn test_fill_is_gapless_across_buffer_boundary() {
        let queue = PlaybackQueue::new();
        queue.enqueue(buf(0.1, 4));
        queue.enqueue(buf(0.2, 4));

        // One callback spanning the boundary: no silence in between
        let mut out = [9.9f32; 6];
        let completed = queue.fill(&mut out);

        assert_eq!(completed, 1);
        assert_eq!(&out[..4], &[0.1; 4]);
        assert_eq!(&out[4..], &[0.2; 2]);
        assert!(queue.is_playing());
    }

    #[test]
    fn test_fill_drains_queue_and_goes_idle() {
        let queue = PlaybackQueue::new();
        queue.enqueue(buf(0.1, 3));

        let mut out = [9.9f32; 8];
        let completed = queue.fill(&mut out);

        assert_eq!(completed, 1);
        assert_eq!(&out[..3], &[0.1; 3]);
        // Tail is silence, not stale data
        assert_eq!(&out[3..], &[0.0; 5]);
        assert!(!queue.is_playing());
        assert_eq!(queue.queued(), 0);
    }

    #[test]
    fn test_fill_consumes_strictly_in_order() {
        let queue = PlaybackQueue::new();
        for (i, marker) in [0.1, 0.2, 0.3].iter().enumerate() {
            queue.enqueue(buf(*marker, 2 + i));
        }

        let mut all = Vec::new();
        loop {
            let mut out = [0.0f32; 4];
            queue.fill(&mut out);
            if !queue.is_playing() {
                all.extend_from_slice(&out);
                break;
            }
            all.extend_from_slice(&out);
        }

        // 0.1 0.1 | 0.2 0.2 0.2 | 0.3 0.3 0.3 0.3, then silence
        let expected = [0.1, 0.1, 0.2, 0.2, 0.2, 0.3, 0.3, 0.3, 0.3];
        assert_eq!(&all[..expected.len()], &expected);
        assert!(all[expected.len()..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_fill_on_idle_queue_outputs_silence() {
        let queue = PlaybackQueue::new();
        let mut out = [9.9f32; 4];
        assert_eq!(queue.fill(&mut out), 0);
        assert_eq!(out, [0.0; 4]);
        assert!(!queue.is_playing());
    }

    #[test]
    fn test_multiple_small_buffers_complete_in_one_fill() {
        let queue = PlaybackQueue::new();
        queue.enqueue(buf(0.1, 1));
        queue.enqueue(buf(0.2, 1));
        queue.enqueue(buf(0.3, 1));

        let mut out = [0.0f32; 8];
        let completed = queue.fill(&mut out);

        assert_eq!(completed, 3);
        assert_eq!(&out[..3], &[0.1, 0.2, 0.3]);
        assert!(!queue.is_playing());
    }

    #[test]
    fn test_empty_buffer_completes_immediately() {
        let queue = PlaybackQueue::new();
        queue.enqueue(buf(0.0, 0));
        // Nothing to play: the queue stays idle
        assert!(!queue.is_playing());
        assert_eq!(queue.queued(), 0);
    }

    #[test]
    fn test_liveness_playing_implies_queue_serviceable() {
        // If the flag says idle, the queue must actually be empty
        let queue = PlaybackQueue::new();
        queue.enqueue(buf(0.1, 4));
        queue.enqueue(buf(0.2, 4));

        let mut out = [0.0f32; 16];
        queue.fill(&mut out);

        assert_eq!(queue.is_playing(), queue.queued() > 0);
    }

    #[test]
    fn test_detached_queue_discards_buffers() {
        let queue = PlaybackQueue::new();
        queue.enqueue(buf(0.1, 4));
        queue.detach();

        assert_eq!(queue.queued(), 0);
        assert!(!queue.is_playing());

        queue.enqueue(buf(0.2, 4));
        assert_eq!(queue.queued(), 0);
        assert!(!queue.is_playing());
    }

    #[test]
    fn test_clear_stops_playback() {
        let queue = PlaybackQueue::new();
        queue.enqueue(buf(0.1, 4));
        queue.clear();

        assert_eq!(queue.queued(), 0);
        assert!(!queue.is_playing());

        // Cleared but still attached: new buffers play again
        queue.enqueue(buf(0.2, 4));
        assert!(queue.is_playing());
    }

    #[test]
    fn test_partial_head_consumption_resumes() {
        let queue = PlaybackQueue::new();
        queue.enqueue(buf(0.5, 6));

        let mut out = [0.0f32; 4];
        assert_eq!(queue.fill(&mut out), 0);
        assert_eq!(out, [0.5; 4]);
        assert!(queue.is_playing());

        let mut out = [0.0f32; 4];
        assert_eq!(queue.fill(&mut out), 1);
        assert_eq!(&out[..2], &[0.5; 2]);
        assert_eq!(&out[2..], &[0.0; 2]);
        assert!(!queue.is_playing());
    }

    #[test]
    fn test_list_output_devices_includes_default() {
        let devices = list_output_devices();
        assert!(!devices.is_empty());
        assert_eq!(devices[0], SYSTEM_DEFAULT_DEVICE_NAME);
    }
}
