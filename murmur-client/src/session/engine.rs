//! Chat session engine
//!
//! Orchestrates the transport channel, the stream assembler, the chunk
//! decoder and the playback queue on one event loop. Everything that
//! mutates the message log or the playback queue runs on this loop, so
//! the single-writer invariants hold without further locking discipline.
//!
//! The loop runs on a dedicated thread with its own current-thread tokio
//! runtime because cpal's output stream is not `Send` and cannot cross
//! async task boundaries.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use murmur_common::protocol::ChatMode;

use crate::audio::decode::decode_chunk;
use crate::audio::playback::{AudioPlayer, PlaybackQueue};
use crate::audio::sequence::ChunkSequencer;
use crate::chat::log::MessageLog;
use crate::config::ClientConfig;

use super::transport::{Transport, TransportEvent};

// =============================================================================
// Constants
// =============================================================================

/// Interval for polling player errors and playback-state edges
const POLL_INTERVAL_MS: u64 = 50;

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of a chat session
///
/// Transitions: Disconnected -> Connecting -> Connected, and
/// Connected -> Disconnected on error or server close. There is no
/// transition back to Connecting; a session never reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionState {
    /// No channel, or the channel has been lost
    #[default]
    Disconnected = 0,
    /// Connect attempt in flight
    Connecting = 1,
    /// Channel established
    Connected = 2,
}

impl ConnectionState {
    /// Convert from the shared atomic representation
    fn from_byte(byte: u8) -> Self {
        match byte {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Convert to the shared atomic representation
    fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Shared, lock-free view of the connection state
///
/// Written only by the engine; read by the embedding UI.
#[derive(Clone)]
pub(crate) struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(
            ConnectionState::Disconnected.to_byte(),
        )))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state.to_byte(), Ordering::SeqCst);
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_byte(self.0.load(Ordering::SeqCst))
    }
}

// =============================================================================
// Events and Commands
// =============================================================================

/// Events emitted by a chat session
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Channel established
    Connected,
    /// Channel never reached Connected
    ConnectionFailed(String),
    /// Channel dropped after being established; reason if abnormal
    Disconnected(Option<String>),
    /// The message log changed (append or in-place update)
    LogChanged,
    /// Waiting state between a sent message and the first response unit
    AwaitingResponse(bool),
    /// Playback started or stopped sounding
    PlaybackChanged(bool),
}

/// Commands to control a session
#[derive(Debug)]
enum Command {
    /// Send one user message
    SendText(String),
    /// Tear the session down
    Close,
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Configuration for starting a chat session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Full WebSocket URL of the endpoint to connect to
    pub url: String,
    /// Output device name (empty for system default)
    pub output_device: String,
}

impl SessionConfig {
    /// Build a session config from client settings, using their mode
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::from_config_with_mode(config, config.mode)
    }

    /// Build a session config from client settings for a specific mode
    pub fn from_config_with_mode(config: &ClientConfig, mode: ChatMode) -> Self {
        Self {
            url: config.url(mode),
            output_device: config.output_device.clone(),
        }
    }
}

// =============================================================================
// Session Runner
// =============================================================================

/// Run a chat session to completion
///
/// Routes transport events into the message log and the audio pipeline,
/// applies the send gate, and keeps the playback queue advancing. The
/// loop survives connection loss (queued audio finishes draining, the
/// state just reads Disconnected); only a Close command, or the handle
/// going away, ends it.
async fn run_session(
    config: SessionConfig,
    log: Arc<Mutex<MessageLog>>,
    queue: PlaybackQueue,
    state: SharedState,
    event_tx: mpsc::UnboundedSender<ChatEvent>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
) {
    state.set(ConnectionState::Connecting);
    let (mut transport, mut transport_rx) = Transport::connect(config.url.clone());

    // A missing or broken output device must not take the session down:
    // the queue is detached and audio is discarded instead of stalling.
    let mut player = match AudioPlayer::new(&config.output_device, queue.clone()) {
        Ok(player) => Some(player),
        Err(e) => {
            warn!("audio output unavailable, discarding audio: {}", e);
            queue.detach();
            None
        }
    };

    let (decoded_tx, mut decoded_rx) = mpsc::unbounded_channel();
    let mut sequencer = ChunkSequencer::new();
    let mut awaiting_response = false;
    let mut was_playing = false;
    // Cleared once the transport tasks are gone; the loop itself stays up
    // so already-queued audio keeps draining until Close
    let mut transport_open = true;

    let mut poll_interval = tokio::time::interval(Duration::from_millis(POLL_INTERVAL_MS));

    loop {
        tokio::select! {
            // Poll player errors and playback-state edges
            _ = poll_interval.tick() => {
                if let Some(p) = &player
                    && let Some(err) = p.check_error()
                {
                    warn!("playback device error, discarding audio: {}", err);
                    queue.detach();
                    player = None;
                }

                let playing = queue.is_playing();
                if playing != was_playing {
                    was_playing = playing;
                    let _ = event_tx.send(ChatEvent::PlaybackChanged(playing));
                }
            }

            // Inbound transport events
            event = transport_rx.recv(), if transport_open => match event {
                Some(TransportEvent::Opened) => {
                    state.set(ConnectionState::Connected);
                    let _ = event_tx.send(ChatEvent::Connected);
                }
                Some(TransportEvent::Text(fragment)) => {
                    if awaiting_response {
                        awaiting_response = false;
                        let _ = event_tx.send(ChatEvent::AwaitingResponse(false));
                    }
                    if let Ok(mut log) = log.lock() {
                        log.apply_fragment(&fragment);
                    }
                    let _ = event_tx.send(ChatEvent::LogChanged);
                }
                Some(TransportEvent::Binary(chunk)) => {
                    if awaiting_response {
                        awaiting_response = false;
                        let _ = event_tx.send(ChatEvent::AwaitingResponse(false));
                    }

                    // A run of chunks collapses into one log entry
                    let appended = log
                        .lock()
                        .map(|mut log| log.apply_audio_chunk())
                        .unwrap_or(false);
                    if appended {
                        let _ = event_tx.send(ChatEvent::LogChanged);
                    }

                    // Decode concurrently; the sequencer restores arrival order
                    let seq = sequencer.assign();
                    let tx = decoded_tx.clone();
                    tokio::task::spawn_blocking(move || {
                        let _ = tx.send((seq, decode_chunk(&chunk)));
                    });
                }
                Some(TransportEvent::Closed(reason)) => {
                    let was_connected = state.get() == ConnectionState::Connected;
                    state.set(ConnectionState::Disconnected);
                    if was_connected {
                        let _ = event_tx.send(ChatEvent::Disconnected(reason));
                    } else {
                        let _ = event_tx.send(ChatEvent::ConnectionFailed(
                            reason.unwrap_or_else(|| "Connection closed".to_string()),
                        ));
                    }
                    // No reconnect: the loop stays up so queued audio drains
                }
                None => {
                    // Transport tasks are gone; disable this branch but
                    // keep the session alive for playback and teardown
                    transport_open = false;
                }
            },

            // Decode completions, possibly out of order
            Some((seq, result)) = decoded_rx.recv() => {
                match result {
                    Ok(buffer) => {
                        sequencer.push_decoded(seq, buffer);
                    }
                    Err(e) => {
                        // Dropped silently; the slot is skipped so later
                        // chunks keep flowing
                        debug!("dropping undecodable audio chunk {}: {}", seq, e);
                        sequencer.push_failed(seq);
                    }
                }
                for buffer in sequencer.pop_ready() {
                    queue.enqueue(buffer);
                }
            }

            // Commands from the handle
            command = command_rx.recv() => match command {
                Some(Command::SendText(text)) => {
                    let trimmed = text.trim();
                    // Precondition rejection: nothing is sent, logged or
                    // queued for later unless connected with real content
                    if state.get() == ConnectionState::Connected && !trimmed.is_empty() {
                        if let Ok(mut log) = log.lock() {
                            log.push_user(trimmed);
                        }
                        transport.send(trimmed.to_string());
                        let _ = event_tx.send(ChatEvent::LogChanged);
                        if !awaiting_response {
                            awaiting_response = true;
                            let _ = event_tx.send(ChatEvent::AwaitingResponse(true));
                        }
                    }
                }
                Some(Command::Close) | None => break,
            }
        }
    }

    // Scoped release: channel and audio device go down on every exit path.
    // In-flight decodes are left to finish; their results are discarded
    // when the receiver drops.
    transport.shutdown();
    drop(player);
    queue.clear();
    if state.get() != ConnectionState::Disconnected {
        state.set(ConnectionState::Disconnected);
        let _ = event_tx.send(ChatEvent::Disconnected(None));
    }
}

// =============================================================================
// Session Handle
// =============================================================================

/// Handle for controlling an active chat session
///
/// Dropping the handle closes the session.
pub struct ChatSessionHandle {
    /// Command sender
    command_tx: mpsc::UnboundedSender<Command>,
    /// The message log, written by the engine, read by the UI
    log: Arc<Mutex<MessageLog>>,
    /// Whether a buffer is currently sounding
    playing: Arc<AtomicBool>,
    /// Shared connection state
    state: SharedState,
    /// Join handle for the session thread
    /// Using std::thread because cpal's Stream is not Send
    handle: Option<JoinHandle<()>>,
}

impl ChatSessionHandle {
    /// Start a new chat session
    ///
    /// Returns a handle for controlling the session and a receiver for
    /// its events. One connect attempt is made; watch for `Connected` or
    /// `ConnectionFailed`.
    ///
    /// Note: this spawns a dedicated OS thread because cpal's audio
    /// streams are not Send-safe and cannot be driven from a shared
    /// async runtime.
    pub fn start(config: SessionConfig) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let log = Arc::new(Mutex::new(MessageLog::new()));
        let queue = PlaybackQueue::new();
        let playing = queue.playing_flag();
        let state = SharedState::new();

        let thread_log = log.clone();
        let thread_state = state.clone();
        let handle = std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("failed to create session runtime: {}", e);
                    thread_state.set(ConnectionState::Disconnected);
                    let _ = event_tx.send(ChatEvent::ConnectionFailed(e.to_string()));
                    return;
                }
            };

            rt.block_on(run_session(
                config,
                thread_log,
                queue,
                thread_state,
                event_tx,
                command_rx,
            ));
        });

        (
            Self {
                command_tx,
                log,
                playing,
                state,
                handle: Some(handle),
            },
            event_rx,
        )
    }

    /// Send one user message
    ///
    /// A no-op unless the session is connected and the trimmed text is
    /// non-empty; rejected sends are not queued for later.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.command_tx.send(Command::SendText(text.into()));
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Whether audio is currently sounding
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Shared handle to the message log for rendering
    ///
    /// The engine is the only writer; hold the lock briefly.
    pub fn log(&self) -> Arc<Mutex<MessageLog>> {
        self.log.clone()
    }

    /// Snapshot of the log entries for rendering
    pub fn entries(&self) -> Vec<crate::chat::log::ChatEntry> {
        self.log
            .lock()
            .map(|log| log.entries().to_vec())
            .unwrap_or_default()
    }

    /// Close the session
    ///
    /// Sends the close command to the session thread, which releases the
    /// channel and the audio device on its own. Does not block waiting
    /// for unresponsive audio drivers.
    pub fn close(&mut self) {
        let _ = self.command_tx.send(Command::Close);
        self.handle.take();
    }
}

impl Drop for ChatSessionHandle {
    fn drop(&mut self) {
        // Teardown is guaranteed even if close() was never called
        if self.handle.is_some() {
            self.close();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_byte_roundtrip() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ] {
            assert_eq!(ConnectionState::from_byte(state.to_byte()), state);
        }
    }

    #[test]
    fn test_connection_state_unknown_byte_is_disconnected() {
        assert_eq!(
            ConnectionState::from_byte(0xFF),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn test_shared_state_transitions() {
        let state = SharedState::new();
        assert_eq!(state.get(), ConnectionState::Disconnected);

        state.set(ConnectionState::Connecting);
        assert_eq!(state.get(), ConnectionState::Connecting);

        state.set(ConnectionState::Connected);
        let reader = state.clone();
        assert_eq!(reader.get(), ConnectionState::Connected);
    }

    #[test]
    fn test_session_config_from_client_config() {
        let config = ClientConfig::default();

        let text = SessionConfig::from_config_with_mode(&config, ChatMode::Text);
        assert_eq!(text.url, "ws://127.0.0.1:5001/ws");

        let audio = SessionConfig::from_config_with_mode(&config, ChatMode::Audio);
        assert_eq!(audio.url, "ws://127.0.0.1:5001/audio_chat");
    }
}
