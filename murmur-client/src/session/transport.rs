//! WebSocket transport channel
//!
//! Owns the lifecycle of one duplex connection. A single connect attempt
//! is made per session; there is no retry and no reconnect. After the
//! handshake the socket is split into separate reader and writer tasks so
//! a pending write can never cancel a read mid-frame. Inbound frames are
//! forwarded on one channel in exact arrival order; failures surface as a
//! `Closed` event rather than an error to the caller - the state
//! transition is the only signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Type alias for the connected WebSocket stream
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Transport Events
// =============================================================================

/// Inbound events from the transport channel
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection established
    Opened,
    /// One text frame (a response fragment)
    Text(String),
    /// One binary frame (an audio chunk)
    Binary(Vec<u8>),
    /// Connection closed or failed; reason present if abnormal
    Closed(Option<String>),
}

// =============================================================================
// Transport Handle
// =============================================================================

/// Handle to an active (or still connecting) transport channel
pub struct Transport {
    /// Outbound text frames to the writer task
    out_tx: mpsc::UnboundedSender<String>,
    /// Shutdown signal for the writer task
    shutdown: Option<oneshot::Sender<()>>,
}

impl Transport {
    /// Start a single connection attempt to `url`
    ///
    /// Events arrive on the returned receiver, in arrival order. A failed
    /// attempt yields `Closed` with the reason; nothing is returned here
    /// because the caller reacts to state, not errors.
    pub fn connect(url: String) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(run_connection(url, event_tx, out_rx, shutdown_rx));

        (
            Self {
                out_tx,
                shutdown: Some(shutdown_tx),
            },
            event_rx,
        )
    }

    /// Queue one outbound text frame
    ///
    /// The frame is written as-is; nothing is buffered across connection
    /// loss and nothing is retried. The engine gates sends on connection
    /// state before calling this.
    pub fn send(&self, text: String) {
        let _ = self.out_tx.send(text);
    }

    /// Close the channel
    ///
    /// The writer task sends a close frame and both tasks wind down.
    /// Safe to call from any state, including after a failure.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Connection Tasks
// =============================================================================

/// Connect, then run the reader and writer halves to completion
async fn run_connection(
    url: String,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    out_rx: mpsc::UnboundedReceiver<String>,
    shutdown_rx: oneshot::Receiver<()>,
) {
    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            let _ = event_tx.send(TransportEvent::Closed(Some(format!(
                "Connection failed: {}",
                e
            ))));
            return;
        }
    };

    let _ = event_tx.send(TransportEvent::Opened);

    let (writer, reader) = ws.split();

    // Shared flag so either half can stop the other
    let stop_flag = Arc::new(AtomicBool::new(false));

    let reader_stop = stop_flag.clone();
    tokio::spawn(async move {
        read_loop(reader, event_tx, reader_stop).await;
    });

    write_loop(writer, out_rx, shutdown_rx, stop_flag).await;
}

/// Reader task - forwards inbound frames in arrival order
///
/// Runs a plain loop with no `select!` so a read is never cancelled
/// mid-frame. Ends on close, error, or when the writer sets the stop
/// flag and the stream terminates.
async fn read_loop(
    mut reader: SplitStream<WsStream>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    stop_flag: Arc<AtomicBool>,
) {
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }

        match reader.next().await {
            Some(Ok(Message::Text(text))) => {
                if event_tx
                    .send(TransportEvent::Text(text.as_str().to_string()))
                    .is_err()
                {
                    // Receiver dropped, signal writer to stop
                    stop_flag.store(true, Ordering::Relaxed);
                    break;
                }
            }
            Some(Ok(Message::Binary(data))) => {
                if event_tx
                    .send(TransportEvent::Binary(data.to_vec()))
                    .is_err()
                {
                    stop_flag.store(true, Ordering::Relaxed);
                    break;
                }
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                // Control frames carry no payload for us
            }
            Some(Ok(Message::Close(_))) | None => {
                let _ = event_tx.send(TransportEvent::Closed(None));
                stop_flag.store(true, Ordering::Relaxed);
                break;
            }
            Some(Err(e)) => {
                let _ = event_tx.send(TransportEvent::Closed(Some(format!(
                    "WebSocket error: {}",
                    e
                ))));
                stop_flag.store(true, Ordering::Relaxed);
                break;
            }
        }
    }
}

/// Writer task - sends outbound frames and handles shutdown
///
/// Uses `select!` safely because `recv()` on the outbound channel is
/// cancel-safe. Always attempts a close frame on the way out.
async fn write_loop(
    mut writer: SplitSink<WsStream, Message>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
    stop_flag: Arc<AtomicBool>,
) {
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            let _ = writer.close().await;
            break;
        }

        tokio::select! {
            msg = out_rx.recv() => match msg {
                Some(text) => {
                    if writer.send(Message::Text(text.into())).await.is_err() {
                        // Error sending, signal reader to stop
                        stop_flag.store(true, Ordering::Relaxed);
                        break;
                    }
                }
                None => {
                    // Engine dropped the sender
                    stop_flag.store(true, Ordering::Relaxed);
                    let _ = writer.close().await;
                    break;
                }
            },
            _ = &mut shutdown_rx => {
                stop_flag.store(true, Ordering::Relaxed);
                let _ = writer.close().await;
                break;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_connect_yields_closed_event() {
        // Nothing listens on port 9; the single attempt must surface as
        // a Closed event, not an error or a retry loop.
        let (_transport, mut events) = Transport::connect("ws://127.0.0.1:9".to_string());

        match events.recv().await {
            Some(TransportEvent::Closed(Some(reason))) => {
                assert!(reason.contains("Connection failed"));
            }
            other => panic!("expected Closed with reason, got {:?}", other),
        }

        // The channel ends after the failure; no reconnect attempt follows
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_before_connect_is_safe() {
        let (mut transport, _events) = Transport::connect("ws://127.0.0.1:9".to_string());
        transport.shutdown();
        // Double shutdown is a no-op
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_send_after_failure_is_silent() {
        let (transport, mut events) = Transport::connect("ws://127.0.0.1:9".to_string());
        while let Some(event) = events.recv().await {
            if matches!(event, TransportEvent::Closed(_)) {
                break;
            }
        }
        // Writer task is gone; send must not panic
        transport.send("hello".to_string());
    }
}
