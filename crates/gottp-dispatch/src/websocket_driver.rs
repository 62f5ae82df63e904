// SPDX-License-Identifier: MIT OR Apache-2.0
//! The WebSocket driver: a reader task, a writer task, and a supervisor that
//! owns the connection handle and coordinates shutdown (§4.4).

use futures_util::{SinkExt, StreamExt};
use gottp_error::Error;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Outbound FIFO capacity. The writer task blocks the producer when full,
/// providing backpressure (§4.4).
pub const SEND_QUEUE_CAPACITY: usize = 64;

/// Grace period the supervisor waits for reader/writer to join on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// An event surfaced to the caller while a connection is open.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A frame arrived from the server.
    Received {
        /// Frame payload (lossily decoded to UTF-8 text when applicable).
        content: String,
        /// Whether the frame was both valid UTF-8 and valid JSON.
        is_json: bool,
        /// Unix milliseconds at receipt.
        timestamp_ms: u64,
    },
    /// The connection ended, carrying an error description if it was not a
    /// clean, caller-initiated close.
    Disconnected(Option<String>),
}

/// A request to send one frame, submitted to the writer's bounded FIFO.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Frame payload.
    pub content: String,
}

/// A handle to a live connection: a sender for outbound frames and a
/// receiver for inbound events. Dropping the handle (or sending
/// [`Handle::disconnect`]) tears the connection down; there is no automatic
/// reconnect (§4.4 — callers re-invoke `connect`).
pub struct Handle {
    outbound: mpsc::Sender<SendRequest>,
    inbound: mpsc::Receiver<ConnectionEvent>,
    supervisor: tokio::task::JoinHandle<()>,
}

impl Handle {
    /// Queue a frame for transmission. Blocks (async) when the FIFO is full.
    pub async fn send(&self, content: impl Into<String>) -> Result<(), Error> {
        self.outbound
            .send(SendRequest { content: content.into() })
            .await
            .map_err(|_| Error::network("WebSocket connection is closed"))
    }

    /// Receive the next connection event.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.inbound.recv().await
    }

    /// Request a clean shutdown and wait for the supervisor to finish.
    pub async fn disconnect(self) {
        drop(self.outbound);
        let _ = self.supervisor.await;
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn classify(message: &WsMessage) -> Option<(String, bool)> {
    match message {
        WsMessage::Text(text) => {
            let is_json = serde_json::from_str::<serde_json::Value>(text).is_ok();
            Some((text.to_string(), is_json))
        }
        WsMessage::Binary(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => {
                let is_json = serde_json::from_str::<serde_json::Value>(text).is_ok();
                Some((text.to_string(), is_json))
            }
            Err(_) => Some((format!("<{} binary bytes>", bytes.len()), false)),
        },
        WsMessage::Close(_) => None,
        _ => None,
    }
}

/// Open a WebSocket connection and spawn its reader/writer/supervisor tasks
/// (§4.4's WebSocket driver).
pub async fn connect(url: &str) -> Result<Handle, Error> {
    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| Error::network("WebSocket handshake failed").with_source(Box::new(e)))?;

    let (mut write, mut read) = stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<SendRequest>(SEND_QUEUE_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel::<ConnectionEvent>(SEND_QUEUE_CAPACITY);

    // The reader reports its own cause (`Some(err)` on a read error, `None`
    // on a clean end-of-stream) so the supervisor never has to guess.
    let reader_inbound = inbound_tx.clone();
    let reader = tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(message) => {
                    if let Some((content, is_json)) = classify(&message) {
                        let event = ConnectionEvent::Received { content, is_json, timestamp_ms: now_ms() };
                        if reader_inbound.send(event).await.is_err() {
                            return None;
                        }
                    }
                }
                Err(e) => return Some(e.to_string()),
            }
        }
        None
    });

    let (writer_shutdown_tx, mut writer_shutdown_rx) = mpsc::channel::<()>(1);
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = writer_shutdown_rx.recv() => break,
                request = outbound_rx.recv() => {
                    match request {
                        Some(request) => {
                            if write.send(WsMessage::Text(request.content.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        let _ = write.send(WsMessage::Close(None)).await;
    });

    let supervisor_inbound = inbound_tx;
    let supervisor = tokio::spawn(async move {
        let reader_cause = match timeout(SHUTDOWN_GRACE, reader).await {
            Ok(Ok(cause)) => cause,
            Ok(Err(_)) => Some("reader task panicked".to_string()),
            Err(_) => Some("reader task did not shut down within the grace period".to_string()),
        };

        // On a reader error the connection is already dead on the read side;
        // tell the writer to close rather than waiting for it to notice on
        // its own (it only notices once the producer drops the sender).
        if reader_cause.is_some() {
            let _ = writer_shutdown_tx.send(()).await;
        }
        let _ = timeout(SHUTDOWN_GRACE, writer).await;

        // The reader already reported its own cause; don't clobber it with
        // an unconditional `Disconnected(None)` (§4.4: one cause-carrying
        // event per disconnect, not two).
        let _ = supervisor_inbound.send(ConnectionEvent::Disconnected(reader_cause)).await;
    });

    Ok(Handle { outbound: outbound_tx, inbound: inbound_rx, supervisor })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_text_json_frame() {
        let msg = WsMessage::Text("{\"a\":1}".into());
        let (content, is_json) = classify(&msg).unwrap();
        assert_eq!(content, "{\"a\":1}");
        assert!(is_json);
    }

    #[test]
    fn classify_text_non_json_frame() {
        let msg = WsMessage::Text("hello".into());
        let (content, is_json) = classify(&msg).unwrap();
        assert_eq!(content, "hello");
        assert!(!is_json);
    }

    #[test]
    fn classify_binary_non_utf8_is_not_json() {
        let msg = WsMessage::Binary(vec![0xff, 0xfe, 0x00].into());
        let (_, is_json) = classify(&msg).unwrap();
        assert!(!is_json);
    }

    #[test]
    fn classify_close_frame_yields_none() {
        assert!(classify(&WsMessage::Close(None)).is_none());
    }

    #[test]
    fn send_queue_capacity_matches_spec() {
        assert_eq!(SEND_QUEUE_CAPACITY, 64);
    }

    #[tokio::test]
    async fn reader_error_yields_one_disconnected_event_carrying_the_cause() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Drop the connection without a close handshake so the client's
            // reader observes an error instead of a clean end-of-stream.
            drop(ws);
        });

        let mut handle = connect(&format!("ws://{addr}/")).await.unwrap();

        let first = timeout(Duration::from_secs(2), handle.recv()).await.expect("first event");
        let cause = match first {
            Some(ConnectionEvent::Disconnected(cause)) => cause,
            other => panic!("expected Disconnected, got {other:?}"),
        };
        assert!(cause.is_some(), "reader error should carry a cause, not None");

        // The supervisor must not send a second, clobbering Disconnected(None).
        let second = timeout(Duration::from_millis(200), handle.recv()).await;
        assert!(second.is_err(), "expected no further events, got {second:?}");
    }
}
