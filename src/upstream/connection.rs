//! # Upstream WebSocket Connection
//!
//! Manages the outbound WebSocket to the AssemblyAI real-time transcription
//! API for one relay session.
//!
//! ## Connection Flow:
//! 1. `connect()` — WebSocket handshake with the API key in the
//!    `authorization` header, bounded by the configured connect timeout
//! 2. `send()` — forward one binary audio frame (silently dropped when the
//!    connection is no longer open)
//! 3. `take_events()` — hand the raw inbound text payloads to the session's
//!    transcript-forwarding loop
//! 4. `close()` — idempotent shutdown, bounded by the close grace period
//!
//! ## Task structure:
//! After the handshake the socket is split. A writer task owns the sink and
//! drains a command channel; a reader task pushes every inbound text frame
//! onto a bounded event channel. Either half exiting flips the shared open
//! flag, which is what `send()` consults before forwarding audio.
//!
//! There is no reconnect logic anywhere in this module: a dropped upstream
//! means a dropped session, since audio already lost cannot be recovered by
//! reconnecting.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
};
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::error::RelayError;

/// Capacity of the inbound event channel. Transcript events are small and
/// drained continuously by the session, so this only absorbs short bursts.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Instructions for the writer task that owns the WebSocket sink.
enum UpstreamCommand {
    /// Forward one opaque audio frame
    Audio(Vec<u8>),
    /// Send a close frame and stop writing
    Close,
}

/// Handle to one open upstream transcription connection.
///
/// Owned exclusively by a single session; at most one of these exists per
/// session and it never outlives the client connection plus the close grace
/// window.
pub struct UpstreamConnection {
    command_tx: mpsc::UnboundedSender<UpstreamCommand>,
    /// Raw inbound text payloads; `Option` so the transcript loop can take it
    event_rx: Option<mpsc::Receiver<String>>,
    open: Arc<AtomicBool>,
    close_grace: Duration,
    writer_abort: AbortHandle,
    reader_abort: AbortHandle,
}

impl UpstreamConnection {
    /// Open one outbound connection to the transcription service.
    ///
    /// ## Failure behavior:
    /// Connection refused, TLS failure, authentication rejection and handshake
    /// timeout all surface as a single `UpstreamUnavailable` error. The caller
    /// must fail the whole session; nothing here retries.
    pub async fn connect(cfg: &UpstreamConfig) -> Result<Self, RelayError> {
        let mut request = cfg
            .endpoint_url()
            .into_client_request()
            .map_err(|e| RelayError::UpstreamUnavailable(e.to_string()))?;

        // The service expects the raw key in the authorization header,
        // without a Bearer prefix.
        request.headers_mut().insert(
            "authorization",
            HeaderValue::from_str(&cfg.api_key)
                .map_err(|e| RelayError::UpstreamUnavailable(e.to_string()))?,
        );

        debug!(endpoint = %cfg.endpoint, "Connecting to upstream transcription service");

        let (ws_stream, _response) = timeout(cfg.connect_timeout(), connect_async(request))
            .await
            .map_err(|_| {
                RelayError::UpstreamUnavailable("handshake timed out".to_string())
            })?
            .map_err(|e| RelayError::UpstreamUnavailable(e.to_string()))?;

        let (mut sink, mut stream) = ws_stream.split();

        let open = Arc::new(AtomicBool::new(true));
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // Writer task: sole owner of the sink. Processing commands off a
        // channel keeps audio frames in send order.
        let writer_open = open.clone();
        let writer = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    UpstreamCommand::Audio(frame) => {
                        if let Err(e) = sink.send(Message::Binary(frame)).await {
                            warn!("Upstream send failed: {}", e);
                            break;
                        }
                    }
                    UpstreamCommand::Close => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
            writer_open.store(false, Ordering::SeqCst);
        });

        // Reader task: forwards raw text payloads to the session. Binary and
        // ping/pong frames from upstream carry no transcript data.
        let reader_open = open.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(payload)) => {
                        if event_tx.send(payload).await.is_err() {
                            debug!("Upstream event receiver dropped");
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("Upstream closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!("Upstream receive failed: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            reader_open.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            command_tx,
            event_rx: Some(event_rx),
            open,
            close_grace: cfg.close_grace(),
            writer_abort: writer.abort_handle(),
            reader_abort: reader.abort_handle(),
        })
    }

    /// Whether both halves of the connection are still running.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Forward one opaque audio frame upstream.
    ///
    /// Frames arriving while the connection is not open are dropped silently:
    /// that is a transient race during teardown, not a failure condition the
    /// client needs to hear about.
    pub fn send(&self, frame: Vec<u8>) {
        if !self.is_open() {
            debug!("Dropping {} audio bytes, upstream not open", frame.len());
            return;
        }
        let _ = self.command_tx.send(UpstreamCommand::Audio(frame));
    }

    /// Take the inbound event receiver for the transcript-forwarding loop.
    ///
    /// Yields `Some` exactly once; the receiver preserves upstream arrival
    /// order.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<String>> {
        self.event_rx.take()
    }

    /// Close the connection. Idempotent: the first call sends a close frame
    /// and schedules a forced abort after the grace window; every later call
    /// is a no-op.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.command_tx.send(UpstreamCommand::Close);
            self.schedule_force_abort();
        }
    }

    /// Abort both connection tasks if they haven't wound down within the
    /// grace window.
    fn schedule_force_abort(&self) {
        let writer = self.writer_abort.clone();
        let reader = self.reader_abort.clone();
        let grace = self.close_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            writer.abort();
            reader.abort();
        });
    }
}

impl Drop for UpstreamConnection {
    fn drop(&mut self) {
        // A session that dies without calling close() still gets a bounded
        // teardown. The command sender is dropped right after, which also
        // lets the writer task exit on its own.
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// What the fake upstream server observed on its side of the socket.
    #[derive(Debug, PartialEq)]
    enum Seen {
        Binary(Vec<u8>),
        CloseFrame,
    }

    fn test_config(addr: std::net::SocketAddr) -> UpstreamConfig {
        UpstreamConfig {
            endpoint: format!("ws://{}", addr),
            api_key: "test-key".to_string(),
            sample_rate: 16_000,
            connect_timeout_ms: 2_000,
            close_grace_ms: 500,
        }
    }

    /// Spawn a one-connection WebSocket server that records what it sees and
    /// sends the given text payloads right after the handshake.
    async fn spawn_fake_upstream(
        outbound: Vec<String>,
    ) -> (std::net::SocketAddr, mpsc::UnboundedReceiver<Seen>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            for payload in outbound {
                ws.send(Message::Text(payload)).await.unwrap();
            }

            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Binary(bytes) => {
                        let _ = seen_tx.send(Seen::Binary(bytes));
                    }
                    Message::Close(_) => {
                        let _ = seen_tx.send(Seen::CloseFrame);
                        break;
                    }
                    _ => {}
                }
            }
        });

        (addr, seen_rx)
    }

    #[tokio::test]
    async fn audio_frames_arrive_in_order_and_unmodified() {
        let (addr, mut seen) = spawn_fake_upstream(vec![]).await;
        let conn = UpstreamConnection::connect(&test_config(addr)).await.unwrap();

        let frames: Vec<Vec<u8>> = vec![vec![1, 2, 3], vec![4, 5], vec![6, 7, 8, 9]];
        for frame in &frames {
            conn.send(frame.clone());
        }

        for frame in &frames {
            let observed = timeout(Duration::from_secs(2), seen.recv())
                .await
                .expect("server saw no frame")
                .unwrap();
            assert_eq!(observed, Seen::Binary(frame.clone()));
        }
    }

    #[tokio::test]
    async fn events_preserve_upstream_order() {
        let payloads = vec![
            r#"{"message_type":"PartialTranscript","text":"hel"}"#.to_string(),
            r#"{"message_type":"FinalTranscript","text":"hello"}"#.to_string(),
            r#"{"message_type":"SessionBegins"}"#.to_string(),
        ];
        let (addr, _seen) = spawn_fake_upstream(payloads.clone()).await;

        let mut conn = UpstreamConnection::connect(&test_config(addr)).await.unwrap();
        let mut events = conn.take_events().unwrap();
        // The receiver can only be taken once.
        assert!(conn.take_events().is_none());

        for expected in &payloads {
            let event = timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("no event arrived")
                .unwrap();
            assert_eq!(&event, expected);
        }
    }

    #[tokio::test]
    async fn close_is_idempotent_and_sends_one_close_frame() {
        let (addr, mut seen) = spawn_fake_upstream(vec![]).await;
        let conn = UpstreamConnection::connect(&test_config(addr)).await.unwrap();

        conn.close();
        conn.close();
        conn.close();

        let observed = timeout(Duration::from_secs(2), seen.recv())
            .await
            .expect("server saw no close frame")
            .unwrap();
        assert_eq!(observed, Seen::CloseFrame);

        // The server's read loop stopped after the close frame, so the
        // channel ends without a second one.
        assert!(timeout(Duration::from_millis(300), seen.recv())
            .await
            .map(|next| next.is_none())
            .unwrap_or(true));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn frames_after_close_are_dropped_silently() {
        let (addr, mut seen) = spawn_fake_upstream(vec![]).await;
        let conn = UpstreamConnection::connect(&test_config(addr)).await.unwrap();

        conn.close();
        conn.send(vec![1, 2, 3]);

        let observed = timeout(Duration::from_secs(2), seen.recv()).await.unwrap().unwrap();
        assert_eq!(observed, Seen::CloseFrame);
        assert!(timeout(Duration::from_millis(300), seen.recv())
            .await
            .map(|next| next.is_none())
            .unwrap_or(true));
    }

    #[tokio::test]
    async fn refused_connection_is_upstream_unavailable() {
        // Bind and immediately drop the listener so the port refuses.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = UpstreamConnection::connect(&test_config(addr)).await;
        assert!(matches!(result, Err(RelayError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn handshake_carries_the_api_key() {
        use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (auth_tx, mut auth_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = |req: &Request, resp: Response| {
                let auth = req
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let _ = auth_tx.send((auth, req.uri().to_string()));
                Ok(resp)
            };
            let _ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.unwrap();
        });

        let _conn = UpstreamConnection::connect(&test_config(addr)).await.unwrap();
        let (auth, uri) = timeout(Duration::from_secs(2), auth_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(auth, "test-key");
        assert!(uri.contains("sample_rate=16000"));
    }
}
