//! # Session Bridge
//!
//! Pairs one client WebSocket connection with one upstream transcription
//! connection and moves data between them until either side ends.
//!
//! ## Actor Model:
//! Each accepted client connection runs one `SessionBridge` actor. The actor
//! owns both connection handles exclusively, so sessions are fully isolated
//! and no locking is needed inside a session.
//!
//! ## Data-flow edges:
//! 1. **Inbound audio**: client binary frames → `UpstreamConnection::send`,
//!    handled directly in the actor's stream handler (order preserved by the
//!    actor mailbox)
//! 2. **Outbound transcripts**: a spawned loop drains the upstream event
//!    channel, translates each payload and delivers relay messages back to
//!    the actor for writing to the client (order preserved by the channel and
//!    the mailbox)
//! 3. **Close propagation**, both directions
//! 4. **Error observation**, both sides
//!
//! There is no ordering guarantee *between* the two edges; audio and
//! transcripts are independent streams.
//!
//! ## Lifecycle:
//! `Connecting` (upstream handshake in flight) → `Active` (bidirectional
//! forwarding) → `Closing` (one side ended, the other being torn down) →
//! `Closed` (resources released). A handshake failure jumps straight from
//! `Connecting` to `Closed` after closing the client with an error status.

use actix::prelude::*;
use actix_web::web;
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::UpstreamConfig;
use crate::error::RelayError;
use crate::relay::translator::{translate, RelayMessage};
use crate::state::AppState;
use crate::upstream::UpstreamConnection;

/// How often the server pings an idle client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a client may stay silent before the session is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle of one relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Client accepted, upstream handshake in flight
    Connecting,
    /// Both ends open, forwarding in both directions
    Active,
    /// One side closed or errored, the other being torn down
    Closing,
    /// Terminal; both handles released
    Closed,
}

/// WebSocket actor bridging one client to one upstream connection.
pub struct SessionBridge {
    /// Correlates every log line for this session
    session_id: Uuid,

    state: SessionState,

    /// The single upstream connection; `None` until the handshake finishes
    /// and after teardown
    upstream: Option<UpstreamConnection>,

    upstream_config: UpstreamConfig,

    app_state: web::Data<AppState>,

    last_heartbeat: Instant,
}

impl SessionBridge {
    pub fn new(app_state: web::Data<AppState>) -> Self {
        let upstream_config = app_state.get_config().upstream;
        Self {
            session_id: Uuid::new_v4(),
            state: SessionState::Connecting,
            upstream: None,
            upstream_config,
            app_state,
            last_heartbeat: Instant::now(),
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(session = %self.session_id, from = ?self.state, to = ?next,
                "Session state transition");
            self.state = next;
        }
    }

    /// Spawn the outbound-transcript loop for a freshly opened upstream
    /// connection.
    ///
    /// The loop suspends on the event channel, translates each raw payload
    /// and hands relay messages back to the actor. Malformed payloads are
    /// logged and counted but never terminate the session. When the channel
    /// ends the loop reports the upstream as closed.
    fn spawn_transcript_loop(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let mut events = match self.upstream.as_mut().and_then(|c| c.take_events()) {
            Some(events) => events,
            None => {
                // Connection arrived without its event channel; treat it as
                // already closed rather than leaving the session hanging.
                ctx.address().do_send(UpstreamClosed);
                return;
            }
        };

        let addr = ctx.address();
        let app_state = self.app_state.clone();
        let session_id = self.session_id;

        tokio::spawn(async move {
            while let Some(raw) = events.recv().await {
                match translate(&raw) {
                    Ok(Some(message)) => addr.do_send(ForwardTranscript(message)),
                    Ok(None) => {}
                    Err(err) => {
                        warn!(session = %session_id, "{}", err);
                        app_state.malformed_message();
                    }
                }
            }
            addr.do_send(UpstreamClosed);
        });
    }
}

/// Upstream handshake succeeded; carries the live connection handle.
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamReady(UpstreamConnection);

/// Upstream handshake failed; the session never becomes active.
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamFailed(RelayError);

/// One translated transcript fragment ready to write to the client.
#[derive(Message)]
#[rtype(result = "()")]
struct ForwardTranscript(RelayMessage);

/// The upstream event stream ended (clean close or error).
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamClosed;

impl Actor for SessionBridge {
    type Context = ws::WebsocketContext<Self>;

    /// Called when the client connection is established.
    ///
    /// Arms the heartbeat and starts the upstream handshake. The handshake
    /// runs in its own task so the actor can keep servicing client frames;
    /// audio arriving before the upstream opens is dropped, exactly like the
    /// active-session teardown race.
    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session = %self.session_id, "Client connected");
        self.app_state.session_started();

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(session = %act.session_id, "Client heartbeat timeout, closing session");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });

        let config = self.upstream_config.clone();
        let addr = ctx.address();
        tokio::spawn(async move {
            match UpstreamConnection::connect(&config).await {
                Ok(connection) => addr.do_send(UpstreamReady(connection)),
                Err(err) => addr.do_send(UpstreamFailed(err)),
            }
        });
    }

    /// Called when the client connection stops, for any reason.
    ///
    /// Closing the upstream handle here is what bounds its lifetime to the
    /// client connection plus the grace window; the call is idempotent, so it
    /// is safe even when the upstream side initiated the teardown.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.transition(SessionState::Closed);
        if let Some(upstream) = self.upstream.take() {
            upstream.close();
        }
        self.app_state.session_ended();
        info!(session = %self.session_id, "Session closed");
    }
}

/// Inbound-audio edge plus client-side close and error propagation.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for SessionBridge {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                // Forward opaque audio bytes while the upstream is open;
                // otherwise drop the frame silently. Not open covers both the
                // handshake window and the teardown race.
                match &self.upstream {
                    Some(upstream) if self.state == SessionState::Active => {
                        upstream.send(data.to_vec());
                    }
                    _ => {
                        debug!(session = %self.session_id,
                            "Dropping {} audio bytes, upstream not open", data.len());
                    }
                }
            }
            Ok(ws::Message::Text(_)) => {
                // The client protocol is binary audio only.
                warn!(session = %self.session_id, "Ignoring unexpected text frame from client");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session = %self.session_id, "Client closed: {:?}", reason);
                self.transition(SessionState::Closing);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(session = %self.session_id, "Ignoring unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                let err = RelayError::ClientTransport(err.to_string());
                error!(session = %self.session_id, "{}", err);
                self.transition(SessionState::Closing);
                ctx.stop();
            }
        }
    }
}

impl Handler<UpstreamReady> for SessionBridge {
    type Result = ();

    fn handle(&mut self, msg: UpstreamReady, ctx: &mut Self::Context) {
        if self.state != SessionState::Connecting {
            // The client went away while the handshake was in flight; the
            // connection's Drop gives it a bounded teardown.
            debug!(session = %self.session_id, "Discarding upstream connection, session already closing");
            return;
        }

        info!(session = %self.session_id, "Upstream transcription connection established");
        self.upstream = Some(msg.0);
        self.transition(SessionState::Active);
        self.spawn_transcript_loop(ctx);
    }
}

impl Handler<UpstreamFailed> for SessionBridge {
    type Result = ();

    fn handle(&mut self, msg: UpstreamFailed, ctx: &mut Self::Context) {
        // No retry: the session dies and any retry is a fresh client
        // connection attempt.
        error!(session = %self.session_id, "{}", msg.0);
        self.app_state.session_failed();
        self.transition(SessionState::Closing);
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Error,
            description: Some("transcription service unavailable".to_string()),
        }));
        ctx.stop();
    }
}

impl Handler<ForwardTranscript> for SessionBridge {
    type Result = ();

    fn handle(&mut self, msg: ForwardTranscript, ctx: &mut Self::Context) {
        if self.state != SessionState::Active {
            return;
        }
        match serde_json::to_string(&msg.0) {
            Ok(json) => {
                ctx.text(json);
                self.app_state.transcript_relayed();
            }
            Err(err) => {
                // RelayMessage is a plain string field; serialization cannot
                // realistically fail, but logging never tears down a session.
                warn!(session = %self.session_id, "Failed to serialize relay message: {}", err);
            }
        }
    }
}

impl Handler<UpstreamClosed> for SessionBridge {
    type Result = ();

    fn handle(&mut self, _msg: UpstreamClosed, ctx: &mut Self::Context) {
        if self.state == SessionState::Active || self.state == SessionState::Connecting {
            info!(session = %self.session_id, "Upstream connection ended, closing session");
            self.transition(SessionState::Closing);
            ctx.close(Some(ws::CloseReason {
                code: ws::CloseCode::Away,
                description: Some("transcription service disconnected".to_string()),
            }));
            ctx.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_new_bridge_starts_connecting() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let bridge = SessionBridge::new(state);
        assert_eq!(bridge.state, SessionState::Connecting);
        assert!(bridge.upstream.is_none());
    }

    #[test]
    fn test_transition_is_monotonic_per_call() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let mut bridge = SessionBridge::new(state);
        bridge.transition(SessionState::Active);
        assert_eq!(bridge.state, SessionState::Active);
        bridge.transition(SessionState::Closing);
        bridge.transition(SessionState::Closing);
        assert_eq!(bridge.state, SessionState::Closing);
        bridge.transition(SessionState::Closed);
        assert_eq!(bridge.state, SessionState::Closed);
    }
}
