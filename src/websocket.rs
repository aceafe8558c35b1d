//! # Transcription WebSocket Endpoint
//!
//! Accepts HTTP→WebSocket upgrades on the fixed `/api/transcribe` path and
//! starts one `SessionBridge` per accepted connection.
//!
//! ## Dispatch only:
//! This is a pure dispatch step — no buffering, no state retained across
//! requests. The bridge actor owns the whole session lifecycle from here on;
//! the route does not wait for it to finish. Requests that are not WebSocket
//! upgrades fail the handshake inside `ws::start` and never create a session
//! or an upstream connection, and every other path on the listener falls
//! through to [`reject_unmatched`].

use actix_web::http::{ConnectionType, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use tracing::{debug, info};

use crate::relay::SessionBridge;
use crate::state::AppState;

/// The single path on which transcription upgrades are accepted.
pub const TRANSCRIBE_PATH: &str = "/api/transcribe";

/// WebSocket endpoint handler for `/api/transcribe`.
pub async fn transcribe_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        "New transcription connection request from: {:?}",
        req.connection_info().peer_addr()
    );

    let bridge = SessionBridge::new(app_state);
    ws::start(bridge, &req, stream)
}

/// Default service for every unmatched path.
///
/// The transcription endpoint is the only upgradable path on this listener;
/// anything else is terminated with no response body and the connection
/// forced closed, so no session and no upstream connection can result from
/// it. A bare status line is the closest an HTTP listener gets to resetting
/// the transport.
pub async fn reject_unmatched(req: HttpRequest) -> HttpResponse {
    debug!("Rejecting request to unmatched path: {}", req.path());
    let mut response = HttpResponse::new(StatusCode::NOT_FOUND);
    response.head_mut().set_connection_type(ConnectionType::Close);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[actix_web::test]
    async fn test_reject_unmatched_sends_no_body_and_closes() {
        let req = TestRequest::get().uri("/api/other").to_http_request();

        let response = reject_unmatched(req).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.head().connection_type(), ConnectionType::Close);

        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        assert!(body.is_empty());
    }
}
