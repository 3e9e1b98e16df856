//! WebRTC signaling endpoint
//!
//! `GET /api/rtc/signal/{meeting_id}` upgrades to a WebSocket carrying
//! JSON signal messages, one per text frame. The router binds the
//! connection to one SFU peer and runs two pumps under a shared
//! cancellation scope:
//!
//! - inbound: read frames, dispatch offers/answers/candidates to the SFU
//! - outbound: drain the peer's signal queue onto the socket
//!
//! Either pump exiting cancels the other; when both are done the peer is
//! removed from its room and the socket closed.
//!
//! Authentication accepts the bearer token from the Authorization
//! header, the `access_token` cookie, or a `token` query parameter
//! (browsers cannot set headers on WebSocket upgrades).

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use huddle_core::models::MeetingId;
use huddle_sfu::{Peer, SfuError, SfuService, SignalKind, SignalMessage};

use super::{
    middleware::{bearer_token, cookie_token},
    AppError, AppState,
};

/// Query parameters for the signaling upgrade
#[derive(Debug, Deserialize)]
pub struct SignalQuery {
    /// JWT, for clients that cannot set the Authorization header
    pub token: Option<String>,
}

fn extract_token<'a>(headers: &'a HeaderMap, query: &'a SignalQuery) -> Option<&'a str> {
    bearer_token(headers)
        .or_else(|| cookie_token(headers))
        .or(query.token.as_deref())
}

/// `GET /api/rtc/signal/{meeting_id}`
pub async fn signal_handler(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
    Query(query): Query<SignalQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let token = extract_token(&headers, &query)
        .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;
    let claims = state.jwt_service.verify_token(token)?;
    let user_id = claims.user_id()?;

    // The meeting must exist and still be live before we spend a
    // transport on it
    let meeting = state
        .meeting_service
        .get_meeting(&MeetingId::from_uuid(meeting_id))
        .await?;
    if !meeting.is_active() {
        return Err(AppError::not_found("Meeting has ended"));
    }

    let sfu = Arc::clone(&state.sfu);
    // Signaling frames are small; 64KB leaves ample headroom for SDP
    Ok(ws
        .max_message_size(64 * 1024)
        .on_upgrade(move |socket| {
            handle_signal_socket(socket, sfu, meeting.id.to_string(), user_id.to_string())
        }))
}

async fn handle_signal_socket(
    mut socket: WebSocket,
    sfu: Arc<SfuService>,
    meeting_id: String,
    user_id: String,
) {
    let peer = match sfu.create_peer(&meeting_id, &user_id).await {
        Ok(peer) => peer,
        Err(e) => {
            warn!(
                meeting_id = %meeting_id,
                user_id = %user_id,
                error = %e,
                "Failed to create peer session"
            );
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::ERROR,
                    reason: "failed to create peer session".into(),
                })))
                .await;
            return;
        }
    };

    info!(meeting_id = %meeting_id, user_id = %user_id, "Signaling connected");

    let Some(mut signal_rx) = peer.take_signal_receiver() else {
        // Receiver already taken means a router is somehow still bound
        // to this peer instance; bail rather than fight over the queue
        warn!(user_id = %user_id, "Signal receiver unavailable");
        sfu.teardown_peer(&peer).await;
        return;
    };

    let cancel = CancellationToken::new();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Inbound pump: socket -> SFU dispatch
    let inbound = {
        let sfu = Arc::clone(&sfu);
        let peer = Arc::clone(&peer);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            // Exiting for any reason cancels the shared scope
            let _guard = cancel.clone().drop_guard();
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    frame = ws_rx.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                let msg: SignalMessage = match serde_json::from_str(&text) {
                                    Ok(msg) => msg,
                                    Err(e) => {
                                        warn!(user_id = %peer.id(), error = %e, "Malformed signal message");
                                        continue;
                                    }
                                };
                                if let Err(e) = dispatch_signal(&sfu, &peer, msg).await {
                                    match e {
                                        SfuError::SignalQueueFull(_) => {
                                            // Slow consumer: stop pumping, the
                                            // join point tears the peer down
                                            warn!(user_id = %peer.id(), "Signal queue overflow");
                                            break;
                                        }
                                        SfuError::EmptyCandidate | SfuError::ConnectionClosed => {
                                            warn!(user_id = %peer.id(), error = %e, "Rejected candidate");
                                        }
                                        e => {
                                            warn!(user_id = %peer.id(), error = %e, "Signal dispatch failed");
                                        }
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            // Ping/pong are handled by the transport;
                            // binary frames are not part of the protocol
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                debug!(user_id = %peer.id(), error = %e, "WebSocket read error");
                                break;
                            }
                        }
                    }
                }
            }
        })
    };

    // Outbound pump: signal queue -> socket, in enqueue order
    let outbound = {
        let cancel = cancel.clone();
        let user_id = user_id.clone();
        tokio::spawn(async move {
            let _guard = cancel.clone().drop_guard();
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    item = signal_rx.recv() => {
                        let Some(msg) = item else { break };
                        let json = match serde_json::to_string(&msg) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(user_id = %user_id, error = %e, "Failed to encode signal message");
                                continue;
                            }
                        };
                        if let Err(e) = ws_tx.send(Message::Text(json)).await {
                            debug!(user_id = %user_id, error = %e, "WebSocket write error");
                            break;
                        }
                    }
                }
            }
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::NORMAL,
                    reason: "".into(),
                })))
                .await;
        })
    };

    let _ = tokio::join!(inbound, outbound);

    sfu.teardown_peer(&peer).await;
    info!(meeting_id = %meeting_id, user_id = %user_id, "Signaling disconnected");
}

/// Route one inbound message to the SFU by type
async fn dispatch_signal(
    sfu: &Arc<SfuService>,
    peer: &Arc<Peer>,
    msg: SignalMessage,
) -> Result<(), SfuError> {
    match msg.kind {
        SignalKind::Offer => {
            let Some(sdp) = msg.sdp else {
                warn!(user_id = %peer.id(), "Offer without sdp, ignoring");
                return Ok(());
            };
            sfu.handle_offer(peer, sdp).await
        }
        SignalKind::Answer => {
            let Some(sdp) = msg.sdp else {
                warn!(user_id = %peer.id(), "Answer without sdp, ignoring");
                return Ok(());
            };
            sfu.handle_answer(peer, sdp).await
        }
        SignalKind::Candidate => {
            let Some(candidate) = msg.candidate else {
                warn!(user_id = %peer.id(), "Candidate message without candidate, ignoring");
                return Ok(());
            };
            sfu.handle_candidate(peer, candidate).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    #[test]
    fn test_token_priority_header_first() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("access_token=from-cookie"),
        );
        let query = SignalQuery {
            token: Some("from-query".to_string()),
        };

        assert_eq!(extract_token(&headers, &query), Some("from-header"));
    }

    #[test]
    fn test_token_falls_back_to_cookie_then_query() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("access_token=from-cookie"),
        );
        let query = SignalQuery {
            token: Some("from-query".to_string()),
        };
        assert_eq!(extract_token(&headers, &query), Some("from-cookie"));

        let headers = HeaderMap::new();
        assert_eq!(extract_token(&headers, &query), Some("from-query"));

        let none = SignalQuery { token: None };
        assert_eq!(extract_token(&headers, &none), None);
    }
}
