//! HTTP layer: REST handlers, signaling WebSocket, error mapping

pub mod auth;
pub mod error;
pub mod health;
pub mod meeting;
pub mod middleware;
pub mod signaling;

pub use error::{AppError, AppResult};

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use huddle_core::service::{JwtService, MeetingService, UserService};
use huddle_sfu::SfuService;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub meeting_service: Arc<MeetingService>,
    pub jwt_service: JwtService,
    pub sfu: Arc<SfuService>,
}

/// Build the application router.
///
/// REST routes carry a request timeout; the signaling route does not,
/// since the upgraded socket lives as long as the call.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let rest = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route(
            "/api/meetings",
            post(meeting::create_meeting).get(meeting::list_meetings),
        )
        .route("/api/meetings/join", post(meeting::join_meeting))
        .route("/api/meetings/:id", get(meeting::get_meeting))
        .route("/api/meetings/:id/end", post(meeting::end_meeting))
        .route("/api/meetings/:id/participants", get(meeting::participants))
        .route(
            "/api/meetings/:id/chat",
            post(meeting::send_chat).get(meeting::chat_history),
        )
        .route("/health", get(health::health))
        .layer(TimeoutLayer::new(request_timeout));

    let signaling = Router::new().route("/api/rtc/signal/:meeting_id", get(signaling::signal_handler));

    Router::new()
        .merge(rest)
        .merge(signaling)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
