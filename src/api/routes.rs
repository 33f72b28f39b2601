//! API route definitions.

use axum::http::{header, Method};
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    // Tracing layer with request spans and timing
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health))
        // Chat management
        .route(
            "/chats",
            get(handlers::list_chats).post(handlers::create_chat),
        )
        .route("/chats/{chat_id}", delete(handlers::delete_chat))
        // Messages: history read, prompt submission (streaming reply)
        .route(
            "/chats/{chat_id}/messages",
            get(handlers::list_messages).post(handlers::send_message),
        )
        // Live attach with optional catch-up marker
        .route("/chats/{chat_id}/events", get(handlers::attach_events))
        .route("/chats/{chat_id}/cancel", post(handlers::cancel_generation))
        .with_state(state)
        .layer(cors)
        .layer(trace_layer)
}
