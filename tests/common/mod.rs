//! Test utilities and common setup.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use brook::api::{self, AppState};
use brook::db::Database;
use brook::llm::{ChatClient, MockChatClient};

/// Create a test application with an in-memory database and a scripted
/// model client that replies "Hi there". The small delay keeps the
/// generation in flight while the submitting request attaches its stream.
pub async fn test_app() -> Router {
    let client = MockChatClient::new(["Hi", " there"]).with_delay(std::time::Duration::from_millis(10));
    test_app_with_client(Arc::new(client)).await.0
}

/// Create a test application around the given model client, returning the
/// router and the shared state for white-box assertions.
pub async fn test_app_with_client(client: Arc<dyn ChatClient>) -> (Router, AppState) {
    let db = Database::in_memory().await.unwrap();
    let state = AppState::new(&db, client);
    (api::create_router(state.clone()), state)
}

/// Issue a JSON request against the router.
pub async fn request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().uri(uri).method(method);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

/// Read a response body as JSON.
pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Read an SSE response body to its end and parse every `data:` frame.
pub async fn read_sse_events(response: Response<Body>) -> Vec<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|data| !data.trim().is_empty())
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

/// Create a chat and return its JSON record.
pub async fn create_chat(app: &Router, name: &str) -> Value {
    let response = request(
        app,
        Method::POST,
        "/chats",
        Some(serde_json::json!({ "name": name })),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    read_json(response).await
}
