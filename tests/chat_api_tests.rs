//! API integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use brook::llm::{MockChatClient, ScriptStep};

mod common;
use common::{create_chat, read_json, read_sse_events, request, test_app, test_app_with_client};

/// Test that the health endpoint works.
#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;

    let response = request(&app, Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = read_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

/// Chats can be created and listed; blank names are rejected.
#[tokio::test]
async fn test_chat_creation_and_listing() {
    let app = test_app().await;

    let chat = create_chat(&app, "Quantum computing").await;
    assert_eq!(chat["name"], "Quantum computing");
    assert!(chat["id"].is_string());

    let response = request(&app, Method::POST, "/chats", Some(json!({"name": "   "}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["code"], "BAD_REQUEST");

    let response = request(&app, Method::GET, "/chats", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let chats = read_json(response).await;
    assert_eq!(chats.as_array().unwrap().len(), 1);
}

/// Unknown chat ids are rejected across the surface.
#[tokio::test]
async fn test_unknown_chat_is_not_found() {
    let app = test_app().await;

    for (method, uri) in [
        (Method::GET, "/chats/nope/messages"),
        (Method::GET, "/chats/nope/events"),
        (Method::POST, "/chats/nope/cancel"),
        (Method::DELETE, "/chats/nope"),
    ] {
        let response = request(&app, method.clone(), uri, None).await;
        assert_eq!(
            response.status(),
            StatusCode::NOT_FOUND,
            "expected 404 for {method} {uri}"
        );
    }

    let response = request(
        &app,
        Method::POST,
        "/chats/nope/messages",
        Some(json!({"text": "hi"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Submitting "Hello" streams two deltas and a terminal event, and both
/// messages land in the persisted history.
#[tokio::test]
async fn test_submit_streams_reply_and_persists() {
    let app = test_app().await;
    let chat = create_chat(&app, "greeting").await;
    let chat_id = chat["id"].as_str().unwrap();

    let response = request(
        &app,
        Method::POST,
        &format!("/chats/{chat_id}/messages"),
        Some(json!({"text": "Hello"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let events = read_sse_events(response).await;
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["text"], "Hi");
    assert_eq!(events[0]["isFinal"], false);
    assert_eq!(events[1]["text"], " there");
    assert_eq!(events[2]["isFinal"], true);
    assert_eq!(events[2]["text"], "Hi there");
    assert_eq!(events[2]["sender"], "assistant");
    assert!(events[2].get("error").is_none());

    // Events share the reply's message id and it is strictly ordered
    // after the persisted prompt.
    let reply_id = events[0]["id"].as_i64().unwrap();
    assert!(events.iter().all(|e| e["id"].as_i64().unwrap() == reply_id));

    let response = request(&app, Method::GET, &format!("/chats/{chat_id}/messages"), None).await;
    let messages = read_json(response).await;
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["sender"], "user");
    assert_eq!(messages[0]["text"], "Hello");
    assert_eq!(messages[1]["sender"], "assistant");
    assert_eq!(messages[1]["text"], "Hi there");
    assert!(messages[0]["id"].as_i64().unwrap() < reply_id);
    assert_eq!(messages[1]["id"].as_i64().unwrap(), reply_id);
}

/// Blank prompts are rejected without side effects.
#[tokio::test]
async fn test_blank_prompt_rejected() {
    let app = test_app().await;
    let chat = create_chat(&app, "strict").await;
    let chat_id = chat["id"].as_str().unwrap();

    let response = request(
        &app,
        Method::POST,
        &format!("/chats/{chat_id}/messages"),
        Some(json!({"text": "  "})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = request(&app, Method::GET, &format!("/chats/{chat_id}/messages"), None).await;
    let messages = read_json(response).await;
    assert_eq!(messages.as_array().unwrap().len(), 0);
}

/// A second submit while a generation is active returns 409 and leaves the
/// first session to complete normally.
#[tokio::test]
async fn test_concurrent_submit_conflicts() {
    let client = Arc::new(
        MockChatClient::new(["slow", " reply"]).with_delay(Duration::from_millis(40)),
    );
    let (app, state) = test_app_with_client(client).await;
    let chat = create_chat(&app, "busy").await;
    let chat_id = chat["id"].as_str().unwrap().to_string();

    let first = {
        let app = app.clone();
        let chat_id = chat_id.clone();
        tokio::spawn(async move {
            let response = request(
                &app,
                Method::POST,
                &format!("/chats/{chat_id}/messages"),
                Some(json!({"text": "first"})),
            )
            .await;
            read_sse_events(response).await
        })
    };

    // Wait until the first generation is registered.
    while !state.registry.is_active(&chat_id) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let response = request(
        &app,
        Method::POST,
        &format!("/chats/{chat_id}/messages"),
        Some(json!({"text": "second"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["code"], "CONFLICT");

    let events = first.await.unwrap();
    let last = events.last().unwrap();
    assert_eq!(last["isFinal"], true);
    assert_eq!(last["text"], "slow reply");
}

/// Cancelling after two of five deltas keeps exactly the partial text.
#[tokio::test]
async fn test_cancel_keeps_partial_text() {
    let client = Arc::new(MockChatClient::with_steps(vec![
        ScriptStep::Delta("He".to_string()),
        ScriptStep::Delta("llo".to_string()),
        ScriptStep::Hold,
        ScriptStep::Delta(" wor".to_string()),
        ScriptStep::Delta("ld".to_string()),
        ScriptStep::Delta("!".to_string()),
    ]));
    let (app, state) = test_app_with_client(client).await;
    let chat = create_chat(&app, "stopme").await;
    let chat_id = chat["id"].as_str().unwrap().to_string();

    let streaming = {
        let app = app.clone();
        let chat_id = chat_id.clone();
        tokio::spawn(async move {
            let response = request(
                &app,
                Method::POST,
                &format!("/chats/{chat_id}/messages"),
                Some(json!({"text": "go"})),
            )
            .await;
            read_sse_events(response).await
        })
    };

    // Wait for the two deltas that precede the hold to be published.
    loop {
        let sub = state.hub.subscribe(&chat_id, None).await;
        if sub.replay.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let response = request(
        &app,
        Method::POST,
        &format!("/chats/{chat_id}/cancel"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let events = streaming.await.unwrap();
    let deltas: Vec<&str> = events
        .iter()
        .filter(|e| e["isFinal"] == false)
        .map(|e| e["text"].as_str().unwrap())
        .collect();
    assert_eq!(deltas, vec!["He", "llo"]);

    let last = events.last().unwrap();
    assert_eq!(last["isFinal"], true);
    assert_eq!(last["text"], "Hello");

    let response = request(&app, Method::GET, &format!("/chats/{chat_id}/messages"), None).await;
    let messages = read_json(response).await;
    assert_eq!(messages.as_array().unwrap()[1]["text"], "Hello");
}

/// Cancelling a chat with no active generation is an accepted no-op.
#[tokio::test]
async fn test_cancel_idle_chat_is_noop() {
    let app = test_app().await;
    let chat = create_chat(&app, "idle").await;
    let chat_id = chat["id"].as_str().unwrap();

    for _ in 0..2 {
        let response = request(
            &app,
            Method::POST,
            &format!("/chats/{chat_id}/cancel"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}

/// The model client failing mid-stream terminates the stream with an error
/// marker and still persists the partial reply.
#[tokio::test]
async fn test_upstream_failure_reaches_subscribers() {
    let client = Arc::new(MockChatClient::with_steps(vec![
        ScriptStep::Delta("par".to_string()),
        ScriptStep::Fail("connection reset".to_string()),
    ]));
    let (app, _state) = test_app_with_client(client).await;
    let chat = create_chat(&app, "flaky").await;
    let chat_id = chat["id"].as_str().unwrap();

    let response = request(
        &app,
        Method::POST,
        &format!("/chats/{chat_id}/messages"),
        Some(json!({"text": "go"})),
    )
    .await;
    // The submitting call itself succeeds; the failure arrives in-stream.
    assert_eq!(response.status(), StatusCode::OK);

    let events = read_sse_events(response).await;
    let last = events.last().unwrap();
    assert_eq!(last["isFinal"], true);
    assert_eq!(last["text"], "par");
    assert!(last["error"].as_str().unwrap().contains("connection reset"));

    let response = request(&app, Method::GET, &format!("/chats/{chat_id}/messages"), None).await;
    let messages = read_json(response).await;
    assert_eq!(messages.as_array().unwrap()[1]["text"], "par");
}

/// Two viewers attached at different times observe the same events and one
/// terminal event each; a reconnecting viewer resumes from its marker.
#[tokio::test]
async fn test_late_attach_and_resume() {
    let client = Arc::new(
        MockChatClient::new(["one", " two", " three"]).with_delay(Duration::from_millis(30)),
    );
    let (app, state) = test_app_with_client(client).await;
    let chat = create_chat(&app, "multi").await;
    let chat_id = chat["id"].as_str().unwrap().to_string();

    let submitter = {
        let app = app.clone();
        let chat_id = chat_id.clone();
        tokio::spawn(async move {
            let response = request(
                &app,
                Method::POST,
                &format!("/chats/{chat_id}/messages"),
                Some(json!({"text": "go"})),
            )
            .await;
            read_sse_events(response).await
        })
    };

    // Attach a second viewer once the first delta is out.
    loop {
        let sub = state.hub.subscribe(&chat_id, None).await;
        if !sub.replay.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let response = request(&app, Method::GET, &format!("/chats/{chat_id}/events"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let late_events = read_sse_events(response).await;

    let submit_events = submitter.await.unwrap();

    // Both streams end with the same terminal event, exactly once.
    let finals = |events: &[Value]| -> Vec<Value> {
        events
            .iter()
            .filter(|e| e["isFinal"] == true && e["sender"] == "assistant")
            .cloned()
            .collect()
    };
    let submit_finals = finals(&submit_events);
    let late_finals = finals(&late_events);
    assert_eq!(submit_finals.len(), 1);
    assert_eq!(late_finals.len(), 1);
    assert_eq!(submit_finals[0]["text"], "one two three");
    assert_eq!(late_finals[0]["text"], submit_finals[0]["text"]);

    // The late viewer's catch-up included the persisted prompt.
    assert!(late_events
        .iter()
        .any(|e| e["sender"] == "user" && e["text"] == "go"));

    // A viewer reconnecting afterwards with the prompt id as marker gets
    // the finished reply as persisted catch-up and the stream terminates.
    let user_id = late_events
        .iter()
        .find(|e| e["sender"] == "user")
        .unwrap()["id"]
        .as_i64()
        .unwrap();
    let response = request(
        &app,
        Method::GET,
        &format!("/chats/{chat_id}/events?lastSeenMessageId={user_id}"),
        None,
    )
    .await;
    let resumed = read_sse_events(response).await;
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0]["text"], "one two three");
    assert_eq!(resumed[0]["isFinal"], true);
}

/// Attaching to an idle chat returns the persisted tail and terminates.
#[tokio::test]
async fn test_attach_idle_chat_terminates() {
    let app = test_app().await;
    let chat = create_chat(&app, "quiet").await;
    let chat_id = chat["id"].as_str().unwrap();

    let response = request(&app, Method::GET, &format!("/chats/{chat_id}/events"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let events = read_sse_events(response).await;
    assert!(events.is_empty());
}

/// Chats can be deleted once idle; deletion removes the history.
#[tokio::test]
async fn test_delete_chat() {
    let app = test_app().await;
    let chat = create_chat(&app, "doomed").await;
    let chat_id = chat["id"].as_str().unwrap();

    let response = request(
        &app,
        Method::POST,
        &format!("/chats/{chat_id}/messages"),
        Some(json!({"text": "Hello"})),
    )
    .await;
    read_sse_events(response).await;

    let response = request(&app, Method::DELETE, &format!("/chats/{chat_id}"), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = request(&app, Method::GET, &format!("/chats/{chat_id}/messages"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
