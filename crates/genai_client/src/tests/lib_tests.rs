use super::*;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone)]
struct SeenRequest {
    model: String,
    api_key: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct MockState {
    status: StatusCode,
    reply: Value,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

async fn handle_generate(
    State(state): State<MockState>,
    Path(model): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.seen.lock().await.push(SeenRequest {
        model,
        api_key: headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
    (state.status, Json(state.reply.clone()))
}

async fn spawn_gemini_mock(
    status: StatusCode,
    reply: Value,
) -> (String, Arc<Mutex<Vec<SeenRequest>>>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        status,
        reply,
        seen: seen.clone(),
    };
    let app = Router::new()
        .route("/v1beta/models/:model", post(handle_generate))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), seen)
}

fn client_for(base_url: String) -> GeminiClient {
    GeminiClient::new(GeminiConfig {
        api_key: "test-key".to_string(),
        base_url,
        image_model: "image-model".to_string(),
        text_model: "text-model".to_string(),
    })
}

#[tokio::test]
async fn generate_image_sends_parts_and_decodes_inline_payload() {
    let png = vec![0x89, b'P', b'N', b'G', 1, 2, 3];
    let (base_url, seen) = spawn_gemini_mock(
        StatusCode::OK,
        json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "here you go" },
                        { "inlineData": { "mimeType": "image/png", "data": STANDARD.encode(&png) } }
                    ]
                }
            }]
        }),
    )
    .await;
    let client = client_for(base_url);

    let content = client
        .generate_image(
            vec![PromptPart::png(b"style".to_vec()), PromptPart::text("castle")],
            SizeTier::TwoK,
        )
        .await
        .expect("generate");

    assert_eq!(content.image, Some(png));
    assert_eq!(content.text.as_deref(), Some("here you go"));

    let seen = seen.lock().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].model, "image-model:generateContent");
    assert_eq!(seen[0].api_key.as_deref(), Some("test-key"));
    let body = &seen[0].body;
    assert_eq!(
        body["contents"][0]["parts"][0]["inlineData"]["data"],
        STANDARD.encode(b"style")
    );
    assert_eq!(body["contents"][0]["parts"][1]["text"], "castle");
    assert_eq!(body["generationConfig"]["imageConfig"]["imageSize"], "2K");
    assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "1:1");
}

#[tokio::test]
async fn generate_image_without_inline_data_yields_no_image() {
    let (base_url, _seen) = spawn_gemini_mock(
        StatusCode::OK,
        json!({ "candidates": [{ "content": { "parts": [{ "text": "I can't draw that" }] } }] }),
    )
    .await;

    let content = client_for(base_url)
        .generate_image(vec![PromptPart::text("???")], SizeTier::OneK)
        .await
        .expect("generate");
    assert_eq!(content.image, None);
}

#[tokio::test]
async fn entity_not_found_message_is_classified_as_auth_failure() {
    let (base_url, _seen) = spawn_gemini_mock(
        StatusCode::BAD_REQUEST,
        json!({ "error": { "code": 400, "message": "Requested entity was not found.", "status": "INVALID_ARGUMENT" } }),
    )
    .await;

    let err = client_for(base_url)
        .generate_image(vec![PromptPart::text("castle")], SizeTier::OneK)
        .await
        .expect_err("must fail");
    assert!(matches!(err, GenerativeServiceError::EntityNotFound(_)));
    assert!(err.is_auth_failure());
}

#[tokio::test]
async fn server_errors_are_not_auth_failures() {
    let (base_url, _seen) = spawn_gemini_mock(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": { "message": "backend overloaded" } }),
    )
    .await;

    let err = client_for(base_url)
        .generate_image(vec![PromptPart::text("castle")], SizeTier::OneK)
        .await
        .expect_err("must fail");
    assert_eq!(
        err,
        GenerativeServiceError::Api {
            status: 500,
            message: "backend overloaded".to_string(),
        }
    );
    assert!(!err.is_auth_failure());
}

#[tokio::test]
async fn complete_sends_system_instruction_and_returns_text() {
    let (base_url, seen) = spawn_gemini_mock(
        StatusCode::OK,
        json!({ "candidates": [{ "content": { "parts": [{ "text": "Photosynthesis " }, { "text": "uses light." }] } }] }),
    )
    .await;

    let answer = client_for(base_url)
        .complete("What is photosynthesis?", "You are a tutor.")
        .await
        .expect("complete");
    assert_eq!(answer, "Photosynthesis uses light.");

    let seen = seen.lock().await;
    assert_eq!(seen[0].model, "text-model:generateContent");
    assert_eq!(
        seen[0].body["systemInstruction"]["parts"][0]["text"],
        "You are a tutor."
    );
    assert_eq!(
        seen[0].body["contents"][0]["parts"][0]["text"],
        "What is photosynthesis?"
    );
}

#[tokio::test]
async fn missing_api_key_fails_before_any_request() {
    let (base_url, seen) = spawn_gemini_mock(StatusCode::OK, json!({})).await;
    let client = GeminiClient::new(GeminiConfig {
        api_key: "  ".to_string(),
        ..client_for(base_url).config().clone()
    });

    let err = client
        .complete("hi", "tutor")
        .await
        .expect_err("must fail");
    assert!(matches!(err, GenerativeServiceError::Unauthorized(_)));
    assert!(seen.lock().await.is_empty());
}

#[test]
fn endpoint_keeps_base_path_prefix() {
    let client = GeminiClient::new(GeminiConfig {
        base_url: "http://proxy.local/gemini".to_string(),
        ..GeminiConfig::new("k")
    });
    assert_eq!(
        client.endpoint("m").expect("url").as_str(),
        "http://proxy.local/gemini/v1beta/models/m:generateContent"
    );
}
