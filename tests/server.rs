mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{completion, mock_llm, test_env, TestEnv};
use envision::server::build_router;

const PASSAGE: &str = "You walk forward with calm and certain steps.";

/// Serve the real router on an ephemeral port; returns its base URL.
async fn serve(env: &TestEnv) -> String {
    let app = build_router(env.ctx.clone()).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn profile_json() -> Value {
    json!({
        "preferred_name": "Jane Doe",
        "nakshatra": "Rohini",
        "lagna": "Taurus",
        "strengths": "Creativity",
        "challenges": "Time management",
        "life_goals": "Live by the ocean",
        "desired_mindset": "Career growth"
    })
}

#[tokio::test]
async fn test_relative_api_prefix_is_an_error() {
    let llm = mock_llm(StatusCode::OK, completion(PASSAGE)).await;
    let env = test_env(&llm.url, false).await;
    let mut ctx = env.ctx.clone();
    let mut config = (*ctx.config).clone();
    config.server.api_prefix = "api/v1".to_string();
    ctx.config = std::sync::Arc::new(config);

    let err = build_router(ctx).unwrap_err();
    assert!(err.to_string().contains("api_prefix"));
}

#[tokio::test]
async fn test_health() {
    let llm = mock_llm(StatusCode::OK, completion(PASSAGE)).await;
    let env = test_env(&llm.url, true).await;
    let base = serve(&env).await;

    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let llm = mock_llm(StatusCode::OK, completion(PASSAGE)).await;
    let env = test_env(&llm.url, true).await;
    let base = serve(&env).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/manifestation/generate", base))
        .json(&profile_json())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");
    assert!(llm.prompts().is_empty());
}

#[tokio::test]
async fn test_generate_history_voice_usage_flow() {
    let llm = mock_llm(StatusCode::OK, completion(PASSAGE)).await;
    let env = test_env(&llm.url, true).await;
    let base = serve(&env).await;
    let client = reqwest::Client::new();

    // Generate
    let resp = client
        .post(format!("{}/api/v1/manifestation/generate", base))
        .header("X-User-Id", "alice")
        .json(&profile_json())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let generated: Value = resp.json().await.unwrap();
    assert_eq!(generated["text"], PASSAGE);
    assert!(generated["point_id"].is_string());
    let id = generated["id"].as_i64().unwrap();

    // History, owner and stranger
    let resp = client
        .get(format!("{}/api/v1/history/{}", base, id))
        .header("X-User-Id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let item: Value = resp.json().await.unwrap();
    assert_eq!(item["text"], PASSAGE);
    assert_eq!(item["preview"], PASSAGE);

    let resp = client
        .get(format!("{}/api/v1/history/{}", base, id))
        .header("X-User-Id", "mallory")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = client
        .get(format!("{}/api/v1/history?skip=0&limit=5", base))
        .header("X-User-Id", "alice")
        .send()
        .await
        .unwrap();
    let list: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], id);

    // Voice, then fetch the audio through /static
    let resp = client
        .post(format!("{}/api/v1/voice/generate", base))
        .header("X-User-Id", "alice")
        .header("X-User-Name", "Jane Doe")
        .json(&json!({ "manifestation_id": id, "accent": "tamil_english" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let voice: Value = resp.json().await.unwrap();
    let audio_url = voice["audio_url"].as_str().unwrap();
    assert!(audio_url.starts_with("/static/audio/Jane_Doe_"));

    let audio = reqwest::get(format!("{}{}", base, audio_url)).await.unwrap();
    assert_eq!(audio.status(), 200);
    assert_eq!(audio.bytes().await.unwrap().as_ref(), PASSAGE.as_bytes());

    // Usage
    let resp = client
        .get(format!("{}/api/v1/usage/summary", base))
        .header("X-User-Id", "alice")
        .send()
        .await
        .unwrap();
    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["total_manifestations"], 1);
    assert_eq!(summary["total_api_calls"], 1);
}

#[tokio::test]
async fn test_client_errors() {
    let llm = mock_llm(StatusCode::OK, completion(PASSAGE)).await;
    let env = test_env(&llm.url, true).await;
    let base = serve(&env).await;
    let client = reqwest::Client::new();

    // Missing required profile fields
    let resp = client
        .post(format!("{}/api/v1/manifestation/generate", base))
        .header("X-User-Id", "alice")
        .json(&json!({ "preferred_name": "Jane" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"].as_str().unwrap().contains("nakshatra"));

    // Malformed JSON
    let resp = client
        .post(format!("{}/api/v1/manifestation/generate", base))
        .header("X-User-Id", "alice")
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Empty search query
    let resp = client
        .post(format!("{}/api/v1/search", base))
        .header("X-User-Id", "alice")
        .json(&json!({ "query": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Unknown accent
    let resp = client
        .post(format!("{}/api/v1/voice/generate", base))
        .header("X-User-Id", "alice")
        .json(&json!({ "manifestation_id": 1, "accent": "klingon" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Non-numeric history id
    let resp = client
        .get(format!("{}/api/v1/history/abc", base))
        .header("X-User-Id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_upstream_failure_maps_to_bad_gateway() {
    let llm = mock_llm(StatusCode::SERVICE_UNAVAILABLE, json!({ "error": "busy" })).await;
    let env = test_env(&llm.url, true).await;
    let base = serve(&env).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/manifestation/generate", base))
        .header("X-User-Id", "alice")
        .json(&profile_json())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "upstream_error");
}

#[tokio::test]
async fn test_search_disabled_without_embeddings() {
    let llm = mock_llm(StatusCode::OK, completion(PASSAGE)).await;
    let env = test_env(&llm.url, false).await;
    let base = serve(&env).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/search", base))
        .header("X-User-Id", "alice")
        .json(&json!({ "query": "calm" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "embeddings_disabled");
}
