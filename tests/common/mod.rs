//! Shared fixtures: a mock chat-completion endpoint, a deterministic
//! embedder, a fake speech synthesizer and an [`AppContext`] wired to them.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use envision::app::AppContext;
use envision::config::parse_config;
use envision::db;
use envision::embedding::EmbeddingProvider;
use envision::llm::HttpLlmClient;
use envision::migrate::run_migrations;
use envision::models::UserProfile;
use envision::tts::{SpeechSynthesizer, VoiceService, VoiceSettings};
use envision::vector::{SqliteVectorBackend, VectorIndex};

pub const DIMS: usize = 64;

// ============ Mock LLM ============

type MockState = (Arc<Mutex<Vec<Value>>>, StatusCode, Value);

pub struct MockLlm {
    pub url: String,
    pub requests: Arc<Mutex<Vec<Value>>>,
}

impl MockLlm {
    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r["messages"][0]["content"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

/// Serve a fixed `status` + `body` for every chat-completion request.
pub async fn mock_llm(status: StatusCode, body: Value) -> MockLlm {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state: MockState = (requests.clone(), status, body);

    let app = Router::new()
        .route(
            "/v1/chat/completions",
            post(
                |State((requests, status, body)): State<MockState>, Json(req): Json<Value>| async move {
                    requests.lock().unwrap().push(req);
                    (status, Json(body))
                },
            ),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockLlm {
        url: format!("http://{}/v1/chat/completions", addr),
        requests,
    }
}

/// A successful chat-completion body carrying `content`.
pub fn completion(content: &str) -> Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
}

// ============ Embedder ============

/// Bag-of-words hashing embedder; identical text gives identical vectors.
pub struct HashEmbedder;

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for word in t.split_whitespace() {
                    let h = word
                        .to_lowercase()
                        .bytes()
                        .fold(5381u64, |h, b| h.wrapping_mul(33).wrapping_add(b as u64));
                    v[(h % DIMS as u64) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Embedder whose every call fails, as when the embedding service is down.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding service unavailable")
    }
}

// ============ Speech ============

/// Returns the UTF-8 bytes of the text as "audio".
pub struct FakeSynth;

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    async fn synthesize(&self, text: &str, _settings: &VoiceSettings) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }
}

// ============ Context ============

pub struct TestEnv {
    pub dir: TempDir,
    pub ctx: AppContext,
}

/// Build a context over a fresh SQLite file in a temp dir.
///
/// `with_index = false` behaves like `embedding.provider = "disabled"`.
pub async fn test_env(llm_url: &str, with_index: bool) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let root = dir.path().display().to_string();

    let config = parse_config(&format!(
        r#"
[db]
path = '{root}/data/envision.sqlite'

[server]
bind = "127.0.0.1:0"
static_dir = '{root}/static'

[llm]
endpoint = "{llm_url}"
timeout_secs = 10
"#
    ))
    .unwrap();

    let pool = db::connect(&config).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let llm = HttpLlmClient::new(&config.llm, Some("test-key".to_string())).unwrap();

    let index = if with_index {
        let index = VectorIndex::new(
            Arc::new(SqliteVectorBackend::new(pool.clone())),
            Arc::new(HashEmbedder),
            config.vector.collection.clone(),
        );
        index.ensure_collection().await.unwrap();
        Some(index)
    } else {
        None
    };

    let synth: Arc<dyn SpeechSynthesizer> = Arc::new(FakeSynth);
    let voice = VoiceService::new(Some(synth), config.server.static_dir.clone(), &config.tts);

    let ctx = AppContext::new(config, pool, Arc::new(llm), index, voice);
    TestEnv { dir, ctx }
}

pub fn profile() -> UserProfile {
    UserProfile {
        preferred_name: "Jane Doe".into(),
        birth_date: Some("1995-05-15".into()),
        nakshatra: "Rohini".into(),
        lagna: "Taurus".into(),
        strengths: "Creativity, Empathy".into(),
        areas_of_improvement: "Time Management".into(),
        next_year_goals: Some("Build a SaaS product".into()),
        life_goals: "Live by the ocean".into(),
        manifestation_focus: "Career Growth".into(),
        ..Default::default()
    }
}
