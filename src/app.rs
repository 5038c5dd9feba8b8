//! Process-wide dependencies.
//!
//! [`AppContext`] is built once at startup and cloned into every request
//! handler and CLI command. Everything inside is either cheap to clone or
//! behind an `Arc`.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::cost::CostModel;
use crate::db;
use crate::embedding::create_provider;
use crate::llm::{HttpLlmClient, LlmClient};
use crate::migrate::run_migrations;
use crate::tts::{create_synthesizer, VoiceService};
use crate::vector::{InMemoryVectorBackend, SqliteVectorBackend, VectorBackend, VectorIndex};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub llm: Arc<dyn LlmClient>,
    /// `None` when embeddings are disabled.
    pub index: Option<VectorIndex>,
    pub voice: Arc<VoiceService>,
    pub cost: CostModel,
}

impl AppContext {
    /// Assemble a context from already-built parts.
    pub fn new(
        config: Config,
        pool: SqlitePool,
        llm: Arc<dyn LlmClient>,
        index: Option<VectorIndex>,
        voice: VoiceService,
    ) -> Self {
        let cost = CostModel::from_config(&config.cost);
        Self {
            config: Arc::new(config),
            pool,
            llm,
            index,
            voice: Arc::new(voice),
            cost,
        }
    }

    /// Connect to the database, run migrations and build every client
    /// named in `config`.
    ///
    /// A TTS provider that cannot be built (typically a missing key) only
    /// disables voice synthesis; everything else is fatal.
    pub async fn from_config(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        run_migrations(&pool).await?;

        let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::from_config(&config.llm)?);

        let index = match create_provider(&config.embedding).await? {
            Some(embedder) => {
                let backend: Arc<dyn VectorBackend> = match config.vector.backend.as_str() {
                    "sqlite" => Arc::new(SqliteVectorBackend::new(pool.clone())),
                    "memory" => Arc::new(InMemoryVectorBackend::new()),
                    other => bail!("Unknown vector backend: '{}'", other),
                };
                let index = VectorIndex::new(backend, embedder, config.vector.collection.clone());
                index.ensure_collection().await?;
                Some(index)
            }
            None => {
                tracing::info!("embeddings disabled; semantic search and retrieval are off");
                None
            }
        };

        let synthesizer = match create_synthesizer(&config.tts) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "text-to-speech unavailable");
                None
            }
        };
        let voice = VoiceService::new(synthesizer, config.server.static_dir.clone(), &config.tts);

        tracing::info!(
            embeddings = config.embedding.is_enabled(),
            collection = index.as_ref().map(VectorIndex::collection),
            voice = voice.is_enabled(),
            "application context ready"
        );

        Ok(Self::new(config, pool, llm, index, voice))
    }
}
