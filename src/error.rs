//! Service-level error taxonomy.
//!
//! Adapters and plumbing use `anyhow`; everything that crosses the
//! service boundary (orchestrator, search, voice, history, usage) returns
//! [`ServiceError`] so that the HTTP layer and the CLI can tell client
//! errors apart from configuration and upstream failures.

use thiserror::Error;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Missing credentials or a disabled component. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    BadRequest(String),

    /// A semantic operation was requested but no embedding provider is configured.
    #[error("embeddings are disabled; set [embedding] provider in config")]
    EmbeddingsDisabled,

    /// The passage does not exist or belongs to another user.
    #[error("{0} not found")]
    NotFound(String),

    /// LLM, TTS, embedding or vector index failure, including malformed
    /// response bodies.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Wrap an adapter error as an upstream failure, keeping its context chain.
    pub fn upstream(err: anyhow::Error) -> Self {
        ServiceError::Upstream(format!("{:#}", err))
    }
}
