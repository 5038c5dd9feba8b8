//! # Envision
//!
//! Backend for personalized manifestation passages.
//!
//! A user profile goes in; a 650–750 word second-person passage comes out,
//! grounded in the user's own earlier passages through a vector index.
//! Passages are stored with a usage ledger, can be searched semantically,
//! and can be rendered to speech.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────┐   ┌──────────┐
//!  profile ─▶│  prompt  │──▶│   LLM    │
//!            └────▲─────┘   └────┬─────┘
//!                 │ context      │ text
//!            ┌────┴─────┐   ┌────▼─────┐
//!            │  vector  │◀──│  SQLite  │──▶ history / usage
//!            │  index   │   │ passages │
//!            └──────────┘   └────┬─────┘
//!                                ▼
//!                              TTS ──▶ /static/audio/*.mp3
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! envision init                                   # create database
//! envision generate --user u1 ./profile.toml      # one passage
//! envision search --user u1 "career courage"
//! envision serve                                  # REST API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Service error taxonomy |
//! | [`prompt`] | Prompt construction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector`] | Vector backends and the embedding-aware index |
//! | [`llm`] | Chat-completion client |
//! | [`tts`] | Speech synthesis and audio files |
//! | [`cost`] | Token and cost estimation |
//! | [`generate`] | Retrieval-augmented generation |
//! | [`search`] | Semantic search over a user's passages |
//! | [`voice`] | Voice synthesis for stored passages |
//! | [`history`] | Passage queries |
//! | [`usage`] | Usage ledger |
//! | [`app`] | Shared process-wide dependencies |
//! | [`server`] | REST API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`telemetry`] | Tracing subscriber setup |

pub mod app;
pub mod config;
pub mod cost;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod history;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod search;
pub mod server;
pub mod telemetry;
pub mod tts;
pub mod usage;
pub mod vector;
pub mod voice;
