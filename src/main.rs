//! # Envision CLI (`envision`)
//!
//! Commands for database initialization, one-off generation, search,
//! history, usage and voice synthesis, and for starting the REST server.
//!
//! ## Usage
//!
//! ```bash
//! envision --config ./config/envision.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `envision init` | Create the SQLite database and run schema migrations |
//! | `envision serve` | Start the REST API server |
//! | `envision generate --user <id> <profile.toml>` | Generate a passage from a profile file |
//! | `envision search --user <id> "<query>"` | Semantic search over a user's passages |
//! | `envision history --user <id>` | List a user's passages, newest first |
//! | `envision usage --user <id>` | Show a user's usage totals |
//! | `envision voice --user <id> <passage-id>` | Synthesize a stored passage |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use envision::app::AppContext;
use envision::config;
use envision::db;
use envision::generate::generate_passage;
use envision::history::{self, preview, DEFAULT_PAGE_SIZE};
use envision::migrate;
use envision::models::UserProfile;
use envision::search::search_passages;
use envision::server;
use envision::telemetry::init_tracing;
use envision::tts::Accent;
use envision::usage;
use envision::voice::generate_voice;

/// Envision CLI: personalized manifestation passages with retrieval,
/// history and voice.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/envision.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "envision",
    about = "Envision: personalized manifestation passages with retrieval, history and voice",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/envision.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Safe to
    /// run more than once.
    Init,

    /// Start the REST API server on `[server].bind`.
    Serve,

    /// Generate a passage from a TOML profile file.
    Generate {
        /// Owner of the generated passage.
        #[arg(long)]
        user: String,

        /// Profile file with the same fields as the API request body.
        profile: PathBuf,
    },

    /// Semantic search over a user's passages.
    ///
    /// Requires an embedding provider to be configured.
    Search {
        #[arg(long)]
        user: String,

        query: String,

        /// Maximum number of results (default: `[retrieval].search_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List a user's passages, newest first.
    History {
        #[arg(long)]
        user: String,

        #[arg(long, default_value_t = 0)]
        skip: i64,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: i64,
    },

    /// Show a user's usage totals.
    Usage {
        #[arg(long)]
        user: String,
    },

    /// Synthesize a stored passage to an audio file under the static dir.
    Voice {
        #[arg(long)]
        user: String,

        /// Passage id, as printed by `generate` or `history`.
        passage_id: i64,

        /// `indian_english`, `tamil` or `tamil_english`.
        #[arg(long, default_value_t = Accent::IndianEnglish)]
        accent: Accent,

        /// Speaker name used for the audio file name (default: the user id).
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(match cli.command {
        Commands::Serve => "info",
        _ => "warn",
    });

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_init(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Generate { user, profile } => {
            let content = std::fs::read_to_string(&profile)
                .with_context(|| format!("Failed to read profile: {}", profile.display()))?;
            let profile: UserProfile =
                toml::from_str(&content).with_context(|| "Failed to parse profile")?;

            let ctx = AppContext::from_config(cfg).await?;
            let result = generate_passage(&ctx, &user, &profile).await?;

            println!("Passage {} ({})", result.id, result.created_at);
            println!(
                "tokens: {}  cost: ${:.6}  indexed: {}",
                result.tokens_used,
                result.cost,
                result.point_id.as_deref().unwrap_or("no")
            );
            println!();
            println!("{}", result.text);
        }
        Commands::Search { user, query, limit } => {
            let ctx = AppContext::from_config(cfg).await?;
            let results = search_passages(&ctx, &user, &query, limit).await?;

            if results.is_empty() {
                println!("No results.");
            }
            for (i, r) in results.iter().enumerate() {
                println!("{}. [{:.3}] #{}", i + 1, r.score, r.id);
                println!("    {}", r.preview);
            }
        }
        Commands::History { user, skip, limit } => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            let passages = history::list(&pool, &user, skip, limit).await?;

            if passages.is_empty() {
                println!("No passages.");
            }
            for p in &passages {
                println!(
                    "#{}  {}",
                    p.id,
                    history::format_timestamp(p.created_at)
                );
                println!("    {}", preview(&p.text, cfg.retrieval.preview_chars));
            }
            pool.close().await;
        }
        Commands::Usage { user } => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            let s = usage::summary(&pool, &user).await?;
            pool.close().await;

            println!("Usage for {}", user);
            println!("  manifestations:   {}", s.total_manifestations);
            println!("  api calls:        {}", s.total_api_calls);
            println!("  generation time:  {:.0} ms", s.total_generation_time);
            println!("  cost:             ${:.6}", s.total_cost);
        }
        Commands::Voice {
            user,
            passage_id,
            accent,
            name,
        } => {
            let ctx = AppContext::from_config(cfg).await?;
            let result = generate_voice(&ctx, &user, name.as_deref(), passage_id, accent).await?;
            println!("{}", result.message);
            println!(
                "{}",
                ctx.config
                    .server
                    .static_dir
                    .join(result.audio_url.trim_start_matches("/static/"))
                    .display()
            );
        }
    }

    Ok(())
}
