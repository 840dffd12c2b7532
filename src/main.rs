//! # Niche Classifier CLI (`niche`)
//!
//! The `niche` binary is the primary interface for the classifier. It
//! provides commands for database initialization, lexicon seeding,
//! classification, feedback submission, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! niche --config ./config/niche.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `niche init` | Create the SQLite database and run schema migrations |
//! | `niche seed` | Reset the lexicon to the seeded niche/keyword set |
//! | `niche niches` | List niches with keyword counts |
//! | `niche classify <image>` | Classify one product image |
//! | `niche feedback <id>` | Resolve a classification with user feedback |
//! | `niche history` | Show recent classifications |
//! | `niche serve http` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize and seed
//! niche init --config ./config/niche.toml
//! niche seed --config ./config/niche.toml
//!
//! # Classify with the configured label provider
//! niche classify photos/mat.jpg
//!
//! # Classify with inline labels (skips the provider)
//! niche classify photos/mat.jpg --labels "yoga:0.95,mat:0.9"
//!
//! # Confirm or correct a classification
//! niche feedback 12 --outcome correct
//! niche feedback 13 --outcome incorrect --niche 4
//!
//! # Serve the HTTP API
//! niche serve http --config ./config/niche.toml
//! ```

mod classify;
mod config;
mod db;
mod error;
mod feedback;
mod history;
mod labels;
mod lexicon;
mod migrate;
mod models;
mod seed;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Niche Classifier CLI — classifies product photos into commerce niches
/// and learns keyword weights from user feedback.
#[derive(Parser)]
#[command(
    name = "niche",
    about = "Niche Classifier — classify product photos into commerce niches",
    version,
    long_about = "Classifies product photos into commerce niches by scoring detected image \
    labels against a weighted keyword lexicon, and sharpens those weights over time from \
    user feedback."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/niche.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (products,
    /// niches, keywords, history). Idempotent; safe to run repeatedly.
    Init,

    /// Reset the lexicon to the seeded niche/keyword set.
    ///
    /// Wipes all domain state and repopulates the built-in commerce niches
    /// with their keywords at the default weight 1.0.
    Seed,

    /// List niches with their keyword counts.
    Niches,

    /// Classify a product image.
    ///
    /// Detects labels via the configured provider (or takes them inline
    /// with --labels), scores them against the lexicon, and records the
    /// classification in history.
    Classify {
        /// Path to the product image.
        image: String,

        /// Inline labels instead of the provider: `"term:conf,term:conf"`.
        /// Confidence defaults to 1.0 when omitted.
        #[arg(long)]
        labels: Option<String>,

        /// Classify without persisting a product or history record.
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve a classification with user feedback.
    ///
    /// Adjusts keyword weights within bounds and marks the history record
    /// resolved. Each record resolves exactly once.
    Feedback {
        /// History record id returned by `classify` or `/upload`.
        history_id: i64,

        /// Outcome: `correct` or `incorrect`.
        #[arg(long)]
        outcome: String,

        /// The niche this product actually belongs to (only with
        /// `--outcome incorrect`).
        #[arg(long)]
        niche: Option<i64>,
    },

    /// Show recent classification records.
    History {
        /// Maximum number of records to show.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Start the HTTP server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the JSON HTTP API on the address in `[server].bind`.
    Http,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "niche=info,niche_classifier=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Seed => {
            seed::run_seed(&cfg).await?;
        }
        Commands::Niches => {
            lexicon::run_niches(&cfg).await?;
        }
        Commands::Classify {
            image,
            labels,
            dry_run,
        } => {
            classify::run_classify(&cfg, &image, labels, dry_run).await?;
        }
        Commands::Feedback {
            history_id,
            outcome,
            niche,
        } => {
            feedback::run_feedback(&cfg, history_id, &outcome, niche).await?;
        }
        Commands::History { limit } => {
            history::run_history(&cfg, limit).await?;
        }
        Commands::Serve { service } => match service {
            ServeService::Http => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}
