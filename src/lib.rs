//! # Niche Classifier
//!
//! A self-improving product niche classifier over image labels.
//!
//! An uploaded product photo is labeled by an external detector; the
//! classifier scores those labels against a weighted keyword lexicon to
//! pick a commerce niche, records an immutable audit snapshot, and later
//! folds user feedback back into the keyword weights within fixed bounds.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────────┐
//! │ Label        │──▶│ Classifier │──▶│   SQLite     │
//! │ Provider     │   │ (pure)     │   │ lexicon +    │
//! └──────────────┘   └────────────┘   │ history      │
//!                                     └──────┬───────┘
//!                                            │
//!                       ┌────────────────────┤
//!                       ▼                    ▼
//!                 ┌───────────┐        ┌───────────┐
//!                 │ Feedback  │        │ CLI/HTTP  │
//!                 │ Processor │        │ (niche)   │
//!                 └───────────┘        └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! niche init                          # create database
//! niche seed                          # seed the lexicon
//! niche classify photo.jpg            # classify one image
//! niche feedback 1 --outcome correct  # reinforce the prediction
//! niche serve http                    # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core domain types |
//! | [`labels`] | External label detection providers |
//! | [`classify`] | Pure scoring and classification orchestration |
//! | [`lexicon`] | Niche/keyword snapshot and bounded weight adjustment |
//! | [`history`] | Append-only classification log with guarded resolution |
//! | [`feedback`] | Feedback resolution and weight learning |
//! | [`seed`] | Lexicon seeding |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod feedback;
pub mod history;
pub mod labels;
pub mod lexicon;
pub mod migrate;
pub mod models;
pub mod seed;
pub mod server;
