//! # RepoLens
//!
//! GitHub repository analysis with grounded question answering.
//!
//! RepoLens fetches a repository's metadata, README, file tree, and issues,
//! ranks the files by relevance under a byte budget, produces a structured
//! analysis with a single generative-model call per session, persists the
//! result to normalized SQLite tables, and answers follow-up questions
//! grounded in the stored analysis.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────┐   ┌──────────┐
//! │  GitHub  │──▶│ Rank + Collect │──▶│ Analyzer  │──▶│  SQLite   │
//! │   API    │   │ (byte budget) │   │ (1 call) │   │ (11 tbls)│
//! └──────────┘   └───────────────┘   └──────────┘   └────┬─────┘
//!                                                        │
//!                                    ┌───────────────────┤
//!                                    ▼                   ▼
//!                               ┌──────────┐       ┌──────────┐
//!                               │   CLI    │       │   HTTP   │
//!                               │          │       │  (JSON)  │
//!                               └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! repolens init                                        # create database
//! repolens analyze https://github.com/owner/repo --wait
//! repolens show <repo-id>                              # stored analysis
//! repolens ask <repo-id> "How do I set this up?"
//! repolens serve                                       # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and session state machine |
//! | [`error`] | Domain error model |
//! | [`github`] | Hosting API client behind the [`github::RepoHost`] trait |
//! | [`rank`] | Relevance-ranked file selection under a byte budget |
//! | [`collect`] | Cached context gathering |
//! | [`schema`] | Analysis payload validation |
//! | [`llm`] | Generative model abstraction |
//! | [`analyzer`] | Single-call analysis with deterministic fallback |
//! | [`store`] | Normalized persistence, replace-on-write |
//! | [`qa`] | Grounded question answering |
//! | [`compare`] | Cross-repository comparison of stored analyses |
//! | [`orchestrate`] | Session lifecycle coordination |
//! | [`server`] | JSON HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyzer;
pub mod cache;
pub mod collect;
pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod github;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod orchestrate;
pub mod qa;
pub mod rank;
pub mod schema;
pub mod server;
pub mod store;
