//! # Member QA
//!
//! Retrieval-augmented question answering over a fixed roster of members
//! and their message corpus.
//!
//! A free-text question is resolved to one member, that member's messages
//! are ranked by semantic similarity, and a language model synthesizes an
//! answer from the top matches, with a heuristic confidence score
//! attached.
//!
//! ## Architecture
//!
//! ```text
//! question ──▶ roster ──▶ store ──▶ retrieve ──▶ generate ──▶ confidence
//!             (resolve)  (cache/    (top-K by    (LLM)        (score)
//!                        snapshot/  cosine sim)
//!                        remote)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mqa snapshot init             # one-time snapshot ingestion
//! mqa ask "When is Layla planning her trip to London?"
//! mqa serve                     # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`roster`] | Entity resolution (question → member) |
//! | [`store`] | Corpus loading: cache, snapshot, remote API |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Per-corpus-version embedding index |
//! | [`retrieve`] | Semantic top-K retrieval |
//! | [`generate`] | Answer synthesis boundary |
//! | [`confidence`] | Heuristic confidence scoring |
//! | [`engine`] | Pipeline orchestration |
//! | [`server`] | HTTP routing layer |
//! | [`snapshot_cmd`] | One-time snapshot ingestion |

pub mod confidence;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod generate;
pub mod index;
pub mod models;
pub mod retrieve;
pub mod roster;
pub mod server;
pub mod snapshot_cmd;
pub mod store;
