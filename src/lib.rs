//! # groundwork
//!
//! Citation-grounded retrieval and grading over a plain-text corpus.
//!
//! Two pipelines share one retrieval core. The search side chunks and
//! embeds the corpus into SQLite and ranks chunks against a query. The
//! grading side maps each free-text student citation to one corpus file,
//! groups responses by that file, and has a language model grade them in
//! batches with the file's text as grounding.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌─────────┐   ┌──────────┐   ┌───────────────┐
//! │ Corpus  │──▶│ Chunker │──▶│ Embedder │──▶│ chunk_vectors │──▶ rank ──▶ answer
//! │ catalog │   └─────────┘   └──────────┘   └───────────────┘
//! └────┬────┘
//!      │      ┌──────────┐   ┌──────────┐   ┌────────┐
//!      └─────▶│ Resolver │──▶│ Grouping │──▶│ Judge  │──▶ dataset write-back
//!             └──────────┘   └──────────┘   └────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`corpus`] | Corpus catalog |
//! | [`chunk`] | Paragraph chunker |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vectors`] | Persisted vector table |
//! | [`rank`] | Cosine top-K ranking |
//! | [`llm`] | Completion service client |
//! | [`resolver`] | Citation resolution and source cache |
//! | [`grouping`] | Group responses by citation, batch groups |
//! | [`judge`] | Grounded grading and answer generation |
//! | [`dataset`] | Response dataset parsing and write-back |
//! | [`context`] | Per-run shared state |
//! | [`ingest`], [`search`], [`cite`], [`grade`], [`export`] | CLI commands |
//! | [`db`], [`migrate`] | Database connection and schema |

pub mod chunk;
pub mod cite;
pub mod config;
pub mod context;
pub mod corpus;
pub mod dataset;
pub mod db;
pub mod embedding;
pub mod export;
pub mod grade;
pub mod grouping;
pub mod ingest;
pub mod judge;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod rank;
pub mod resolver;
pub mod search;
pub mod vectors;
