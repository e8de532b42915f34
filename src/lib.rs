//! Core library for laboratory analyzer integration.
//!
//! The crate covers the path from an instrument's wire bytes to stored results:
//!
//! - [`protocol`]: ASTM E1381 framing and the client side of the query exchange
//! - [`segment`]: pure parsing of LIS2-A2 messages into results and QC segments
//! - [`mapping`]: field mappings with optimistic concurrency, activation checks,
//!   copy between analyzers and dry-run previews
//! - [`qc`]: extraction of QC results and their transactional persistence
//! - [`ingest`]: the per-message pipeline tying parsing, mapping and persistence
//! - [`error_queue`]: recorded ingestion failures and their reprocessing
//! - [`lifecycle`]: the analyzer status machine and the inactivity sweep
//! - [`query`]: background query jobs against TCP instruments
//! - [`rules`]: custom field types and validation rules
//!
//! Storage sits behind the async traits in [`repository`], with in-memory
//! implementations used by the CLI and the tests.

pub mod config;
pub mod error;
pub mod error_queue;
pub mod ingest;
pub mod lifecycle;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod protocol;
pub mod qc;
pub mod query;
pub mod repository;
pub mod rules;
pub mod segment;

pub use config::AnalyzerConfig;
pub use error::{AppResult, IntegrationError};
pub use ingest::{IngestOutcome, MessageIngestor};
