//! Custom error types for the integration core.
//!
//! This module defines the primary error type, `IntegrationError`, shared by every
//! service in the crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to report failures from the wire protocol up to the lifecycle
//! state machine.
//!
//! ## Error Hierarchy
//!
//! - **`Protocol`**: wraps [`ProtocolError`]. Fatal to the current exchange; the
//!   calling job records the text and is marked failed.
//! - **`SegmentParse`**: wraps [`SegmentParseError`]. Fatal to one message's parse.
//! - **`Validation`**: business validation failures (type incompatibility, missing
//!   required mappings, duplicate qualitative values, unit mismatch without factor).
//! - **`ConfirmationRequired`**: a change to a live analyzer needs an explicit confirm.
//! - **`ConcurrencyConflict`**: a stale version or timestamp. Callers reload and retry.
//! - **`QcProcessing`**: one QC segment could not be resolved or written.
//! - **`IllegalState`**: a lifecycle transition or queue operation was invoked out of
//!   order. Distinct from validation because it signals a caller bug.
//! - **`NotFound`**, **`Config`**, **`Io`**, **`Storage`**: plumbing.
//!
//! By using `#[from]`, `IntegrationError` can be created from the lower-level error
//! types with the `?` operator.

use crate::config::ConfigError;
use crate::protocol::ProtocolError;
use crate::segment::SegmentParseError;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, IntegrationError>;

/// Message returned for every optimistic-locking conflict.
pub const CONFLICT_MESSAGE: &str = "was modified by another user. Please refresh and try again.";

/// Every failure a service in this crate can report.
#[derive(Error, Debug)]
pub enum IntegrationError {
    /// The wire exchange failed.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A message could not be parsed.
    #[error("Malformed message: {0}")]
    SegmentParse(#[from] SegmentParseError),

    /// Input failed business validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The change needs an explicit confirmation.
    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    /// The record moved on since the caller read it.
    #[error("{entity} {CONFLICT_MESSAGE}")]
    ConcurrencyConflict {
        /// Kind of record, e.g. `Mapping`
        entity: &'static str,
        /// Record id
        id: String,
    },

    /// A QC result could not be resolved or staged.
    #[error("QC processing error: {0}")]
    QcProcessing(String),

    /// Operation invoked in the wrong state.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// No record with this id.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record, e.g. `Analyzer`
        entity: &'static str,
        /// Id that was looked up
        id: String,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem or socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backing store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl IntegrationError {
    /// Shorthand for [`IntegrationError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Shorthand for [`IntegrationError::ConcurrencyConflict`].
    pub fn conflict(entity: &'static str, id: impl Into<String>) -> Self {
        Self::ConcurrencyConflict {
            entity,
            id: id.into(),
        }
    }

    /// True for stale-version failures that a caller should resolve by reloading.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}
