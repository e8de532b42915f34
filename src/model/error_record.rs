//! Error-queue records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Category of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// A result had no active mapping.
    Mapping,
    /// A value failed validation.
    Validation,
    /// The instrument stopped answering.
    Timeout,
    /// Framing or handshake failure.
    Protocol,
    /// The instrument could not be reached.
    Connection,
    /// A QC segment could not be resolved or stored.
    QcMappingIncomplete,
    /// No QC service is deployed.
    QcServiceUnavailable,
}

impl ErrorType {
    /// Wire and storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Mapping => "MAPPING",
            ErrorType::Validation => "VALIDATION",
            ErrorType::Timeout => "TIMEOUT",
            ErrorType::Protocol => "PROTOCOL",
            ErrorType::Connection => "CONNECTION",
            ErrorType::QcMappingIncomplete => "QC_MAPPING_INCOMPLETE",
            ErrorType::QcServiceUnavailable => "QC_SERVICE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgently an operator should look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorSeverity {
    /// Blocks the analyzer.
    Critical,
    /// A message was not stored.
    Error,
    /// Stored with a caveat.
    Warning,
}

impl ErrorSeverity {
    /// Wire and storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Critical => "CRITICAL",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Warning => "WARNING",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record is in the operator workflow.
///
/// `UNACKNOWLEDGED -> ACKNOWLEDGED -> RESOLVED`. Reprocessing may resolve a record
/// from either earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorStatus {
    /// Nobody has looked yet.
    Unacknowledged,
    /// An operator has seen it.
    Acknowledged,
    /// Reprocessed successfully.
    Resolved,
}

impl ErrorStatus {
    /// Wire and storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Unacknowledged => "UNACKNOWLEDGED",
            ErrorStatus::Acknowledged => "ACKNOWLEDGED",
            ErrorStatus::Resolved => "RESOLVED",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure recorded against an analyzer, awaiting operator action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerError {
    /// Stable identifier.
    pub id: String,
    /// Analyzer the failure belongs to.
    pub analyzer_id: String,
    /// Failure category.
    pub error_type: ErrorType,
    /// Failure severity.
    pub severity: ErrorSeverity,
    /// Human-readable description.
    pub message: String,
    /// Original message, kept for reprocessing
    pub raw_message: Option<String>,
    /// Workflow state.
    pub status: ErrorStatus,
    /// Operator who acknowledged the record.
    pub acknowledged_by: Option<String>,
    /// When the record was acknowledged.
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// When reprocessing succeeded.
    pub resolved_at: Option<DateTime<Utc>>,
    /// When the failure was recorded.
    pub created_at: DateTime<Utc>,
}

impl AnalyzerError {
    /// A fresh UNACKNOWLEDGED record.
    pub fn new(
        analyzer_id: impl Into<String>,
        error_type: ErrorType,
        severity: ErrorSeverity,
        message: impl Into<String>,
        raw_message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            analyzer_id: analyzer_id.into(),
            error_type,
            severity,
            message: message.into(),
            raw_message,
            status: ErrorStatus::Unacknowledged,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Criteria for listing errors. Empty criteria match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorFilter {
    /// Only this analyzer.
    pub analyzer_id: Option<String>,
    /// Only this category.
    pub error_type: Option<ErrorType>,
    /// Only this severity.
    pub severity: Option<ErrorSeverity>,
    /// Only this workflow state.
    pub status: Option<ErrorStatus>,
    /// Created at or after.
    pub created_after: Option<DateTime<Utc>>,
    /// Created at or before.
    pub created_before: Option<DateTime<Utc>>,
}

impl ErrorFilter {
    /// Everything for one analyzer.
    pub fn for_analyzer(analyzer_id: impl Into<String>) -> Self {
        Self {
            analyzer_id: Some(analyzer_id.into()),
            ..Self::default()
        }
    }

    /// Narrow to one workflow state.
    #[must_use]
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// True when `error` satisfies every set criterion.
    pub fn matches(&self, error: &AnalyzerError) -> bool {
        self.analyzer_id
            .as_ref()
            .map_or(true, |id| *id == error.analyzer_id)
            && self.error_type.map_or(true, |t| t == error.error_type)
            && self.severity.map_or(true, |s| s == error.severity)
            && self.status.map_or(true, |s| s == error.status)
            && self.created_after.map_or(true, |t| error.created_at >= t)
            && self.created_before.map_or(true, |t| error.created_at <= t)
    }
}

/// Counts over the whole queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    /// Records counted.
    pub total: usize,
    /// Count per workflow state.
    pub by_status: BTreeMap<ErrorStatus, usize>,
    /// Count per category.
    pub by_type: BTreeMap<ErrorType, usize>,
    /// Count per severity.
    pub by_severity: BTreeMap<ErrorSeverity, usize>,
}

impl ErrorStatistics {
    /// Tally `errors`.
    pub fn from_errors<'a>(errors: impl IntoIterator<Item = &'a AnalyzerError>) -> Self {
        let mut stats = Self::default();
        for error in errors {
            stats.total += 1;
            *stats.by_status.entry(error.status).or_default() += 1;
            *stats.by_type.entry(error.error_type).or_default() += 1;
            *stats.by_severity.entry(error.severity).or_default() += 1;
        }
        stats
    }

    /// Records nobody has looked at yet.
    pub fn unacknowledged(&self) -> usize {
        self.by_status
            .get(&ErrorStatus::Unacknowledged)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches() {
        let error = AnalyzerError::new("a-1", ErrorType::Mapping, ErrorSeverity::Error, "x", None);
        assert!(ErrorFilter::default().matches(&error));
        assert!(ErrorFilter::for_analyzer("a-1").matches(&error));
        assert!(!ErrorFilter::for_analyzer("a-2").matches(&error));
        assert!(!ErrorFilter::for_analyzer("a-1")
            .with_status(ErrorStatus::Resolved)
            .matches(&error));
    }

    #[test]
    fn test_statistics_counts() {
        let mut acked = AnalyzerError::new("a", ErrorType::Protocol, ErrorSeverity::Critical, "p", None);
        acked.status = ErrorStatus::Acknowledged;
        let errors = vec![
            AnalyzerError::new("a", ErrorType::Mapping, ErrorSeverity::Error, "m", None),
            AnalyzerError::new("b", ErrorType::Mapping, ErrorSeverity::Warning, "m", None),
            acked,
        ];
        let stats = ErrorStatistics::from_errors(&errors);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.unacknowledged(), 2);
        assert_eq!(stats.by_type.get(&ErrorType::Mapping), Some(&2));
        assert_eq!(stats.by_severity.get(&ErrorSeverity::Critical), Some(&1));
    }
}
