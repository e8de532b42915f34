//! Error queue for messages the core could not process.
//!
//! Records are append-only: creating an error never touches an existing record, and
//! acknowledgement and resolution only move a record forward
//! (UNACKNOWLEDGED → ACKNOWLEDGED → RESOLVED, or straight to RESOLVED on a
//! successful reprocess). The queue drives two lifecycle triggers: the first
//! unacknowledged error on an ACTIVE analyzer moves it to ERROR_PENDING, and clearing
//! the last one moves it back.

pub mod reprocess;

pub use reprocess::ErrorReprocessor;

use crate::error::{AppResult, IntegrationError};
use crate::lifecycle::{LifecycleManager, LifecycleTrigger};
use crate::model::{
    AnalyzerError, ErrorFilter, ErrorSeverity, ErrorStatistics, ErrorStatus, ErrorType,
};
use crate::repository::{AnalyzerRepository, ErrorRepository};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Records failures and drives the ERROR_PENDING trigger.
pub struct ErrorQueue {
    errors: Arc<dyn ErrorRepository>,
    analyzers: Arc<dyn AnalyzerRepository>,
    lifecycle: Arc<LifecycleManager>,
}

impl ErrorQueue {
    /// Queue storing records in `errors`.
    pub fn new(
        errors: Arc<dyn ErrorRepository>,
        analyzers: Arc<dyn AnalyzerRepository>,
        lifecycle: Arc<LifecycleManager>,
    ) -> Self {
        Self {
            errors,
            analyzers,
            lifecycle,
        }
    }

    /// Append a new UNACKNOWLEDGED record.
    pub async fn create_error(
        &self,
        analyzer_id: &str,
        error_type: ErrorType,
        severity: ErrorSeverity,
        message: impl Into<String>,
        raw_message: Option<String>,
    ) -> AppResult<AnalyzerError> {
        let error = AnalyzerError::new(analyzer_id, error_type, severity, message, raw_message);
        self.errors.insert(error.clone()).await?;
        warn!(
            error_id = %error.id,
            analyzer_id,
            "{} error recorded ({}): {}",
            error.error_type,
            error.severity,
            error.message
        );

        match self.analyzers.get(analyzer_id).await? {
            Some(analyzer) if LifecycleTrigger::UnacknowledgedErrorCreated.applies_to(analyzer.status) => {
                self.lifecycle
                    .fire(analyzer_id, LifecycleTrigger::UnacknowledgedErrorCreated)
                    .await?;
            }
            Some(_) => {}
            None => warn!(analyzer_id, "Error recorded for unknown analyzer"),
        }
        Ok(error)
    }

    /// Look up one record. Fails with NotFound.
    pub async fn get_error(&self, error_id: &str) -> AppResult<AnalyzerError> {
        self.errors
            .get(error_id)
            .await?
            .ok_or_else(|| IntegrationError::not_found("AnalyzerError", error_id))
    }

    /// Acknowledge an UNACKNOWLEDGED record.
    pub async fn acknowledge_error(&self, error_id: &str, user_id: &str) -> AppResult<AnalyzerError> {
        let mut error = self.get_error(error_id).await?;
        if error.status != ErrorStatus::Unacknowledged {
            return Err(IntegrationError::IllegalState(format!(
                "Error {} cannot be acknowledged: status is {}",
                error.id, error.status
            )));
        }
        error.status = ErrorStatus::Acknowledged;
        error.acknowledged_by = Some(user_id.to_string());
        error.acknowledged_at = Some(Utc::now());
        self.errors.update(error.clone()).await?;
        info!(error_id, user_id, "Error acknowledged");

        self.release_if_clear(&error.analyzer_id).await?;
        Ok(error)
    }

    /// Mark a record RESOLVED after a successful reprocess.
    pub(crate) async fn resolve_error(&self, error_id: &str) -> AppResult<AnalyzerError> {
        let mut error = self.get_error(error_id).await?;
        error.status = ErrorStatus::Resolved;
        error.resolved_at = Some(Utc::now());
        self.errors.update(error.clone()).await?;
        info!(error_id, "Error resolved");

        self.release_if_clear(&error.analyzer_id).await?;
        Ok(error)
    }

    async fn release_if_clear(&self, analyzer_id: &str) -> AppResult<()> {
        if self.errors.count_unacknowledged(analyzer_id).await? > 0 {
            return Ok(());
        }
        if let Some(analyzer) = self.analyzers.get(analyzer_id).await? {
            if LifecycleTrigger::AllErrorsAcknowledged.applies_to(analyzer.status) {
                self.lifecycle
                    .fire(analyzer_id, LifecycleTrigger::AllErrorsAcknowledged)
                    .await?;
            }
        }
        Ok(())
    }

    /// Matching records, newest first.
    pub async fn find_errors(&self, filter: &ErrorFilter) -> AppResult<Vec<AnalyzerError>> {
        let mut errors = self.errors.find(filter).await?;
        errors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(errors)
    }

    /// Counts over the matching records.
    pub async fn statistics(&self, filter: &ErrorFilter) -> AppResult<ErrorStatistics> {
        let errors = self.errors.find(filter).await?;
        Ok(ErrorStatistics::from_errors(&errors))
    }
}
