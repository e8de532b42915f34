//! Hand extracted QC results to the sink.

use super::QcResultSink;
use crate::error::IntegrationError;
use crate::error_queue::ErrorQueue;
use crate::model::{ErrorSeverity, ErrorType, QcResult};
use crate::repository::ResultTransaction;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// A QC result that could not be staged.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct QcFailure {
    /// Always `IntegrationError::QcProcessing`.
    pub error: IntegrationError,
    /// Queue record written for the failure, if recording succeeded.
    pub error_id: Option<String>,
}

impl From<QcFailure> for IntegrationError {
    fn from(failure: QcFailure) -> Self {
        failure.error
    }
}

/// Stages QC results on the caller's transaction and queues a
/// QC_MAPPING_INCOMPLETE error for every result it cannot stage.
pub struct QcProcessor {
    sink: Option<Arc<dyn QcResultSink>>,
    errors: Arc<ErrorQueue>,
}

impl QcProcessor {
    /// `sink` is `None` when no QC service is deployed; every result then fails
    /// through the error queue.
    pub fn new(sink: Option<Arc<dyn QcResultSink>>, errors: Arc<ErrorQueue>) -> Self {
        Self { sink, errors }
    }

    /// Whether a QC service is deployed.
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Stage `result` on `tx`.
    ///
    /// Failures are recorded as QC_MAPPING_INCOMPLETE errors and returned with the
    /// id of that record. The caller decides whether to roll back.
    pub async fn process_qc_result(
        &self,
        tx: &mut dyn ResultTransaction,
        result: &QcResult,
        analyzer_id: &str,
        raw_message: Option<&str>,
    ) -> Result<(), QcFailure> {
        let Some(sink) = &self.sink else {
            let message = format!(
                "QC result service not available for analyzer {analyzer_id}. QC results cannot be stored."
            );
            return Err(self.fail(analyzer_id, message, raw_message).await);
        };

        if let Err(e) = sink.create_qc_result(tx, result).await {
            let message = format!(
                "Failed to create QC result for analyzer {}, test {}, control lot {}: {}",
                analyzer_id, result.test_id, result.control_lot_id, e
            );
            return Err(self.fail(analyzer_id, message, raw_message).await);
        }
        Ok(())
    }

    async fn fail(&self, analyzer_id: &str, message: String, raw_message: Option<&str>) -> QcFailure {
        let error_id = self.record_failure(analyzer_id, &message, raw_message).await;
        QcFailure {
            error: IntegrationError::QcProcessing(message),
            error_id,
        }
    }

    /// Record a QC failure and return the queue id. A failure to record is only logged.
    pub(crate) async fn record_failure(
        &self,
        analyzer_id: &str,
        message: &str,
        raw_message: Option<&str>,
    ) -> Option<String> {
        match self
            .errors
            .create_error(
                analyzer_id,
                ErrorType::QcMappingIncomplete,
                ErrorSeverity::Error,
                message,
                raw_message.map(str::to_string),
            )
            .await
        {
            Ok(record) => Some(record.id),
            Err(e) => {
                error!(analyzer_id, "Failed to record QC error: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use crate::lifecycle::LifecycleManager;
    use crate::model::{ControlLevel, ErrorFilter};
    use crate::qc::TransactionalQcSink;
    use crate::repository::{MemoryResultStore, MemoryStore, ResultStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;

    struct FailingSink;

    #[async_trait]
    impl QcResultSink for FailingSink {
        async fn create_qc_result(&self, _tx: &mut dyn ResultTransaction, _result: &QcResult) -> AppResult<()> {
            Err(IntegrationError::Storage(anyhow::anyhow!("QC store offline")))
        }
    }

    fn result() -> QcResult {
        QcResult {
            analyzer_id: "a-1".into(),
            test_id: "glucose".into(),
            control_lot_id: "lot-1".into(),
            control_level: ControlLevel::High,
            result_value: Decimal::from(250),
            unit: "mg/dL".into(),
            timestamp: Utc::now(),
        }
    }

    fn queue() -> Arc<ErrorQueue> {
        let store = Arc::new(MemoryStore::new());
        let lifecycle = Arc::new(LifecycleManager::new(store.clone(), 8));
        Arc::new(ErrorQueue::new(store.clone(), store, lifecycle))
    }

    #[tokio::test]
    async fn test_stages_on_transaction() {
        let results = MemoryResultStore::new();
        let processor = QcProcessor::new(Some(Arc::new(TransactionalQcSink)), queue());
        let mut tx = results.begin().await.unwrap();
        processor
            .process_qc_result(tx.as_mut(), &result(), "a-1", None)
            .await
            .unwrap();
        assert!(results.qc_results().is_empty());
        tx.commit().await.unwrap();
        assert_eq!(results.qc_results().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_sink_records_error() {
        let errors = queue();
        let processor = QcProcessor::new(None, Arc::clone(&errors));
        let results = MemoryResultStore::new();
        let mut tx = results.begin().await.unwrap();

        let err = processor
            .process_qc_result(tx.as_mut(), &result(), "a-1", Some("Q|1|..."))
            .await
            .unwrap_err();
        assert!(matches!(err.error, IntegrationError::QcProcessing(_)));

        let recorded = errors.find_errors(&ErrorFilter::for_analyzer("a-1")).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(err.error_id.as_deref(), Some(recorded[0].id.as_str()));
        assert_eq!(recorded[0].error_type, ErrorType::QcMappingIncomplete);
        assert_eq!(recorded[0].severity, ErrorSeverity::Error);
        assert_eq!(recorded[0].raw_message.as_deref(), Some("Q|1|..."));
    }

    #[tokio::test]
    async fn test_sink_failure_records_error() {
        let errors = queue();
        let processor = QcProcessor::new(Some(Arc::new(FailingSink)), Arc::clone(&errors));
        let results = MemoryResultStore::new();
        let mut tx = results.begin().await.unwrap();

        let err = processor
            .process_qc_result(tx.as_mut(), &result(), "a-1", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("QC store offline"));
        let id = err.error_id.expect("recorded");
        assert_eq!(errors.get_error(&id).await.unwrap().error_type, ErrorType::QcMappingIncomplete);
        let stats = errors.statistics(&ErrorFilter::default()).await.unwrap();
        assert_eq!(stats.by_type.get(&ErrorType::QcMappingIncomplete), Some(&1));
    }
}
