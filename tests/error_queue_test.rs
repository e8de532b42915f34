//! Error queue records, acknowledgement and reprocessing.

mod common;

use analyzer_core::error::IntegrationError;
use analyzer_core::model::{
    AnalyzerStatus, DomainKind, ErrorFilter, ErrorSeverity, ErrorStatus, ErrorType, FieldKind,
    MappingRequest, MappingType,
};
use common::Harness;

const MESSAGE_WITH_POTASSIUM: &str = concat!(
    "H|\\^&|||ACME\r",
    "O|1|SAMPLE-7\r",
    "R|1|^^^GLU|98|mg/dL\r",
    "R|2|^^^NA|140|mmol/L\r",
    "R|3|^^^K|4.1|mmol/L\r",
    "Q|1|GLU^LOT123^H|300|mg/dL|20250115093000\r",
    "L|1|N\r",
);

async fn active_harness() -> Harness {
    let h = Harness::new();
    h.analyzer("a-1", AnalyzerStatus::Setup).await;
    h.configure_chemistry("a-1").await;
    h
}

#[tokio::test]
async fn test_reprocess_after_mapping_is_added() {
    let h = active_harness().await;

    let outcome = h.ingestor.ingest("a-1", MESSAGE_WITH_POTASSIUM).await.unwrap();
    assert!(!outcome.committed);
    let error_id = outcome.error_ids[0].clone();
    assert_eq!(h.status("a-1").await, AnalyzerStatus::ErrorPending);

    // Still unmapped: nothing changes.
    assert!(!h.reprocessor.reprocess_error(&error_id).await.unwrap());
    assert_eq!(
        h.errors.get_error(&error_id).await.unwrap().status,
        ErrorStatus::Unacknowledged
    );
    assert!(h.results.patient_results().is_empty());

    let k = h.field("a-1", "K", FieldKind::Numeric).await;
    h.map_active(MappingRequest::new(
        &k.id,
        "result-potassium",
        DomainKind::Result,
        MappingType::ResultLevel,
    ))
    .await;

    assert!(h.reprocessor.reprocess_error(&error_id).await.unwrap());

    let record = h.errors.get_error(&error_id).await.unwrap();
    assert_eq!(record.status, ErrorStatus::Resolved);
    assert!(record.resolved_at.is_some());
    assert_eq!(h.results.patient_results().len(), 3);
    assert_eq!(h.results.qc_results().len(), 1);
    assert_eq!(h.status("a-1").await, AnalyzerStatus::Active);

    // A resolved record is not replayed, so nothing is written twice.
    assert!(!h.reprocessor.reprocess_error(&error_id).await.unwrap());
    assert_eq!(h.results.patient_results().len(), 3);
    assert_eq!(h.results.qc_results().len(), 1);
    assert_eq!(
        h.errors.get_error(&error_id).await.unwrap().resolved_at,
        record.resolved_at
    );
}

#[tokio::test]
async fn test_reprocess_without_replayable_message() {
    let h = active_harness().await;

    let no_raw = h
        .errors
        .create_error("a-1", ErrorType::Timeout, ErrorSeverity::Warning, "Read timed out", None)
        .await
        .unwrap();
    assert!(!h.reprocessor.reprocess_error(&no_raw.id).await.unwrap());

    let blank = h
        .errors
        .create_error(
            "a-1",
            ErrorType::Mapping,
            ErrorSeverity::Error,
            "Empty",
            Some("   ".to_string()),
        )
        .await
        .unwrap();
    assert!(!h.reprocessor.reprocess_error(&blank.id).await.unwrap());

    let err = h.reprocessor.reprocess_error("missing").await.unwrap_err();
    assert!(matches!(err, IntegrationError::NotFound { .. }));
}

#[tokio::test]
async fn test_reprocess_needs_active_mappings() {
    let h = Harness::new();
    h.analyzer("a-1", AnalyzerStatus::Inactive).await;

    let record = h
        .errors
        .create_error(
            "a-1",
            ErrorType::Mapping,
            ErrorSeverity::Error,
            "No mappings",
            Some(common::PATIENT_AND_QC_MESSAGE.to_string()),
        )
        .await
        .unwrap();
    assert!(!h.reprocessor.reprocess_error(&record.id).await.unwrap());
    assert!(h.results.patient_results().is_empty());
}

#[tokio::test]
async fn test_acknowledge_once() {
    let h = active_harness().await;
    let record = h
        .errors
        .create_error("a-1", ErrorType::Protocol, ErrorSeverity::Critical, "NAK storm", None)
        .await
        .unwrap();

    let acked = h.errors.acknowledge_error(&record.id, "tech-1").await.unwrap();
    assert_eq!(acked.status, ErrorStatus::Acknowledged);
    assert_eq!(acked.acknowledged_by.as_deref(), Some("tech-1"));
    assert!(acked.acknowledged_at.is_some());

    let err = h
        .errors
        .acknowledge_error(&record.id, "tech-2")
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrationError::IllegalState(_)));
    assert_eq!(
        h.errors.get_error(&record.id).await.unwrap().acknowledged_by.as_deref(),
        Some("tech-1")
    );
}

#[tokio::test]
async fn test_analyzer_stays_pending_until_last_error_cleared() {
    let h = active_harness().await;
    let first = h
        .errors
        .create_error("a-1", ErrorType::Protocol, ErrorSeverity::Error, "one", None)
        .await
        .unwrap();
    let second = h
        .errors
        .create_error("a-1", ErrorType::Connection, ErrorSeverity::Error, "two", None)
        .await
        .unwrap();
    assert_eq!(h.status("a-1").await, AnalyzerStatus::ErrorPending);

    h.errors.acknowledge_error(&first.id, "tech-1").await.unwrap();
    assert_eq!(h.status("a-1").await, AnalyzerStatus::ErrorPending);

    h.errors.acknowledge_error(&second.id, "tech-1").await.unwrap();
    assert_eq!(h.status("a-1").await, AnalyzerStatus::Active);
}

#[tokio::test]
async fn test_filters_and_statistics() {
    let h = active_harness().await;
    h.analyzer("a-2", AnalyzerStatus::Inactive).await;

    let mapping = h
        .errors
        .create_error("a-1", ErrorType::Mapping, ErrorSeverity::Error, "m", None)
        .await
        .unwrap();
    h.errors
        .create_error("a-1", ErrorType::Protocol, ErrorSeverity::Critical, "p", None)
        .await
        .unwrap();
    h.errors
        .create_error("a-2", ErrorType::Mapping, ErrorSeverity::Warning, "other", None)
        .await
        .unwrap();
    h.errors.acknowledge_error(&mapping.id, "tech-1").await.unwrap();

    let a1 = h
        .errors
        .find_errors(&ErrorFilter::for_analyzer("a-1"))
        .await
        .unwrap();
    assert_eq!(a1.len(), 2);
    assert!(a1[0].created_at >= a1[1].created_at);

    let open = h
        .errors
        .find_errors(&ErrorFilter::for_analyzer("a-1").with_status(ErrorStatus::Unacknowledged))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].error_type, ErrorType::Protocol);

    let stats = h.errors.statistics(&ErrorFilter::default()).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.unacknowledged(), 2);
    assert_eq!(stats.by_type.get(&ErrorType::Mapping), Some(&2));
    assert_eq!(stats.by_severity.get(&ErrorSeverity::Critical), Some(&1));

    // An INACTIVE analyzer is not moved by its errors.
    assert_eq!(h.status("a-2").await, AnalyzerStatus::Inactive);
}

#[tokio::test]
async fn test_error_for_unknown_analyzer_is_still_recorded() {
    let h = Harness::new();
    let record = h
        .errors
        .create_error("ghost", ErrorType::Connection, ErrorSeverity::Error, "refused", None)
        .await
        .unwrap();
    assert_eq!(h.errors.get_error(&record.id).await.unwrap().analyzer_id, "ghost");
}
