//! Shared wiring for the integration tests.

#![allow(dead_code)]

use analyzer_core::error_queue::{ErrorQueue, ErrorReprocessor};
use analyzer_core::lifecycle::LifecycleManager;
use analyzer_core::mapping::MappingService;
use analyzer_core::model::{
    Analyzer, AnalyzerField, AnalyzerStatus, ConcurrencyToken, DomainKind, FieldKind, FieldMapping, MappingRequest,
    MappingType,
};
use analyzer_core::qc::{QcProcessor, QcResultSink, TransactionalQcSink};
use analyzer_core::repository::{MemoryResultStore, Repositories};
use analyzer_core::MessageIngestor;
use std::sync::Arc;

pub const QC_MESSAGE: &str =
    "H|\\^&|||ACME^ModelX^1.0|||||||LIS2-A2\rQ|1|GLU^LOT123^N|98|mg/dL|20250115093000|\r";

pub const PATIENT_AND_QC_MESSAGE: &str = concat!(
    "H|\\^&|||ACME^ModelX^1.0|||||||LIS2-A2\r",
    "O|1|SAMPLE-1\r",
    "R|1|^^^GLU|98|mg/dL\r",
    "R|2|^^^NA|140|mmol/L\r",
    "Q|1|GLU^LOT123^N|98|mg/dL|20250115093000|\r",
    "L|1|N\r",
);

/// Every service wired onto one in-memory store.
pub struct Harness {
    pub repos: Repositories,
    pub lifecycle: Arc<LifecycleManager>,
    pub mappings: Arc<MappingService>,
    pub errors: Arc<ErrorQueue>,
    pub results: Arc<MemoryResultStore>,
    pub ingestor: Arc<MessageIngestor>,
    pub reprocessor: ErrorReprocessor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_sink(Some(Arc::new(TransactionalQcSink)))
    }

    pub fn with_sink(sink: Option<Arc<dyn QcResultSink>>) -> Self {
        let repos = Repositories::in_memory();
        let lifecycle = Arc::new(LifecycleManager::new(repos.analyzers.clone(), 32));
        let mappings = Arc::new(MappingService::new(repos.clone(), lifecycle.clone()));
        let errors = Arc::new(ErrorQueue::new(
            repos.errors.clone(),
            repos.analyzers.clone(),
            lifecycle.clone(),
        ));
        let results = Arc::new(MemoryResultStore::new());
        let processor = Arc::new(QcProcessor::new(sink, errors.clone()));
        let ingestor = Arc::new(MessageIngestor::new(
            repos.clone(),
            results.clone(),
            processor,
            errors.clone(),
        ));
        let reprocessor =
            ErrorReprocessor::new(errors.clone(), repos.mappings.clone(), ingestor.clone());

        Self {
            repos,
            lifecycle,
            mappings,
            errors,
            results,
            ingestor,
            reprocessor,
        }
    }

    pub async fn analyzer(&self, id: &str, status: AnalyzerStatus) -> Analyzer {
        let analyzer = Analyzer::new(id, format!("{id} chemistry")).with_status(status);
        self.repos
            .analyzers
            .save(analyzer.clone())
            .await
            .expect("save analyzer");
        analyzer
    }

    pub async fn field(&self, analyzer_id: &str, name: &str, kind: FieldKind) -> AnalyzerField {
        let unit = kind.requires_unit().then(|| "mg/dL".to_string());
        let field = AnalyzerField::new(analyzer_id, name, format!("^^^{name}"), kind, unit);
        self.repos
            .fields
            .save(field.clone())
            .await
            .expect("save field");
        field
    }

    pub async fn status(&self, analyzer_id: &str) -> AnalyzerStatus {
        self.lifecycle.status(analyzer_id).await.expect("status")
    }

    /// Fields and active mappings covering every required role, plus the NA result
    /// and the LOT123 control lot used by the sample messages.
    pub async fn configure_chemistry(&self, analyzer_id: &str) -> Vec<FieldMapping> {
        let sample = self.field(analyzer_id, "SAMPLE_ID", FieldKind::Text).await;
        let glu = self.field(analyzer_id, "GLU", FieldKind::Numeric).await;
        let na = self.field(analyzer_id, "NA", FieldKind::Numeric).await;
        let lot = self.field(analyzer_id, "LOT123", FieldKind::ControlTest).await;

        let requests = vec![
            MappingRequest::new(&sample.id, "sample-accession", DomainKind::Sample, MappingType::Metadata)
                .required(),
            MappingRequest::new(&glu.id, "test-glucose", DomainKind::Test, MappingType::TestLevel)
                .required(),
            MappingRequest::new(&na.id, "result-sodium", DomainKind::Result, MappingType::ResultLevel)
                .required(),
            MappingRequest::new(&lot.id, "lot-123", DomainKind::Qc, MappingType::Metadata),
        ];

        let mut ids = Vec::new();
        for request in requests {
            let draft = self
                .mappings
                .create_mapping(request)
                .await
                .expect("create mapping");
            ids.push(draft.id);
        }
        self.mappings
            .bulk_activate_mappings(analyzer_id, &ids, true)
            .await
            .expect("activate mappings")
    }

    /// Create a draft and activate it, confirming if the analyzer is live.
    pub async fn map_active(&self, request: MappingRequest) -> FieldMapping {
        let draft = self
            .mappings
            .create_mapping(request)
            .await
            .expect("create mapping");
        self.mappings
            .activate_mapping(&draft.id, true, Some(ConcurrencyToken::from(&draft)))
            .await
            .expect("activate mapping")
    }
}
