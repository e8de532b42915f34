//! Inbound pipeline for one raw message.
//!
//! ```text
//! raw ──► parse_message ──► patient results ─┐
//!                      └──► QC segments ─────┴──► one ResultTransaction ──► commit
//!          │ on failure
//!          └──────────────────────────────────────► error queue
//! ```
//!
//! A message whose results are not all covered by active mappings is queued whole
//! and nothing is written, so a later reprocess can replay it without duplicates.
//! QC extraction failures are local to their segment. A sink failure rolls back
//! the whole message.

use crate::error::AppResult;
use crate::error_queue::ErrorQueue;
use crate::mapping::MappingHydrator;
use crate::model::{DomainKind, ErrorSeverity, ErrorType, FieldMapping, PatientResult, QcSegment};
use crate::qc::{QcExtractor, QcProcessor};
use crate::repository::{Repositories, ResultStore, ResultTransaction};
use crate::segment::{parse_message, ParsedMessage};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to one inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Whether anything was written
    pub committed: bool,
    /// Patient results written
    pub patient_results: usize,
    /// QC results written
    pub qc_results: usize,
    /// Test codes without an active TEST or RESULT mapping
    pub unmapped_codes: Vec<String>,
    /// Ids of error records created while handling the message
    pub error_ids: Vec<String>,
}

/// Runs the inbound pipeline for one analyzer message at a time.
pub struct MessageIngestor {
    repos: Repositories,
    results: Arc<dyn ResultStore>,
    hydrator: MappingHydrator,
    extractor: QcExtractor,
    processor: Arc<QcProcessor>,
    errors: Arc<ErrorQueue>,
}

impl MessageIngestor {
    /// Ingestor writing results to `results` and failures to `errors`.
    pub fn new(
        repos: Repositories,
        results: Arc<dyn ResultStore>,
        processor: Arc<QcProcessor>,
        errors: Arc<ErrorQueue>,
    ) -> Self {
        Self {
            hydrator: MappingHydrator::new(Arc::clone(&repos.fields)),
            extractor: QcExtractor::new(repos.clone()),
            repos,
            results,
            processor,
            errors,
        }
    }

    /// Read a message file and ingest its contents.
    pub async fn ingest_file(&self, analyzer_id: &str, path: impl AsRef<Path>) -> AppResult<IngestOutcome> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        debug!(analyzer_id, path = %path.display(), bytes = raw.len(), "Read message file");
        self.ingest(analyzer_id, &raw).await
    }

    /// Parse, map and store one raw message.
    ///
    /// Parse failures and unmapped test codes are queued as errors and nothing is
    /// written. Errors are reported through the outcome; only storage failures are
    /// returned.
    pub async fn ingest(&self, analyzer_id: &str, raw: &str) -> AppResult<IngestOutcome> {
        let mut outcome = IngestOutcome::default();

        let parsed = match parse_message(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                let record = self
                    .errors
                    .create_error(
                        analyzer_id,
                        ErrorType::Mapping,
                        ErrorSeverity::Error,
                        e.to_string(),
                        Some(raw.to_string()),
                    )
                    .await?;
                outcome.error_ids.push(record.id);
                return Ok(outcome);
            }
        };

        let (patients, unmapped) = self.resolve_patient_results(analyzer_id, &parsed).await?;
        if !unmapped.is_empty() {
            let record = self
                .errors
                .create_error(
                    analyzer_id,
                    ErrorType::Mapping,
                    ErrorSeverity::Error,
                    format!("No active mapping for test codes: {}", unmapped.join(", ")),
                    Some(raw.to_string()),
                )
                .await?;
            outcome.error_ids.push(record.id);
            outcome.unmapped_codes = unmapped;
            return Ok(outcome);
        }

        let mut tx = self.results.begin().await?;
        outcome.patient_results = patients.len();
        for result in patients {
            if let Err(e) = tx.add_patient_result(result).await {
                tx.rollback().await?;
                return Err(e);
            }
        }

        for segment in &parsed.qc_segments {
            let qc = match self.extractor.extract_qc_result(segment, analyzer_id).await {
                Ok(qc) => qc,
                Err(e) => {
                    warn!(
                        analyzer_id,
                        test_code = %segment.test_code,
                        "QC segment skipped: {}", e
                    );
                    let recorded = self
                        .processor
                        .record_failure(analyzer_id, &e.to_string(), Some(raw))
                        .await;
                    outcome.error_ids.extend(recorded);
                    continue;
                }
            };
            match self
                .processor
                .process_qc_result(tx.as_mut(), &qc, analyzer_id, Some(raw))
                .await
            {
                Ok(()) => outcome.qc_results += 1,
                Err(failure) => {
                    outcome.error_ids.extend(failure.error_id.clone());
                    if !self.processor.has_sink() {
                        warn!(analyzer_id, "QC result not stored: {}", failure);
                        continue;
                    }
                    error!(analyzer_id, "QC write failed, rolling back message: {}", failure);
                    tx.rollback().await?;
                    outcome.patient_results = 0;
                    outcome.qc_results = 0;
                    return Ok(outcome);
                }
            }
        }

        tx.commit().await?;
        outcome.committed = true;
        info!(
            analyzer_id,
            "Ingested message: {} patient results, {} QC results",
            outcome.patient_results,
            outcome.qc_results
        );
        Ok(outcome)
    }

    /// Replay a queued message.
    ///
    /// Patient results commit on their own. QC segments then run one at a time, and
    /// their failures are only logged. Returns false when the patient half could not
    /// be processed.
    pub(crate) async fn reprocess(&self, analyzer_id: &str, raw: &str) -> AppResult<bool> {
        let parsed = match parse_message(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(analyzer_id, "Cannot reprocess message: {}", e);
                return Ok(false);
            }
        };

        let (patients, unmapped) = self.resolve_patient_results(analyzer_id, &parsed).await?;
        if !unmapped.is_empty() {
            error!(
                analyzer_id,
                "Cannot reprocess message: no active mapping for test codes: {}",
                unmapped.join(", ")
            );
            return Ok(false);
        }

        let mut tx = self.results.begin().await?;
        for result in patients {
            tx.add_patient_result(result).await?;
        }
        tx.commit().await?;

        for segment in &parsed.qc_segments {
            if let Err(e) = self.reprocess_qc(analyzer_id, segment, raw).await {
                error!(
                    analyzer_id,
                    "Failed to process QC result during reprocessing, test code {}, control lot {}: {}",
                    segment.test_code,
                    segment.control_lot_number,
                    e
                );
            }
        }
        Ok(true)
    }

    async fn reprocess_qc(&self, analyzer_id: &str, segment: &QcSegment, raw: &str) -> AppResult<()> {
        let qc = self.extractor.extract_qc_result(segment, analyzer_id).await?;
        let mut tx = self.results.begin().await?;
        match self
            .processor
            .process_qc_result(tx.as_mut(), &qc, analyzer_id, Some(raw))
            .await
        {
            Ok(()) => tx.commit().await,
            Err(failure) => {
                tx.rollback().await?;
                Err(failure.into())
            }
        }
    }

    /// Map each inbound result through the active mapping on the field named after its
    /// test code. Returns the resolved results and the codes that had no mapping.
    async fn resolve_patient_results(
        &self,
        analyzer_id: &str,
        parsed: &ParsedMessage,
    ) -> AppResult<(Vec<PatientResult>, Vec<String>)> {
        let active: Vec<FieldMapping> = self
            .repos
            .mappings
            .find_by_analyzer(analyzer_id)
            .await?
            .into_iter()
            .filter(|m| m.active && matches!(m.domain_kind, DomainKind::Test | DomainKind::Result))
            .collect();

        let mut by_name: HashMap<String, FieldMapping> = HashMap::new();
        for view in self.hydrator.hydrate(active).await? {
            if let Some(field) = view.field {
                by_name.entry(field.name).or_insert(view.mapping);
            }
        }

        let mut resolved = Vec::with_capacity(parsed.results.len());
        let mut unmapped = Vec::new();
        for inbound in &parsed.results {
            match by_name.get(&inbound.test_code) {
                Some(mapping) => resolved.push(PatientResult {
                    analyzer_id: analyzer_id.to_string(),
                    sample_id: inbound.sample_id.clone(),
                    test_id: mapping.domain_field_id.clone(),
                    field_name: inbound.test_code.clone(),
                    raw_value: inbound.value.clone(),
                    unit: inbound.unit.clone(),
                    mapping_id: mapping.id.clone(),
                }),
                None => {
                    if !unmapped.contains(&inbound.test_code) {
                        unmapped.push(inbound.test_code.clone());
                    }
                }
            }
        }
        Ok((resolved, unmapped))
    }
}
