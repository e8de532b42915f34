//! Active-query job runner.
//!
//! `start_query` validates the analyzer, registers a job and hands the exchange to a
//! tokio task. The task is the only writer of its job while it runs and checks for
//! cancellation between protocol phases. A stalled read is bounded by the
//! configured read timeout.

use super::address::is_blocked_host;
use super::connector::Connector;
use super::job::{JobKey, JobRegistry, JobState, QueryJob};
use crate::config::ProtocolConfig;
use crate::error::{AppResult, IntegrationError};
use crate::lifecycle::{LifecycleManager, LifecycleTrigger};
use crate::model::{Analyzer, AnalyzerField, FieldKind, TransportKind};
use crate::protocol::{AstmClient, HeaderRecord};
use crate::repository::Repositories;
use crate::segment::{parse_field_records, DiscoveredField};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Job record plus, once completed, the analyzer's stored fields.
#[derive(Debug, Clone, Serialize)]
pub struct QueryStatus {
    /// The job record.
    #[serde(flatten)]
    pub job: QueryJob,
    /// Fields stored for the analyzer, empty until the job completes.
    pub fields: Vec<AnalyzerField>,
}

fn preview(record: &str) -> String {
    if record.chars().count() > 50 {
        let head: String = record.chars().take(50).collect();
        format!("{head}...")
    } else {
        record.to_string()
    }
}

/// Runs active field queries as background jobs and tests connectivity.
///
/// Each job talks to the instrument on its own task. Pollers read progress from the
/// [`JobRegistry`]; cancellation is checked between protocol phases.
pub struct QueryService {
    repos: Repositories,
    lifecycle: Arc<LifecycleManager>,
    connector: Arc<dyn Connector>,
    config: ProtocolConfig,
    jobs: JobRegistry,
}

impl QueryService {
    /// Service opening streams through `connector`.
    pub fn new(
        repos: Repositories,
        lifecycle: Arc<LifecycleManager>,
        connector: Arc<dyn Connector>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            repos,
            lifecycle,
            connector,
            config,
            jobs: JobRegistry::new(),
        }
    }

    /// The shared job registry.
    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    async fn load_analyzer(&self, analyzer_id: &str) -> AppResult<Analyzer> {
        self.repos
            .analyzers
            .get(analyzer_id)
            .await?
            .ok_or_else(|| IntegrationError::not_found("Analyzer", analyzer_id))
    }

    /// Register a query job and run it in the background. Returns the job id.
    pub async fn start_query(self: &Arc<Self>, analyzer_id: &str) -> AppResult<String> {
        if analyzer_id.trim().is_empty() {
            return Err(IntegrationError::Validation("Analyzer ID required".to_string()));
        }
        let analyzer = self.load_analyzer(analyzer_id).await?;
        match analyzer.transport {
            TransportKind::File => {
                return Err(IntegrationError::Validation(
                    "Analyzer uses a push-only transport (file import) and cannot be queried"
                        .to_string(),
                ))
            }
            TransportKind::Serial => {
                return Err(IntegrationError::Validation(
                    "Analyzer uses a push-only transport (RS-232 serial) and cannot be queried"
                        .to_string(),
                ))
            }
            TransportKind::Tcp => {}
        }
        if analyzer.address().is_none() {
            return Err(IntegrationError::Validation(
                "Analyzer has no TCP/IP connection details configured".to_string(),
            ));
        }

        let key = JobKey::new(analyzer_id, Uuid::new_v4().to_string());
        self.jobs.insert(QueryJob::new(&key));
        info!(analyzer_id, job_id = %key.job_id, "Query job started");

        let job_id = key.job_id.clone();
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.execute(key).await;
        });
        Ok(job_id)
    }

    /// Run one job to a terminal state.
    pub async fn execute(&self, key: JobKey) {
        self.jobs.update(&key, |job| {
            job.state = JobState::InProgress;
            job.progress = 10;
            job.log("Starting query job");
        });

        match self.run(&key).await {
            Ok(Some(stored)) => {
                self.jobs.update(&key, |job| {
                    job.state = JobState::Completed;
                    job.progress = 100;
                    job.fields_count = stored;
                    job.log(format!(
                        "Query completed successfully. {stored} fields saved to database."
                    ));
                });
                info!(analyzer_id = %key.analyzer_id, job_id = %key.job_id, "Query job completed");
            }
            Ok(None) => {
                info!(analyzer_id = %key.analyzer_id, job_id = %key.job_id, "Query job cancelled");
            }
            Err(e) => {
                error!(
                    analyzer_id = %key.analyzer_id,
                    job_id = %key.job_id,
                    "Error executing query: {}", e
                );
                let message = e.to_string();
                self.jobs.update(&key, |job| {
                    job.state = JobState::Failed;
                    job.log(format!("Query failed: {message}"));
                    job.error = Some(message);
                });
            }
        }
    }

    fn progress(&self, key: &JobKey, progress: u8, message: &str) {
        self.jobs.update(key, |job| {
            job.progress = progress;
            job.log(message);
        });
    }

    fn log(&self, key: &JobKey, message: &str) {
        self.jobs.update(key, |job| job.log(message));
    }

    /// `Ok(None)` when the job was cancelled at a checkpoint.
    async fn run(&self, key: &JobKey) -> AppResult<Option<usize>> {
        let analyzer = self.load_analyzer(&key.analyzer_id).await?;
        let (host, port) = analyzer.address().ok_or_else(|| {
            IntegrationError::Validation("Analyzer IP address or port not configured".to_string())
        })?;
        if is_blocked_host(host, port).await {
            return Err(IntegrationError::Validation(
                "Connection to this address is not permitted".to_string(),
            ));
        }

        if self.jobs.is_cancelled(key) {
            return Ok(None);
        }
        self.progress(key, 20, &format!("Connecting to analyzer at {host}:{port}"));
        let stream = self.connector.connect(host, port).await?;
        self.progress(key, 30, "TCP connection established");

        let mut client = AstmClient::from_config(stream, &self.config);
        let header = HeaderRecord::query(self.config.sender_name.clone());

        if self.jobs.is_cancelled(key) {
            return Ok(None);
        }
        self.log(key, "Sending ENQ (Enquiry)");
        client.handshake().await?;
        self.progress(key, 40, "Received ACK (Acknowledge)");

        if self.jobs.is_cancelled(key) {
            return Ok(None);
        }
        self.log(key, "Sending query message (header record)");
        client.send_query(&header).await?;
        self.progress(key, 50, "Sent EOT (End of Transmission)");

        if self.jobs.is_cancelled(key) {
            return Ok(None);
        }
        self.log(key, "Waiting for server response");
        client.await_response().await?;
        self.log(key, "Received ENQ from server, sending ACK");
        self.progress(key, 60, "Receiving field data frames");
        let records = client.receive_records().await?;
        for (i, record) in records.iter().enumerate() {
            self.log(key, &format!("Received frame {}: {}", i + 1, preview(record)));
        }
        self.log(key, "Received EOT, end of transmission");

        if self.jobs.is_cancelled(key) {
            return Ok(None);
        }
        self.progress(key, 80, &format!("Parsing {} records", records.len()));
        let fields = parse_field_records(&records);
        self.log(key, &format!("Extracted {} fields from response", fields.len()));

        if self.jobs.is_cancelled(key) {
            return Ok(None);
        }
        self.progress(key, 90, &format!("Storing {} fields in database", fields.len()));
        let stored = self.store_fields(&key.analyzer_id, &fields).await?;
        Ok(Some(stored))
    }

    /// Flag a running job as cancelled. A no-op for finished or unknown jobs.
    pub fn cancel(&self, analyzer_id: &str, job_id: &str) -> bool {
        let cancelled = self.jobs.cancel(&JobKey::new(analyzer_id, job_id));
        if cancelled {
            info!(analyzer_id, job_id, "Query job cancellation requested");
        }
        cancelled
    }

    /// Current job record. Unknown keys yield a not-found placeholder.
    pub async fn get_status(&self, analyzer_id: &str, job_id: &str) -> AppResult<QueryStatus> {
        let key = JobKey::new(analyzer_id, job_id);
        let Some(job) = self.jobs.snapshot(&key) else {
            return Ok(QueryStatus {
                job: QueryJob::not_found(&key),
                fields: Vec::new(),
            });
        };
        let fields = if job.state == JobState::Completed {
            self.repos.fields.find_by_analyzer(analyzer_id).await?
        } else {
            Vec::new()
        };
        Ok(QueryStatus { job, fields })
    }

    /// Persist discovered fields. Fields already known by protocol reference are
    /// skipped, as are fields whose unit does not fit their kind.
    pub async fn store_fields(&self, analyzer_id: &str, fields: &[DiscoveredField]) -> AppResult<usize> {
        let mut stored = 0;
        for discovered in fields {
            if self
                .repos
                .fields
                .find_by_astm_ref(analyzer_id, &discovered.astm_ref)
                .await?
                .is_some()
            {
                debug!(analyzer_id, astm_ref = %discovered.astm_ref, "Field already known");
                continue;
            }

            let has_unit = discovered.unit.as_deref().is_some_and(|u| !u.trim().is_empty());
            let numeric = discovered.kind == FieldKind::Numeric;
            if numeric && !has_unit {
                error!(analyzer_id, field = %discovered.name, "NUMERIC field without unit, skipped");
                continue;
            }
            if !numeric && has_unit {
                error!(
                    analyzer_id,
                    field = %discovered.name,
                    "{} field must not carry a unit, skipped",
                    discovered.kind
                );
                continue;
            }

            let field = AnalyzerField::new(
                analyzer_id,
                discovered.name.clone(),
                discovered.astm_ref.clone(),
                discovered.kind,
                discovered.unit.clone(),
            );
            self.repos.fields.save(field).await?;
            stored += 1;
        }
        info!(analyzer_id, "Stored {} of {} discovered fields", stored, fields.len());
        Ok(stored)
    }

    /// Check the analyzer's address and fire the matching connectivity trigger.
    pub async fn test_connection(&self, analyzer_id: &str) -> AppResult<bool> {
        let analyzer = self.load_analyzer(analyzer_id).await?;
        let (host, port) = analyzer.address().ok_or_else(|| {
            IntegrationError::Validation(
                "Analyzer has no TCP/IP connection details configured".to_string(),
            )
        })?;

        let reachable = if is_blocked_host(host, port).await {
            warn!(analyzer_id, host, "Connection to this address is not permitted");
            false
        } else {
            match self.connector.connect(host, port).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(analyzer_id, "Connection test failed: {}", e);
                    false
                }
            }
        };

        let trigger = if reachable {
            LifecycleTrigger::ConnectionTestSucceeded
        } else {
            LifecycleTrigger::ConnectionTestFailed
        };
        if trigger.applies_to(analyzer.status) {
            self.lifecycle.fire(analyzer_id, trigger).await?;
        }
        Ok(reachable)
    }
}
