//! Transactional result writes.
//!
//! Patient results and QC results from one message are staged on a single
//! [`ResultTransaction`] and become visible together on commit.

use crate::error::{AppResult, IntegrationError};
use crate::model::{PatientResult, QcResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Opens result transactions.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Start an empty transaction.
    async fn begin(&self) -> AppResult<Box<dyn ResultTransaction>>;
}

/// Staged result writes.
#[async_trait]
pub trait ResultTransaction: Send {
    /// Stage one patient result.
    async fn add_patient_result(&mut self, result: PatientResult) -> AppResult<()>;

    /// Stage one QC result.
    async fn add_qc_result(&mut self, result: QcResult) -> AppResult<()>;

    /// Publish everything staged.
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// Discard everything staged.
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

#[derive(Default)]
struct Committed {
    patient: Vec<PatientResult>,
    qc: Vec<QcResult>,
}

/// Result store that keeps committed rows in memory.
#[derive(Clone, Default)]
pub struct MemoryResultStore {
    committed: Arc<RwLock<Committed>>,
}

impl MemoryResultStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed patient results, in commit order.
    pub fn patient_results(&self) -> Vec<PatientResult> {
        self.committed.read().patient.clone()
    }

    /// Committed QC results, in commit order.
    pub fn qc_results(&self) -> Vec<QcResult> {
        self.committed.read().qc.clone()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn begin(&self) -> AppResult<Box<dyn ResultTransaction>> {
        Ok(Box::new(MemoryTransaction {
            committed: Arc::clone(&self.committed),
            patient: Vec::new(),
            qc: Vec::new(),
            open: true,
        }))
    }
}

struct MemoryTransaction {
    committed: Arc<RwLock<Committed>>,
    patient: Vec<PatientResult>,
    qc: Vec<QcResult>,
    open: bool,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> AppResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(IntegrationError::IllegalState(
                "Transaction already finished".to_string(),
            ))
        }
    }
}

#[async_trait]
impl ResultTransaction for MemoryTransaction {
    async fn add_patient_result(&mut self, result: PatientResult) -> AppResult<()> {
        self.ensure_open()?;
        self.patient.push(result);
        Ok(())
    }

    async fn add_qc_result(&mut self, result: QcResult) -> AppResult<()> {
        self.ensure_open()?;
        self.qc.push(result);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> AppResult<()> {
        self.ensure_open()?;
        self.open = false;
        let mut patient = std::mem::take(&mut self.patient);
        let mut qc = std::mem::take(&mut self.qc);
        debug!(
            patient = patient.len(),
            qc = qc.len(),
            "Committing result transaction"
        );
        let mut committed = self.committed.write();
        committed.patient.append(&mut patient);
        committed.qc.append(&mut qc);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> AppResult<()> {
        self.open = false;
        self.patient.clear();
        self.qc.clear();
        Ok(())
    }
}
