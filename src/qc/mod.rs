//! QC extraction and processing.
//!
//! A parsed Q segment is resolved through the analyzer's mappings into a
//! [`QcResult`] by [`QcExtractor`], then handed by [`QcProcessor`] to a
//! [`QcResultSink`] inside the caller's result transaction. Patient results and QC
//! results from one message therefore commit or roll back together.

pub mod extraction;
pub mod processing;

pub use extraction::QcExtractor;
pub use processing::{QcFailure, QcProcessor};

use crate::error::AppResult;
use crate::model::QcResult;
use crate::repository::ResultTransaction;
use async_trait::async_trait;

/// Downstream consumer of QC results.
#[async_trait]
pub trait QcResultSink: Send + Sync {
    /// Stage one QC result on `tx`. Nothing is visible until the caller commits.
    async fn create_qc_result(
        &self,
        tx: &mut dyn ResultTransaction,
        result: &QcResult,
    ) -> AppResult<()>;
}

/// Sink that writes QC results into the result store alongside patient results.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionalQcSink;

#[async_trait]
impl QcResultSink for TransactionalQcSink {
    async fn create_qc_result(
        &self,
        tx: &mut dyn ResultTransaction,
        result: &QcResult,
    ) -> AppResult<()> {
        tx.add_qc_result(result.clone()).await
    }
}
