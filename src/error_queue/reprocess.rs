//! Replay queued messages once their mappings are in place.

use super::ErrorQueue;
use crate::error::AppResult;
use crate::ingest::MessageIngestor;
use crate::model::ErrorStatus;
use crate::repository::MappingRepository;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Replays the raw message behind a queued error.
pub struct ErrorReprocessor {
    queue: Arc<ErrorQueue>,
    mappings: Arc<dyn MappingRepository>,
    ingestor: Arc<MessageIngestor>,
}

impl ErrorReprocessor {
    /// Reprocessor replaying through `ingestor`.
    pub fn new(
        queue: Arc<ErrorQueue>,
        mappings: Arc<dyn MappingRepository>,
        ingestor: Arc<MessageIngestor>,
    ) -> Self {
        Self {
            queue,
            mappings,
            ingestor,
        }
    }

    /// Re-run the stored raw message of an error.
    ///
    /// Returns false, after logging, when the record is already RESOLVED, there is
    /// nothing to replay or the analyzer has no active mappings. On success the
    /// record is RESOLVED.
    pub async fn reprocess_error(&self, error_id: &str) -> AppResult<bool> {
        let record = self.queue.get_error(error_id).await?;
        if record.status == ErrorStatus::Resolved {
            warn!(error_id, "Error already resolved, not replaying its message");
            return Ok(false);
        }

        let Some(raw) = record.raw_message.as_deref().filter(|r| !r.trim().is_empty()) else {
            error!(error_id, "Cannot reprocess error: raw message is empty");
            return Ok(false);
        };

        let has_active = self
            .mappings
            .find_by_analyzer(&record.analyzer_id)
            .await?
            .iter()
            .any(|m| m.active);
        if !has_active {
            error!(
                error_id,
                "Cannot reprocess error: no active mappings found for analyzer {}",
                record.analyzer_id
            );
            return Ok(false);
        }

        if !self.ingestor.reprocess(&record.analyzer_id, raw).await? {
            return Ok(false);
        }

        self.queue.resolve_error(error_id).await?;
        info!(error_id, analyzer_id = %record.analyzer_id, "Reprocessed queued message");
        Ok(true)
    }
}
