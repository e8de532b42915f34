//! Guarded status writes and change notification.

use super::{LifecycleTrigger, StatusChange};
use crate::error::{AppResult, IntegrationError};
use crate::model::{Analyzer, AnalyzerStatus};
use crate::repository::AnalyzerRepository;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Owns every analyzer status change.
pub struct LifecycleManager {
    analyzers: Arc<dyn AnalyzerRepository>,
    events: broadcast::Sender<StatusChange>,
}

impl LifecycleManager {
    /// `capacity` bounds how far a slow subscriber may lag before it starts missing
    /// changes.
    pub fn new(analyzers: Arc<dyn AnalyzerRepository>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { analyzers, events }
    }

    /// Receive every status change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.events.subscribe()
    }

    async fn load(&self, analyzer_id: &str) -> AppResult<Analyzer> {
        self.analyzers
            .get(analyzer_id)
            .await?
            .ok_or_else(|| IntegrationError::not_found("Analyzer", analyzer_id))
    }

    /// Stored status of one analyzer.
    pub async fn status(&self, analyzer_id: &str) -> AppResult<AnalyzerStatus> {
        Ok(self.load(analyzer_id).await?.status)
    }

    /// Move an analyzer to `target` if the table allows it. Staying put succeeds
    /// without publishing anything.
    pub async fn transition(
        &self,
        analyzer_id: &str,
        target: AnalyzerStatus,
        reason: &str,
    ) -> AppResult<Analyzer> {
        let analyzer = self.load(analyzer_id).await?;
        self.apply(analyzer, target, reason, false).await
    }

    /// Operator-requested change. Only INACTIVE, SETUP and VALIDATION may be
    /// requested directly.
    pub async fn manual_transition(
        &self,
        analyzer_id: &str,
        target: AnalyzerStatus,
        reason: &str,
    ) -> AppResult<Analyzer> {
        let analyzer = self.load(analyzer_id).await?;
        if !analyzer.status.can_transition_to(target) {
            return Err(illegal_transition(&analyzer, target));
        }
        if !target.is_manual_target() {
            return Err(IntegrationError::Validation(format!(
                "Manual transition to {target} is not allowed. Allowed targets: INACTIVE, SETUP, VALIDATION"
            )));
        }
        self.apply(analyzer, target, reason, false).await
    }

    /// INACTIVE to DELETED.
    pub async fn retire(&self, analyzer_id: &str) -> AppResult<Analyzer> {
        let analyzer = self.load(analyzer_id).await?;
        if analyzer.status != AnalyzerStatus::Inactive {
            return Err(IntegrationError::IllegalState(format!(
                "Cannot retire analyzer {}: status is {} (expected INACTIVE)",
                analyzer.id, analyzer.status
            )));
        }
        self.apply(analyzer, AnalyzerStatus::Deleted, "Analyzer retired", false)
            .await
    }

    /// Fire an event-driven transition. Fails with `IllegalState` when the stored
    /// status does not satisfy the trigger's precondition.
    pub async fn fire(&self, analyzer_id: &str, trigger: LifecycleTrigger) -> AppResult<Analyzer> {
        let analyzer = self.load(analyzer_id).await?;
        let target = trigger.target();
        if !trigger.applies_to(analyzer.status) {
            return Err(IntegrationError::IllegalState(format!(
                "Cannot transition to {}: analyzer {} is in {} status (expected {})",
                target,
                analyzer.id,
                analyzer.status,
                trigger.expected()
            )));
        }
        debug!(analyzer_id, %trigger, "Firing lifecycle trigger");
        self.apply(analyzer, target, trigger.reason(), trigger.stamps_activation())
            .await
    }

    async fn apply(
        &self,
        analyzer: Analyzer,
        target: AnalyzerStatus,
        reason: &str,
        stamp_activation: bool,
    ) -> AppResult<Analyzer> {
        let old = analyzer.status;
        if old == target {
            return Ok(analyzer);
        }
        if !old.can_transition_to(target) {
            return Err(illegal_transition(&analyzer, target));
        }

        let activated = stamp_activation.then(Utc::now);
        let updated = self
            .analyzers
            .update_status(&analyzer.id, old, target, activated)
            .await?;

        info!(
            "Analyzer {} status changed {} -> {}: {}",
            updated.id, old, target, reason
        );

        // No subscribers is not an error.
        let _ = self.events.send(StatusChange {
            analyzer_id: updated.id.clone(),
            old,
            new: target,
            reason: reason.to_string(),
        });

        Ok(updated)
    }
}

fn illegal_transition(analyzer: &Analyzer, target: AnalyzerStatus) -> IntegrationError {
    IntegrationError::IllegalState(format!(
        "Invalid status transition from {} to {} for analyzer {}",
        analyzer.status, target, analyzer.id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;

    async fn manager_with(status: AnalyzerStatus) -> LifecycleManager {
        let store = Arc::new(MemoryStore::new());
        AnalyzerRepository::save(store.as_ref(), Analyzer::new("a-1", "Chem").with_status(status))
            .await
            .expect("seed");
        LifecycleManager::new(store, 8)
    }

    #[tokio::test]
    async fn test_same_status_is_silent_noop() {
        let manager = manager_with(AnalyzerStatus::Setup).await;
        let mut rx = manager.subscribe();
        let analyzer = manager
            .transition("a-1", AnalyzerStatus::Setup, "again")
            .await
            .expect("no-op");
        assert_eq!(analyzer.status, AnalyzerStatus::Setup);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_change_is_published() {
        let manager = manager_with(AnalyzerStatus::Setup).await;
        let mut rx = manager.subscribe();
        manager
            .fire("a-1", LifecycleTrigger::MappingCreated)
            .await
            .expect("fires");
        let change = rx.try_recv().expect("published before return");
        assert_eq!(change.old, AnalyzerStatus::Setup);
        assert_eq!(change.new, AnalyzerStatus::Validation);
        assert_eq!(change.reason, "First mapping created");
    }

    #[tokio::test]
    async fn test_trigger_precondition_message() {
        let manager = manager_with(AnalyzerStatus::Active).await;
        let err = manager
            .fire("a-1", LifecycleTrigger::MappingCreated)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Illegal state: Cannot transition to VALIDATION: analyzer a-1 is in ACTIVE status (expected SETUP)"
        );
    }

    #[tokio::test]
    async fn test_activation_stamps_timestamp() {
        let manager = manager_with(AnalyzerStatus::Validation).await;
        let analyzer = manager
            .fire("a-1", LifecycleTrigger::RequiredMappingsActivated)
            .await
            .expect("fires");
        assert_eq!(analyzer.status, AnalyzerStatus::Active);
        assert!(analyzer.last_activated.is_some());
    }

    #[tokio::test]
    async fn test_manual_transition_rejects_active() {
        let manager = manager_with(AnalyzerStatus::Validation).await;
        let err = manager
            .manual_transition("a-1", AnalyzerStatus::Active, "operator")
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_retire_requires_inactive() {
        let manager = manager_with(AnalyzerStatus::Setup).await;
        assert!(manager.retire("a-1").await.is_err());
        manager
            .manual_transition("a-1", AnalyzerStatus::Inactive, "shelved")
            .await
            .expect("any status may go inactive");
        let retired = manager.retire("a-1").await.expect("retire");
        assert_eq!(retired.status, AnalyzerStatus::Deleted);
    }
}
