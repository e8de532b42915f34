//! Mapping workflow: create, activate, update, disable and the activation checks.

use super::compatibility::{check_compatibility, is_compatible};
use super::hydrator::{MappingHydrator, MappingView};
use super::metrics::MappingMetrics;
use crate::error::{AppResult, IntegrationError};
use crate::lifecycle::{LifecycleManager, LifecycleTrigger};
use crate::model::{
    Analyzer, AnalyzerField, AnalyzerStatus, ConcurrencyToken, DomainKind, FieldMapping,
    MappingRequest, MappingType, MappingUpdate,
};
use crate::repository::Repositories;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Required role covered by a SAMPLE mapping.
pub const SAMPLE_ID_ROLE: &str = "Sample ID";
/// Required role covered by a TEST_LEVEL mapping.
pub const TEST_CODE_ROLE: &str = "Test Code";
/// Required role covered by a RESULT_LEVEL mapping.
pub const RESULT_VALUE_ROLE: &str = "Result Value";

/// Result of checking whether an analyzer's mappings are ready to go live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationValidation {
    /// No required role is missing.
    pub can_activate: bool,
    /// Subset of "Sample ID", "Test Code", "Result Value"
    pub missing_required: Vec<String>,
    /// Unacknowledged errors still queued for the analyzer.
    pub pending_messages_count: usize,
    /// Human-readable notes for the operator.
    pub warnings: Vec<String>,
}

/// Required roles not covered by an active, required mapping.
pub fn missing_required_roles(mappings: &[FieldMapping]) -> Vec<&'static str> {
    let covered = |pred: &dyn Fn(&FieldMapping) -> bool| {
        mappings.iter().any(|m| m.active && m.required && pred(m))
    };
    let mut missing = Vec::new();
    if !covered(&|m: &FieldMapping| m.domain_kind == DomainKind::Sample) {
        missing.push(SAMPLE_ID_ROLE);
    }
    if !covered(&|m: &FieldMapping| m.mapping_type == MappingType::TestLevel) {
        missing.push(TEST_CODE_ROLE);
    }
    if !covered(&|m: &FieldMapping| m.mapping_type == MappingType::ResultLevel) {
        missing.push(RESULT_VALUE_ROLE);
    }
    missing
}

/// Owns every write to field mappings.
///
/// The first mapping moves a SETUP analyzer to VALIDATION; activating the required
/// set moves it on to ACTIVE. Both go through the lifecycle manager.
pub struct MappingService {
    repos: Repositories,
    lifecycle: Arc<LifecycleManager>,
    hydrator: MappingHydrator,
}

impl MappingService {
    /// Service over `repos`, reporting to `lifecycle`.
    pub fn new(repos: Repositories, lifecycle: Arc<LifecycleManager>) -> Self {
        let hydrator = MappingHydrator::new(Arc::clone(&repos.fields));
        Self {
            repos,
            lifecycle,
            hydrator,
        }
    }

    async fn load_analyzer(&self, analyzer_id: &str) -> AppResult<Analyzer> {
        self.repos
            .analyzers
            .get(analyzer_id)
            .await?
            .ok_or_else(|| IntegrationError::not_found("Analyzer", analyzer_id))
    }

    async fn load_field(&self, field_id: &str) -> AppResult<AnalyzerField> {
        self.repos
            .fields
            .get(field_id)
            .await?
            .ok_or_else(|| IntegrationError::not_found("AnalyzerField", field_id))
    }

    async fn load_mapping(&self, mapping_id: &str) -> AppResult<FieldMapping> {
        self.repos
            .mappings
            .get(mapping_id)
            .await?
            .ok_or_else(|| IntegrationError::not_found("Mapping", mapping_id))
    }

    /// Look up one mapping. Fails with NotFound.
    pub async fn get_mapping(&self, mapping_id: &str) -> AppResult<FieldMapping> {
        self.load_mapping(mapping_id).await
    }

    /// Create a draft mapping for the field's own analyzer.
    pub async fn create_mapping(&self, request: MappingRequest) -> AppResult<FieldMapping> {
        let field = self.load_field(&request.analyzer_field_id).await?;
        check_compatibility(field.kind, request.domain_kind)?;

        let analyzer_id = field.analyzer_id.clone();
        let first = self
            .repos
            .mappings
            .find_by_analyzer(&analyzer_id)
            .await?
            .is_empty();

        let mapping = self
            .repos
            .mappings
            .insert(FieldMapping::from_request(&analyzer_id, &request))
            .await?;
        info!(
            mapping_id = %mapping.id,
            analyzer_id = %analyzer_id,
            "Created mapping {} -> {} ({})",
            field.name,
            mapping.domain_field_id,
            mapping.domain_kind
        );

        if first {
            let analyzer = self.load_analyzer(&analyzer_id).await?;
            if LifecycleTrigger::MappingCreated.applies_to(analyzer.status) {
                self.lifecycle
                    .fire(&analyzer_id, LifecycleTrigger::MappingCreated)
                    .await?;
            }
        }

        Ok(mapping)
    }

    /// Like [`create_mapping`](Self::create_mapping), but the field must belong to
    /// `analyzer_id`.
    pub async fn create_mapping_for_analyzer(
        &self,
        analyzer_id: &str,
        request: MappingRequest,
    ) -> AppResult<FieldMapping> {
        let field = self.load_field(&request.analyzer_field_id).await?;
        if field.analyzer_id != analyzer_id {
            return Err(IntegrationError::Validation(format!(
                "Analyzer field {} does not belong to analyzer {}",
                field.id, analyzer_id
            )));
        }
        self.create_mapping(request).await
    }

    /// Activate one mapping.
    ///
    /// `expected` is what the caller last saw; a stale token fails with a conflict.
    /// Changing an ACTIVE analyzer needs `confirmed`.
    pub async fn activate_mapping(
        &self,
        mapping_id: &str,
        confirmed: bool,
        expected: Option<ConcurrencyToken>,
    ) -> AppResult<FieldMapping> {
        let mut mapping = self.load_mapping(mapping_id).await?;
        if let Some(token) = expected {
            if !token.matches(&mapping) {
                return Err(IntegrationError::conflict("Mapping", mapping_id));
            }
        }

        let analyzer = self.load_analyzer(&mapping.analyzer_id).await?;
        if analyzer.status == AnalyzerStatus::Active && !confirmed {
            return Err(IntegrationError::ConfirmationRequired(
                "Confirmation required to activate mapping for active analyzer".to_string(),
            ));
        }

        let version = mapping.version;
        mapping.active = true;
        let saved = self.repos.mappings.save_if_unchanged(mapping, version).await?;
        info!(mapping_id, analyzer_id = %saved.analyzer_id, "Mapping activated");

        self.after_activation(&saved.analyzer_id).await?;
        Ok(saved)
    }

    /// Activate several mappings of one analyzer, all or none.
    pub async fn bulk_activate_mappings(
        &self,
        analyzer_id: &str,
        mapping_ids: &[String],
        confirmed: bool,
    ) -> AppResult<Vec<FieldMapping>> {
        if mapping_ids.is_empty() {
            return Ok(Vec::new());
        }
        let analyzer = self.load_analyzer(analyzer_id).await?;
        if analyzer.status == AnalyzerStatus::Active && !confirmed {
            return Err(IntegrationError::ConfirmationRequired(
                "Confirmation required to activate mappings for active analyzer".to_string(),
            ));
        }

        let mut updates = Vec::with_capacity(mapping_ids.len());
        for id in mapping_ids {
            let mut mapping = self.load_mapping(id).await?;
            if mapping.analyzer_id != analyzer_id {
                return Err(IntegrationError::Validation(format!(
                    "Mapping {id} does not belong to analyzer {analyzer_id}"
                )));
            }
            let version = mapping.version;
            mapping.active = true;
            updates.push((mapping, version));
        }

        let saved = self
            .repos
            .mappings
            .save_all_if_unchanged(analyzer_id, updates)
            .await?;
        info!(analyzer_id, count = saved.len(), "Bulk activated mappings");

        self.after_activation(analyzer_id).await?;
        Ok(saved)
    }

    /// Rewrite the domain side of a mapping.
    pub async fn update_mapping(
        &self,
        update: MappingUpdate,
        confirmed: bool,
    ) -> AppResult<FieldMapping> {
        let mut mapping = self.load_mapping(&update.id).await?;
        if let Some(token) = update.expected {
            if !token.matches(&mapping) {
                return Err(IntegrationError::conflict("Mapping", update.id.clone()));
            }
        }

        let field = self.load_field(&mapping.analyzer_field_id).await?;
        check_compatibility(field.kind, update.domain_kind)?;

        let analyzer = self.load_analyzer(&mapping.analyzer_id).await?;
        if analyzer.status == AnalyzerStatus::Active && mapping.active && !confirmed {
            return Err(IntegrationError::ConfirmationRequired(
                "Confirmation required to update active mapping for active analyzer".to_string(),
            ));
        }

        let version = mapping.version;
        mapping.domain_field_id = update.domain_field_id;
        mapping.domain_kind = update.domain_kind;
        mapping.mapping_type = update.mapping_type;
        mapping.required = update.required;
        mapping.specimen_type_constraint = update.specimen_type_constraint;
        mapping.panel_constraint = update.panel_constraint;

        let saved = self.repos.mappings.save_if_unchanged(mapping, version).await?;
        info!(mapping_id = %saved.id, "Mapping updated");
        Ok(saved)
    }

    /// Retire a mapping. Required mappings stay, and nothing is retired while the
    /// analyzer has unacknowledged errors that may still need it. Retiring a live
    /// mapping of an ACTIVE analyzer needs `confirmed`.
    pub async fn disable_mapping(
        &self,
        mapping_id: &str,
        confirmed: bool,
        reason: &str,
    ) -> AppResult<FieldMapping> {
        let mut mapping = self.load_mapping(mapping_id).await?;
        if mapping.required {
            return Err(IntegrationError::Validation(format!(
                "Cannot disable required mapping. Required mappings ({SAMPLE_ID_ROLE}, {TEST_CODE_ROLE}, {RESULT_VALUE_ROLE}) must remain active."
            )));
        }

        let analyzer = self.load_analyzer(&mapping.analyzer_id).await?;
        if analyzer.status == AnalyzerStatus::Active && mapping.active && !confirmed {
            return Err(IntegrationError::ConfirmationRequired(
                "Confirmation required to disable active mapping for active analyzer".to_string(),
            ));
        }

        let pending = self
            .repos
            .errors
            .count_unacknowledged(&mapping.analyzer_id)
            .await?;
        if pending > 0 {
            return Err(IntegrationError::Validation(format!(
                "Cannot retire mapping: {pending} pending messages reference this mapping. Please resolve errors first."
            )));
        }

        let version = mapping.version;
        mapping.active = false;
        let saved = self.repos.mappings.save_if_unchanged(mapping, version).await?;
        info!(mapping_id, reason, "Mapping disabled");
        Ok(saved)
    }

    /// Read-only readiness check.
    pub async fn validate_activation(&self, analyzer_id: &str) -> AppResult<ActivationValidation> {
        let mappings = self.repos.mappings.find_by_analyzer(analyzer_id).await?;
        let missing_required: Vec<String> = missing_required_roles(&mappings)
            .into_iter()
            .map(str::to_string)
            .collect();

        let pending = self.repos.errors.count_unacknowledged(analyzer_id).await?;
        let mut warnings = Vec::new();
        if pending > 0 {
            warnings.push(format!(
                "This analyzer has {pending} pending messages in the error queue. Activating mapping changes may affect how these messages are reprocessed."
            ));
        }

        let active: Vec<FieldMapping> = mappings.into_iter().filter(|m| m.active).collect();
        for view in self.hydrator.hydrate(active).await? {
            if let Some(field) = &view.field {
                if !is_compatible(field.kind, view.mapping.domain_kind) {
                    warnings.push(format!(
                        "Type incompatibility detected in mapping: {} ({}) -> {} ({})",
                        field.name,
                        field.kind,
                        view.mapping.domain_field_id,
                        view.mapping.domain_kind
                    ));
                }
            }
        }

        Ok(ActivationValidation {
            can_activate: missing_required.is_empty(),
            missing_required,
            pending_messages_count: pending,
            warnings,
        })
    }

    /// Weaker check used when activating an analyzer: at least one active mapping is
    /// marked required.
    pub async fn validate_required_mappings(&self, analyzer_id: &str) -> AppResult<()> {
        let mappings = self.repos.mappings.find_by_analyzer(analyzer_id).await?;
        if mappings.iter().any(|m| m.active && m.required) {
            Ok(())
        } else {
            Err(IntegrationError::Validation(
                "Required mappings missing. At least one mapping with isRequired=true must exist for analyzer activation".to_string(),
            ))
        }
    }

    /// Whether `mapping_id` exists and belongs to `analyzer_id`.
    pub async fn verify_mapping_belongs_to_analyzer(
        &self,
        mapping_id: &str,
        analyzer_id: &str,
    ) -> AppResult<bool> {
        Ok(self
            .repos
            .mappings
            .get(mapping_id)
            .await?
            .is_some_and(|m| m.analyzer_id == analyzer_id))
    }

    /// Mappings with their fields. Retired (inactive) mappings only when asked for.
    pub async fn get_mappings_for_analyzer(
        &self,
        analyzer_id: &str,
        include_retired: bool,
    ) -> AppResult<Vec<MappingView>> {
        let mappings: Vec<FieldMapping> = self
            .repos
            .mappings
            .find_by_analyzer(analyzer_id)
            .await?
            .into_iter()
            .filter(|m| include_retired || m.active)
            .collect();
        self.hydrator.hydrate(mappings).await
    }

    /// Coverage of the analyzer's fields by active mappings.
    pub async fn mapping_metrics(&self, analyzer_id: &str) -> AppResult<MappingMetrics> {
        let fields = self.repos.fields.find_by_analyzer(analyzer_id).await?;
        let mappings = self.repos.mappings.find_by_analyzer(analyzer_id).await?;
        Ok(MappingMetrics::compute(&fields, &mappings))
    }

    /// Move a VALIDATION analyzer to ACTIVE once every required role is covered.
    async fn after_activation(&self, analyzer_id: &str) -> AppResult<()> {
        let analyzer = self.load_analyzer(analyzer_id).await?;
        if !LifecycleTrigger::RequiredMappingsActivated.applies_to(analyzer.status) {
            return Ok(());
        }
        let validation = self.validate_activation(analyzer_id).await?;
        if validation.can_activate {
            self.lifecycle
                .fire(analyzer_id, LifecycleTrigger::RequiredMappingsActivated)
                .await?;
        } else {
            debug!(
                analyzer_id,
                missing = ?validation.missing_required,
                "Analyzer stays in VALIDATION"
            );
        }
        Ok(())
    }
}
