//! Copy mappings between analyzers of the same model.
//!
//! Source fields are matched to target fields by name. Copies land on the target as
//! drafts so the target analyzer goes through its own activation.

use super::compatibility::is_compatible;
use super::service::MappingService;
use crate::error::{AppResult, IntegrationError};
use crate::model::{AnalyzerField, MappingRequest, MappingUpdate};
use crate::repository::Repositories;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// How a copy treats conflicts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CopyOptions {
    /// Replace mappings already present on the target field
    pub overwrite_existing: bool,
    /// Skip incompatible pairings instead of failing the copy
    pub skip_incompatible: bool,
}

/// Outcome of one copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    /// Mappings written to the target.
    pub copied_count: usize,
    /// Source mappings left behind.
    pub skipped_count: usize,
    /// One line per skipped mapping.
    pub warnings: Vec<String>,
    /// Ids of the target drafts.
    pub copied_mapping_ids: Vec<String>,
}

impl CopyReport {
    fn skip(&mut self, warning: String) {
        self.skipped_count += 1;
        self.warnings.push(warning);
    }
}

/// Copies mappings through [`MappingService`] so every copy is validated like a
/// hand-made one.
pub struct MappingCopier {
    service: Arc<MappingService>,
    repos: Repositories,
}

impl MappingCopier {
    /// Copier writing through `service`.
    pub fn new(service: Arc<MappingService>, repos: Repositories) -> Self {
        Self { service, repos }
    }

    /// Copy every active mapping of `source_id` onto `target_id`. A write failure
    /// stops the copy and is returned.
    pub async fn copy_mappings(
        &self,
        source_id: &str,
        target_id: &str,
        options: CopyOptions,
    ) -> AppResult<CopyReport> {
        if source_id == target_id {
            return Err(IntegrationError::Validation(
                "Source and target analyzer must differ".to_string(),
            ));
        }
        for id in [source_id, target_id] {
            if self.repos.analyzers.get(id).await?.is_none() {
                return Err(IntegrationError::not_found("Analyzer", id));
            }
        }

        let source_fields: HashMap<String, AnalyzerField> = self
            .repos
            .fields
            .find_by_analyzer(source_id)
            .await?
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();
        let target_fields: HashMap<String, AnalyzerField> = self
            .repos
            .fields
            .find_by_analyzer(target_id)
            .await?
            .into_iter()
            .map(|f| (f.name.clone(), f))
            .collect();

        let mut report = CopyReport::default();
        let source_mappings = self.repos.mappings.find_by_analyzer(source_id).await?;

        for mapping in source_mappings.into_iter().filter(|m| m.active) {
            let Some(source_field) = source_fields.get(&mapping.analyzer_field_id) else {
                report.skip(format!(
                    "Mapping {} references a missing source field",
                    mapping.id
                ));
                continue;
            };
            let Some(target_field) = target_fields.get(&source_field.name) else {
                report.skip(format!(
                    "No matching field '{}' on target analyzer",
                    source_field.name
                ));
                continue;
            };

            if !is_compatible(target_field.kind, mapping.domain_kind) {
                let message = format!(
                    "Field '{}' on target is {} and cannot map to {}",
                    target_field.name, target_field.kind, mapping.domain_kind
                );
                if options.skip_incompatible {
                    report.skip(message);
                    continue;
                }
                return Err(IntegrationError::Validation(message));
            }

            let existing = self.repos.mappings.find_by_field(&target_field.id).await?;
            if let Some(current) = existing.first() {
                if !options.overwrite_existing {
                    report.skip(format!(
                        "Mapping for field '{}' already exists on target analyzer",
                        target_field.name
                    ));
                    continue;
                }
                let mut update = MappingUpdate::from_mapping(current);
                update.domain_field_id = mapping.domain_field_id.clone();
                update.domain_kind = mapping.domain_kind;
                update.mapping_type = mapping.mapping_type;
                update.required = mapping.required;
                update.specimen_type_constraint = mapping.specimen_type_constraint.clone();
                update.panel_constraint = mapping.panel_constraint.clone();
                let saved = self.service.update_mapping(update, true).await?;
                report.copied_mapping_ids.push(saved.id);
                report.copied_count += 1;
                continue;
            }

            let mut request = MappingRequest::new(
                target_field.id.clone(),
                mapping.domain_field_id.clone(),
                mapping.domain_kind,
                mapping.mapping_type,
            );
            request.required = mapping.required;
            request.specimen_type_constraint = mapping.specimen_type_constraint.clone();
            request.panel_constraint = mapping.panel_constraint.clone();
            let created = self.service.create_mapping(request).await?;
            report.copied_mapping_ids.push(created.id);
            report.copied_count += 1;
        }

        info!(
            "Copied {} mappings from {} to {} ({} skipped)",
            report.copied_count, source_id, target_id, report.skipped_count
        );
        Ok(report)
    }
}
