//! Dry-run a sample message against an analyzer's active mappings.
//!
//! Every non-empty field of every record becomes a parsed field named
//! `<record type>_<index>` (e.g. `R_3`) with protocol reference `<record type>|<index>`.
//! Mappings apply when their field carries that name. Nothing is persisted.

use super::hydrator::MappingHydrator;
use super::service::missing_required_roles;
use crate::config::PreviewConfig;
use crate::error::{AppResult, IntegrationError};
use crate::model::{DomainKind, FieldKind, FieldMapping, MappingType};
use crate::repository::Repositories;
use crate::segment::{record_type, split_fields, split_records};
use serde::Serialize;
use std::collections::HashMap;

/// One non-empty field of the sample message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedField {
    /// `<record type>_<index>`.
    pub name: String,
    /// `<record type>|<index>`.
    pub astm_ref: String,
    /// Numeric for result records, text otherwise.
    pub kind: FieldKind,
    /// Trimmed field value.
    pub value: String,
}

/// A mapping that matched a parsed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMapping {
    /// Name of the parsed field.
    pub field_name: String,
    /// Its value.
    pub value: String,
    /// Matching mapping.
    pub mapping_id: String,
    /// Target field.
    pub domain_field_id: String,
    /// Target kind.
    pub domain_kind: DomainKind,
    /// Mapping level.
    pub mapping_type: MappingType,
}

/// What the message would produce once ingested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityPreview {
    /// Domain tests ordered.
    pub tests: Vec<String>,
    /// `(domain field, value)` pairs
    pub results: Vec<(String, String)>,
    /// First value mapped onto the sample.
    pub sample_id: Option<String>,
}

/// Result of a dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingPreview {
    /// Every non-empty field, in message order.
    pub parsed_fields: Vec<ParsedField>,
    /// Matches between fields and active mappings.
    pub applied_mappings: Vec<AppliedMapping>,
    /// Entities the matches would produce.
    pub entities: EntityPreview,
    /// Unmapped fields and missing required roles.
    pub warnings: Vec<String>,
}

/// Split a message into preview fields.
pub fn parse_preview_fields(message: &str) -> Vec<ParsedField> {
    let mut parsed = Vec::new();
    for record in split_records(message) {
        let segment = record_type(record);
        if segment.is_empty() {
            continue;
        }
        let kind = if segment == "R" {
            FieldKind::Numeric
        } else {
            FieldKind::Text
        };
        for (i, value) in split_fields(record).iter().enumerate().skip(1) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            parsed.push(ParsedField {
                name: format!("{segment}_{i}"),
                astm_ref: format!("{segment}|{i}"),
                kind,
                value: value.to_string(),
            });
        }
    }
    parsed
}

/// Runs dry-run previews. Reads only.
pub struct MappingPreviewService {
    repos: Repositories,
    hydrator: MappingHydrator,
    config: PreviewConfig,
}

impl MappingPreviewService {
    /// Build a preview service over `repos`.
    pub fn new(repos: Repositories, config: PreviewConfig) -> Self {
        let hydrator = MappingHydrator::new(repos.fields.clone());
        Self {
            repos,
            hydrator,
            config,
        }
    }

    /// Apply the analyzer's active mappings to `message` without storing anything.
    ///
    /// Fails validation for an empty or oversized message and with NotFound for an
    /// unknown analyzer.
    pub async fn preview_mapping(&self, analyzer_id: &str, message: &str) -> AppResult<MappingPreview> {
        if message.trim().is_empty() {
            return Err(IntegrationError::Validation(
                "Sample message is required".to_string(),
            ));
        }
        if message.len() > self.config.max_message_bytes {
            return Err(IntegrationError::Validation(format!(
                "Sample message exceeds maximum size of {} bytes",
                self.config.max_message_bytes
            )));
        }
        if self.repos.analyzers.get(analyzer_id).await?.is_none() {
            return Err(IntegrationError::not_found("Analyzer", analyzer_id));
        }

        let parsed_fields = parse_preview_fields(message);

        let active: Vec<FieldMapping> = self
            .repos
            .mappings
            .find_by_analyzer(analyzer_id)
            .await?
            .into_iter()
            .filter(|m| m.active)
            .collect();
        let missing = missing_required_roles(&active);

        let mut by_name: HashMap<String, Vec<FieldMapping>> = HashMap::new();
        for view in self.hydrator.hydrate(active).await? {
            if let Some(field) = view.field {
                by_name.entry(field.name).or_default().push(view.mapping);
            }
        }

        let mut preview = MappingPreview::default();
        for field in &parsed_fields {
            let Some(mappings) = by_name.get(&field.name) else {
                preview.warnings.push(format!(
                    "Field '{}' is not mapped to any domain field",
                    field.name
                ));
                continue;
            };
            for mapping in mappings {
                match mapping.domain_kind {
                    DomainKind::Test => preview.entities.tests.push(mapping.domain_field_id.clone()),
                    DomainKind::Result => preview
                        .entities
                        .results
                        .push((mapping.domain_field_id.clone(), field.value.clone())),
                    DomainKind::Sample => {
                        preview.entities.sample_id.get_or_insert_with(|| field.value.clone());
                    }
                    _ => {}
                }
                preview.applied_mappings.push(AppliedMapping {
                    field_name: field.name.clone(),
                    value: field.value.clone(),
                    mapping_id: mapping.id.clone(),
                    domain_field_id: mapping.domain_field_id.clone(),
                    domain_kind: mapping.domain_kind,
                    mapping_type: mapping.mapping_type,
                });
            }
        }

        preview
            .warnings
            .extend(missing.into_iter().map(|role| format!("Required mapping missing: {role}")));
        preview.parsed_fields = parsed_fields;
        Ok(preview)
    }
}
