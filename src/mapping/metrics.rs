//! Mapping coverage statistics.

use super::compatibility::advisory_domain_kinds;
use crate::model::{AnalyzerField, FieldMapping};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Field coverage within one record prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentCoverage {
    /// Active fields.
    pub total: usize,
    /// Active fields with an active mapping.
    pub mapped: usize,
}

/// How much of an analyzer's field set is mapped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingMetrics {
    /// Active fields.
    pub total_fields: usize,
    /// Active fields with at least one active mapping.
    pub mapped_fields: usize,
    /// `mapped_fields / total_fields`, 0.0 when there are no fields
    pub accuracy: f64,
    /// Names of active fields without one.
    pub unmapped_fields: Vec<String>,
    /// Keyed by the record prefix of each field's protocol reference
    pub coverage_by_segment: BTreeMap<String, SegmentCoverage>,
    /// Mappings whose pairing looks suspicious but is allowed.
    pub type_warnings: Vec<String>,
}

impl MappingMetrics {
    /// Compute over active fields and active mappings only.
    pub fn compute(fields: &[AnalyzerField], mappings: &[FieldMapping]) -> Self {
        let active_fields: Vec<&AnalyzerField> = fields.iter().filter(|f| f.active).collect();
        let mapped_ids: HashSet<&str> = mappings
            .iter()
            .filter(|m| m.active)
            .map(|m| m.analyzer_field_id.as_str())
            .collect();

        let mut metrics = MappingMetrics {
            total_fields: active_fields.len(),
            ..Self::default()
        };

        for field in &active_fields {
            let mapped = mapped_ids.contains(field.id.as_str());
            let entry = metrics
                .coverage_by_segment
                .entry(field.segment_prefix().to_string())
                .or_default();
            entry.total += 1;
            if mapped {
                entry.mapped += 1;
                metrics.mapped_fields += 1;
            } else {
                metrics.unmapped_fields.push(field.name.clone());
            }
        }

        if metrics.total_fields > 0 {
            metrics.accuracy = metrics.mapped_fields as f64 / metrics.total_fields as f64;
        }

        let by_id: HashMap<&str, &AnalyzerField> =
            fields.iter().map(|f| (f.id.as_str(), f)).collect();
        for mapping in mappings.iter().filter(|m| m.active) {
            let Some(field) = by_id.get(mapping.analyzer_field_id.as_str()) else {
                continue;
            };
            if let Some(expected) = advisory_domain_kinds(field.kind) {
                if !expected.contains(&mapping.domain_kind) {
                    let names: Vec<&str> = expected.iter().map(|k| k.as_str()).collect();
                    metrics.type_warnings.push(format!(
                        "Field '{}' of type {} is mapped to {}; expected one of {}",
                        field.name,
                        field.kind,
                        mapping.domain_kind,
                        names.join(", ")
                    ));
                }
            }
        }

        metrics
    }
}
