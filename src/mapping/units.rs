//! Unit mappings: analyzer unit to domain unit, with an optional conversion factor.

use crate::error::{AppResult, IntegrationError};
use crate::model::UnitMapping;
use crate::repository::{FieldRepository, UnitMappingRepository};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Input for a new unit mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitMappingRequest {
    /// Field the unit belongs to.
    pub analyzer_field_id: String,
    /// Unit as sent.
    pub analyzer_unit: String,
    /// Unit to store.
    pub domain_unit: String,
    /// Multiplier, if the units differ in scale.
    #[serde(default)]
    pub conversion_factor: Option<Decimal>,
    /// Reject rather than convert on mismatch.
    #[serde(default)]
    pub reject_if_mismatch: bool,
}

/// Apply a unit mapping to a raw value and unit.
///
/// Only an exact match on the analyzer unit converts. The factor is applied when
/// present and non-zero; the domain unit replaces the raw unit when non-empty.
pub fn apply_unit_mapping(mapping: &UnitMapping, value: Decimal, unit: &str) -> (Decimal, String) {
    if mapping.analyzer_unit != unit {
        return (value, unit.to_string());
    }
    let value = match mapping.conversion_factor {
        Some(factor) if !factor.is_zero() => value * factor,
        _ => value,
    };
    let unit = if mapping.domain_unit.trim().is_empty() {
        unit.to_string()
    } else {
        mapping.domain_unit.clone()
    };
    (value, unit)
}

/// Creates and lists unit mappings.
pub struct UnitMappingService {
    unit_mappings: Arc<dyn UnitMappingRepository>,
    fields: Arc<dyn FieldRepository>,
}

impl UnitMappingService {
    /// Service over the given repositories.
    pub fn new(
        unit_mappings: Arc<dyn UnitMappingRepository>,
        fields: Arc<dyn FieldRepository>,
    ) -> Self {
        Self {
            unit_mappings,
            fields,
        }
    }

    /// Validate and store a unit mapping for an existing field.
    pub async fn create_unit_mapping(&self, request: UnitMappingRequest) -> AppResult<UnitMapping> {
        let analyzer_unit = request.analyzer_unit.trim();
        let domain_unit = request.domain_unit.trim();
        if analyzer_unit.is_empty() {
            return Err(IntegrationError::Validation(
                "Analyzer unit is required".to_string(),
            ));
        }
        if domain_unit.is_empty() {
            return Err(IntegrationError::Validation(
                "Domain unit is required".to_string(),
            ));
        }
        if self.fields.get(&request.analyzer_field_id).await?.is_none() {
            return Err(IntegrationError::not_found(
                "AnalyzerField",
                request.analyzer_field_id,
            ));
        }

        let same_unit = analyzer_unit.eq_ignore_ascii_case(domain_unit);
        if let Some(factor) = request.conversion_factor {
            if factor <= Decimal::ZERO {
                return Err(IntegrationError::Validation(
                    "Conversion factor must be greater than zero".to_string(),
                ));
            }
        } else if !same_unit && !request.reject_if_mismatch {
            return Err(IntegrationError::Validation(format!(
                "Conversion factor is required when units don't match (analyzer: {analyzer_unit}, domain: {domain_unit})"
            )));
        }

        let mapping = UnitMapping {
            id: Uuid::new_v4().to_string(),
            analyzer_field_id: request.analyzer_field_id.clone(),
            analyzer_unit: analyzer_unit.to_string(),
            domain_unit: domain_unit.to_string(),
            conversion_factor: request.conversion_factor,
            reject_if_mismatch: request.reject_if_mismatch,
            created_at: Utc::now(),
        };
        self.unit_mappings.save(mapping.clone()).await?;
        info!(
            field_id = %mapping.analyzer_field_id,
            "Unit mapping {} -> {} created",
            mapping.analyzer_unit,
            mapping.domain_unit
        );
        Ok(mapping)
    }

    /// Unit mappings of one field.
    pub async fn get_unit_mappings(&self, analyzer_field_id: &str) -> AppResult<Vec<UnitMapping>> {
        self.unit_mappings.find_by_field(analyzer_field_id).await
    }
}
