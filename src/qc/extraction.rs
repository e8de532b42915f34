//! Resolve Q segments into QC results.

use crate::error::{AppResult, IntegrationError};
use crate::mapping::apply_unit_mapping;
use crate::model::{ControlLevel, DomainKind, QcResult, QcSegment};
use crate::repository::Repositories;
use crate::rules::parse_decimal;
use chrono::{TimeZone, Utc};
use tracing::debug;

/// Resolves QC segments through the analyzer's QC and TEST mappings.
pub struct QcExtractor {
    repos: Repositories,
}

impl QcExtractor {
    /// Extractor reading from `repos`.
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Domain id of the first active mapping of `kind` on the field named `name`.
    async fn mapped_id(&self, analyzer_id: &str, name: &str, kind: DomainKind) -> AppResult<Option<String>> {
        let Some(field) = self.repos.fields.find_by_name(analyzer_id, name).await? else {
            return Ok(None);
        };
        Ok(self
            .repos
            .mappings
            .find_by_field(&field.id)
            .await?
            .into_iter()
            .find(|m| m.active && m.domain_kind == kind)
            .map(|m| m.domain_field_id))
    }

    /// Resolve a segment against `analyzer_id`'s mappings.
    ///
    /// The test code must name a field with an active TEST mapping and the control
    /// lot a field with an active QC mapping. A unit mapping on the test field that
    /// matches the raw unit exactly converts the value.
    pub async fn extract_qc_result(&self, segment: &QcSegment, analyzer_id: &str) -> AppResult<QcResult> {
        if analyzer_id.trim().is_empty() {
            return Err(IntegrationError::Validation(
                "Analyzer ID cannot be empty".to_string(),
            ));
        }
        if segment.control_level.trim().is_empty() {
            return Err(IntegrationError::Validation(
                "Control level cannot be empty".to_string(),
            ));
        }
        let control_level = ControlLevel::from_code(&segment.control_level).ok_or_else(|| {
            IntegrationError::Validation(format!(
                "Invalid control level: {}. Must be L, N, or H",
                segment.control_level
            ))
        })?;

        let test_id = self
            .mapped_id(analyzer_id, &segment.test_code, DomainKind::Test)
            .await?
            .ok_or_else(|| {
                IntegrationError::QcProcessing(format!(
                    "No mapping found for test code: {}",
                    segment.test_code
                ))
            })?;
        let control_lot_id = self
            .mapped_id(analyzer_id, &segment.control_lot_number, DomainKind::Qc)
            .await?
            .ok_or_else(|| {
                IntegrationError::QcProcessing(format!(
                    "No mapping found for control lot number: {}",
                    segment.control_lot_number
                ))
            })?;

        let raw_value = parse_decimal(&segment.result_value).ok_or_else(|| {
            IntegrationError::Validation(format!("Invalid result value: {}", segment.result_value))
        })?;

        let unit = segment.unit.trim();
        let (result_value, unit) = self
            .convert_unit(analyzer_id, &segment.test_code, raw_value, unit)
            .await?;

        Ok(QcResult {
            analyzer_id: analyzer_id.to_string(),
            test_id,
            control_lot_id,
            control_level,
            result_value,
            unit,
            timestamp: Utc.from_utc_datetime(&segment.timestamp),
        })
    }

    async fn convert_unit(
        &self,
        analyzer_id: &str,
        test_code: &str,
        value: rust_decimal::Decimal,
        unit: &str,
    ) -> AppResult<(rust_decimal::Decimal, String)> {
        if unit.is_empty() {
            return Ok((value, String::new()));
        }
        let Some(field) = self.repos.fields.find_by_name(analyzer_id, test_code).await? else {
            return Ok((value, unit.to_string()));
        };
        let mappings = self.repos.unit_mappings.find_by_field(&field.id).await?;
        match mappings.iter().find(|m| m.analyzer_unit == unit) {
            Some(mapping) => {
                debug!(test_code, from = unit, to = %mapping.domain_unit, "Converting QC unit");
                Ok(apply_unit_mapping(mapping, value, unit))
            }
            None => Ok((value, unit.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AnalyzerField, FieldKind, FieldMapping, MappingRequest, MappingType, UnitMapping,
    };
    use crate::repository::{FieldRepository, MappingRepository, MemoryStore, UnitMappingRepository};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn segment(level: &str, value: &str, unit: &str) -> QcSegment {
        QcSegment {
            instrument_id: Some("ACME".into()),
            test_code: "GLU".into(),
            control_lot_number: "LOT123".into(),
            control_level: level.into(),
            result_value: value.into(),
            unit: unit.into(),
            timestamp: NaiveDate::from_ymd_opt(2025, 1, 15)
                .and_then(|d| d.and_hms_opt(9, 30, 0))
                .unwrap(),
        }
    }

    async fn mapped_store() -> (Arc<MemoryStore>, String) {
        let store = Arc::new(MemoryStore::new());
        let glu = AnalyzerField::new("a-1", "GLU", "Q|^^^GLU", FieldKind::Numeric, Some("mg/dL".into()));
        let lot = AnalyzerField::new("a-1", "LOT123", "Q|lot", FieldKind::ControlTest, None);
        FieldRepository::save(store.as_ref(), glu.clone()).await.unwrap();
        FieldRepository::save(store.as_ref(), lot.clone()).await.unwrap();

        let mut test = FieldMapping::from_request(
            "a-1",
            &MappingRequest::new(glu.id.clone(), "test-glucose", DomainKind::Test, MappingType::TestLevel),
        );
        test.active = true;
        let mut qc = FieldMapping::from_request(
            "a-1",
            &MappingRequest::new(lot.id.clone(), "lot-123", DomainKind::Qc, MappingType::Metadata),
        );
        qc.active = true;
        MappingRepository::insert(store.as_ref(), test).await.unwrap();
        MappingRepository::insert(store.as_ref(), qc).await.unwrap();
        (store, glu.id)
    }

    #[tokio::test]
    async fn test_extracts_mapped_segment() {
        let (store, _) = mapped_store().await;
        let extractor = QcExtractor::new(Repositories::from_store(store));
        let result = extractor
            .extract_qc_result(&segment(" n ", "98", "mg/dL"), "a-1")
            .await
            .unwrap();
        assert_eq!(result.test_id, "test-glucose");
        assert_eq!(result.control_lot_id, "lot-123");
        assert_eq!(result.control_level, ControlLevel::Normal);
        assert_eq!(result.result_value, Decimal::from(98));
        assert_eq!(result.unit, "mg/dL");
        assert_eq!(result.timestamp.to_rfc3339(), "2025-01-15T09:30:00+00:00");
    }

    #[tokio::test]
    async fn test_applies_matching_unit_mapping() {
        let (store, glu_id) = mapped_store().await;
        UnitMappingRepository::save(
            store.as_ref(),
            UnitMapping {
                id: "u-1".into(),
                analyzer_field_id: glu_id,
                analyzer_unit: "mg/dL".into(),
                domain_unit: "mmol/L".into(),
                conversion_factor: Some(Decimal::new(5551, 5)),
                reject_if_mismatch: false,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        let extractor = QcExtractor::new(Repositories::from_store(store));

        let converted = extractor
            .extract_qc_result(&segment("N", "100", "mg/dL"), "a-1")
            .await
            .unwrap();
        assert_eq!(converted.result_value, Decimal::new(5551, 3));
        assert_eq!(converted.unit, "mmol/L");

        // Unit match is exact.
        let untouched = extractor
            .extract_qc_result(&segment("N", "100", "MG/DL"), "a-1")
            .await
            .unwrap();
        assert_eq!(untouched.result_value, Decimal::from(100));
        assert_eq!(untouched.unit, "MG/DL");
    }

    #[tokio::test]
    async fn test_rejects_bad_level_value_and_unmapped_codes() {
        let (store, _) = mapped_store().await;
        let extractor = QcExtractor::new(Repositories::from_store(store));

        let err = extractor
            .extract_qc_result(&segment("X", "98", ""), "a-1")
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Validation(_)));
        assert!(err.to_string().contains("Invalid control level: X"));

        let err = extractor
            .extract_qc_result(&segment("L", "high", ""), "a-1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid result value: high"));

        let mut unknown = segment("L", "98", "");
        unknown.test_code = "NA".into();
        let err = extractor.extract_qc_result(&unknown, "a-1").await.unwrap_err();
        assert!(matches!(err, IntegrationError::QcProcessing(_)));
        assert!(err.to_string().contains("No mapping found for test code: NA"));

        let mut lot = segment("L", "98", "");
        lot.control_lot_number = "LOT999".into();
        let err = extractor.extract_qc_result(&lot, "a-1").await.unwrap_err();
        assert!(err.to_string().contains("control lot number: LOT999"));
    }
}
