//! Qualitative value mappings (`POS` -> coded value).

use crate::error::{AppResult, IntegrationError};
use crate::model::QualitativeValueMapping;
use crate::repository::{FieldRepository, QualitativeMappingRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Input for a new qualitative value mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitativeMappingRequest {
    /// Field the value belongs to.
    pub analyzer_field_id: String,
    /// Raw token. Unique per field, ignoring case.
    pub analyzer_value: String,
    /// Coded value to store.
    pub domain_code: String,
    /// Use when no other token matches.
    #[serde(default)]
    pub is_default: bool,
}

/// Creates and applies qualitative value mappings.
pub struct QualitativeMappingService {
    mappings: Arc<dyn QualitativeMappingRepository>,
    fields: Arc<dyn FieldRepository>,
}

impl QualitativeMappingService {
    /// Service over the given repositories.
    pub fn new(
        mappings: Arc<dyn QualitativeMappingRepository>,
        fields: Arc<dyn FieldRepository>,
    ) -> Self {
        Self { mappings, fields }
    }

    /// Validate and store a value mapping.
    ///
    /// Rejects blank input, unknown fields and a token the field already maps.
    pub async fn create(
        &self,
        request: QualitativeMappingRequest,
    ) -> AppResult<QualitativeValueMapping> {
        if request.analyzer_field_id.trim().is_empty() {
            return Err(IntegrationError::Validation(
                "Analyzer field is required".to_string(),
            ));
        }
        let value = request.analyzer_value.trim();
        if value.is_empty() {
            return Err(IntegrationError::Validation(
                "Analyzer value is required".to_string(),
            ));
        }
        if self.fields.get(&request.analyzer_field_id).await?.is_none() {
            return Err(IntegrationError::not_found(
                "AnalyzerField",
                request.analyzer_field_id,
            ));
        }

        let existing = self.mappings.find_by_field(&request.analyzer_field_id).await?;
        if existing
            .iter()
            .any(|m| m.analyzer_value.eq_ignore_ascii_case(value))
        {
            return Err(IntegrationError::Validation(format!(
                "Duplicate analyzer value '{}' already exists for analyzer field: {}",
                value, request.analyzer_field_id
            )));
        }
        if request.is_default && existing.iter().any(|m| m.is_default) {
            return Err(IntegrationError::Validation(format!(
                "A default value mapping already exists for analyzer field: {}",
                request.analyzer_field_id
            )));
        }

        let mapping = QualitativeValueMapping {
            id: Uuid::new_v4().to_string(),
            analyzer_field_id: request.analyzer_field_id,
            analyzer_value: value.to_string(),
            domain_code: request.domain_code.trim().to_string(),
            is_default: request.is_default,
        };
        self.mappings.save(mapping.clone()).await?;
        Ok(mapping)
    }

    /// Value mappings of one field.
    pub async fn list(&self, analyzer_field_id: &str) -> AppResult<Vec<QualitativeValueMapping>> {
        self.mappings.find_by_field(analyzer_field_id).await
    }

    /// Coded value for a raw token, falling back to the field's default mapping.
    pub async fn translate(&self, analyzer_field_id: &str, raw: &str) -> AppResult<Option<String>> {
        let mappings = self.mappings.find_by_field(analyzer_field_id).await?;
        let raw = raw.trim();
        let hit = mappings
            .iter()
            .find(|m| m.analyzer_value.eq_ignore_ascii_case(raw))
            .or_else(|| mappings.iter().find(|m| m.is_default));
        Ok(hit.map(|m| m.domain_code.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalyzerField, FieldKind};
    use crate::repository::MemoryStore;

    async fn service() -> (QualitativeMappingService, String) {
        let store = Arc::new(MemoryStore::new());
        let field = AnalyzerField::new("a-1", "HIV", "^^^HIV", FieldKind::Qualitative, None);
        let id = field.id.clone();
        FieldRepository::save(store.as_ref(), field).await.expect("seed");
        (QualitativeMappingService::new(store.clone(), store), id)
    }

    fn request(field: &str, value: &str, code: &str, is_default: bool) -> QualitativeMappingRequest {
        QualitativeMappingRequest {
            analyzer_field_id: field.to_string(),
            analyzer_value: value.to_string(),
            domain_code: code.to_string(),
            is_default,
        }
    }

    #[tokio::test]
    async fn test_duplicate_is_case_insensitive() {
        let (svc, field) = service().await;
        svc.create(request(&field, "POS", "POSITIVE", false)).await.expect("first");
        let err = svc.create(request(&field, "pos", "POSITIVE", false)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Validation error: Duplicate analyzer value 'pos' already exists for analyzer field: {field}")
        );
    }

    #[tokio::test]
    async fn test_translate_with_default() {
        let (svc, field) = service().await;
        svc.create(request(&field, "POS", "POSITIVE", false)).await.expect("pos");
        svc.create(request(&field, "NEG", "NEGATIVE", true)).await.expect("neg");

        assert_eq!(svc.translate(&field, "pos").await.expect("ok").as_deref(), Some("POSITIVE"));
        assert_eq!(svc.translate(&field, "???").await.expect("ok").as_deref(), Some("NEGATIVE"));
        assert_eq!(svc.list(&field).await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn test_blank_value_rejected() {
        let (svc, field) = service().await;
        assert!(svc.create(request(&field, "  ", "X", false)).await.is_err());
    }
}
