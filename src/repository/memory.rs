//! In-memory implementation of every repository trait.
//!
//! One `parking_lot::RwLock` per table. No lock is held across an `.await`; every
//! method takes the lock, copies what it needs and releases it before returning.

use super::{
    AnalyzerRepository, CustomFieldTypeRepository, ErrorRepository, FieldRepository,
    MappingRepository, QualitativeMappingRepository, UnitMappingRepository,
    ValidationRuleRepository,
};
use crate::error::{AppResult, IntegrationError};
use crate::model::{
    Analyzer, AnalyzerError, AnalyzerField, AnalyzerStatus, CustomFieldType, ErrorFilter,
    ErrorStatus, FieldMapping, QualitativeValueMapping, UnitMapping, ValidationRuleConfiguration,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Every repository in one process-local store.
///
/// Each collection sits behind its own `RwLock`; compare-and-swap writes take the
/// write lock for the whole check.
#[derive(Default)]
pub struct MemoryStore {
    analyzers: RwLock<HashMap<String, Analyzer>>,
    fields: RwLock<HashMap<String, AnalyzerField>>,
    mappings: RwLock<HashMap<String, FieldMapping>>,
    unit_mappings: RwLock<Vec<UnitMapping>>,
    qualitative_mappings: RwLock<Vec<QualitativeValueMapping>>,
    errors: RwLock<Vec<AnalyzerError>>,
    custom_types: RwLock<HashMap<String, CustomFieldType>>,
    rules: RwLock<HashMap<String, ValidationRuleConfiguration>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl AnalyzerRepository for MemoryStore {
    async fn get(&self, id: &str) -> AppResult<Option<Analyzer>> {
        Ok(self.analyzers.read().get(id).cloned())
    }

    async fn list(&self) -> AppResult<Vec<Analyzer>> {
        let all = self.analyzers.read().values().cloned().collect();
        Ok(sorted_by(all, |a: &Analyzer| a.id.clone()))
    }

    async fn find_by_status(&self, status: AnalyzerStatus) -> AppResult<Vec<Analyzer>> {
        let matching = self
            .analyzers
            .read()
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect();
        Ok(sorted_by(matching, |a: &Analyzer| a.id.clone()))
    }

    async fn save(&self, analyzer: Analyzer) -> AppResult<()> {
        self.analyzers.write().insert(analyzer.id.clone(), analyzer);
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        expected: AnalyzerStatus,
        new: AnalyzerStatus,
        last_activated: Option<DateTime<Utc>>,
    ) -> AppResult<Analyzer> {
        let mut analyzers = self.analyzers.write();
        let analyzer = analyzers
            .get_mut(id)
            .ok_or_else(|| IntegrationError::not_found("Analyzer", id))?;
        if analyzer.status != expected {
            return Err(IntegrationError::conflict("Analyzer", id));
        }
        analyzer.status = new;
        if let Some(ts) = last_activated {
            analyzer.last_activated = Some(ts);
        }
        analyzer.updated_at = Utc::now();
        Ok(analyzer.clone())
    }
}

#[async_trait]
impl FieldRepository for MemoryStore {
    async fn get(&self, id: &str) -> AppResult<Option<AnalyzerField>> {
        Ok(self.fields.read().get(id).cloned())
    }

    async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<AnalyzerField>> {
        let fields = self.fields.read();
        Ok(ids.iter().filter_map(|id| fields.get(id).cloned()).collect())
    }

    async fn find_by_analyzer(&self, analyzer_id: &str) -> AppResult<Vec<AnalyzerField>> {
        let matching = self
            .fields
            .read()
            .values()
            .filter(|f| f.analyzer_id == analyzer_id)
            .cloned()
            .collect();
        Ok(sorted_by(matching, |f: &AnalyzerField| f.created_at))
    }

    async fn find_by_name(
        &self,
        analyzer_id: &str,
        name: &str,
    ) -> AppResult<Option<AnalyzerField>> {
        Ok(self
            .fields
            .read()
            .values()
            .find(|f| f.analyzer_id == analyzer_id && f.name == name)
            .cloned())
    }

    async fn find_by_astm_ref(
        &self,
        analyzer_id: &str,
        astm_ref: &str,
    ) -> AppResult<Option<AnalyzerField>> {
        Ok(self
            .fields
            .read()
            .values()
            .find(|f| f.analyzer_id == analyzer_id && f.astm_ref == astm_ref)
            .cloned())
    }

    async fn save(&self, field: AnalyzerField) -> AppResult<()> {
        self.fields.write().insert(field.id.clone(), field);
        Ok(())
    }
}

#[async_trait]
impl MappingRepository for MemoryStore {
    async fn get(&self, id: &str) -> AppResult<Option<FieldMapping>> {
        Ok(self.mappings.read().get(id).cloned())
    }

    async fn find_by_analyzer(&self, analyzer_id: &str) -> AppResult<Vec<FieldMapping>> {
        let matching = self
            .mappings
            .read()
            .values()
            .filter(|m| m.analyzer_id == analyzer_id)
            .cloned()
            .collect();
        Ok(sorted_by(matching, |m: &FieldMapping| m.id.clone()))
    }

    async fn find_by_field(&self, analyzer_field_id: &str) -> AppResult<Vec<FieldMapping>> {
        let matching = self
            .mappings
            .read()
            .values()
            .filter(|m| m.analyzer_field_id == analyzer_field_id)
            .cloned()
            .collect();
        Ok(sorted_by(matching, |m: &FieldMapping| m.id.clone()))
    }

    async fn insert(&self, mapping: FieldMapping) -> AppResult<FieldMapping> {
        let mut mappings = self.mappings.write();
        if mappings.contains_key(&mapping.id) {
            return Err(IntegrationError::Validation(format!(
                "Mapping {} already exists",
                mapping.id
            )));
        }
        mappings.insert(mapping.id.clone(), mapping.clone());
        Ok(mapping)
    }

    async fn save_if_unchanged(
        &self,
        mut mapping: FieldMapping,
        expected_version: u64,
    ) -> AppResult<FieldMapping> {
        let mut mappings = self.mappings.write();
        let stored = mappings
            .get(&mapping.id)
            .ok_or_else(|| IntegrationError::not_found("Mapping", mapping.id.clone()))?;
        if stored.version != expected_version {
            return Err(IntegrationError::conflict("Mapping", mapping.id.clone()));
        }
        mapping.version = expected_version + 1;
        mapping.last_updated = Utc::now();
        mappings.insert(mapping.id.clone(), mapping.clone());
        Ok(mapping)
    }

    async fn save_all_if_unchanged(
        &self,
        analyzer_id: &str,
        updates: Vec<(FieldMapping, u64)>,
    ) -> AppResult<Vec<FieldMapping>> {
        let mut mappings = self.mappings.write();

        for (mapping, expected_version) in &updates {
            let stored = mappings
                .get(&mapping.id)
                .ok_or_else(|| IntegrationError::not_found("Mapping", mapping.id.clone()))?;
            if stored.analyzer_id != analyzer_id || mapping.analyzer_id != analyzer_id {
                return Err(IntegrationError::Validation(format!(
                    "Mapping {} does not belong to analyzer {}",
                    mapping.id, analyzer_id
                )));
            }
            if stored.version != *expected_version {
                return Err(IntegrationError::conflict("Mapping", mapping.id.clone()));
            }
        }

        let now = Utc::now();
        let saved: Vec<FieldMapping> = updates
            .into_iter()
            .map(|(mut mapping, expected_version)| {
                mapping.version = expected_version + 1;
                mapping.last_updated = now;
                mapping
            })
            .collect();
        for mapping in &saved {
            mappings.insert(mapping.id.clone(), mapping.clone());
        }
        Ok(saved)
    }
}

#[async_trait]
impl UnitMappingRepository for MemoryStore {
    async fn find_by_field(&self, analyzer_field_id: &str) -> AppResult<Vec<UnitMapping>> {
        Ok(self
            .unit_mappings
            .read()
            .iter()
            .filter(|m| m.analyzer_field_id == analyzer_field_id)
            .cloned()
            .collect())
    }

    async fn save(&self, mapping: UnitMapping) -> AppResult<()> {
        let mut all = self.unit_mappings.write();
        match all.iter_mut().find(|m| m.id == mapping.id) {
            Some(existing) => *existing = mapping,
            None => all.push(mapping),
        }
        Ok(())
    }
}

#[async_trait]
impl QualitativeMappingRepository for MemoryStore {
    async fn find_by_field(
        &self,
        analyzer_field_id: &str,
    ) -> AppResult<Vec<QualitativeValueMapping>> {
        Ok(self
            .qualitative_mappings
            .read()
            .iter()
            .filter(|m| m.analyzer_field_id == analyzer_field_id)
            .cloned()
            .collect())
    }

    async fn save(&self, mapping: QualitativeValueMapping) -> AppResult<()> {
        let mut all = self.qualitative_mappings.write();
        match all.iter_mut().find(|m| m.id == mapping.id) {
            Some(existing) => *existing = mapping,
            None => all.push(mapping),
        }
        Ok(())
    }
}

#[async_trait]
impl ErrorRepository for MemoryStore {
    async fn get(&self, id: &str) -> AppResult<Option<AnalyzerError>> {
        Ok(self.errors.read().iter().find(|e| e.id == id).cloned())
    }

    async fn insert(&self, error: AnalyzerError) -> AppResult<()> {
        self.errors.write().push(error);
        Ok(())
    }

    async fn update(&self, error: AnalyzerError) -> AppResult<()> {
        let mut errors = self.errors.write();
        let slot = errors
            .iter_mut()
            .find(|e| e.id == error.id)
            .ok_or_else(|| IntegrationError::not_found("AnalyzerError", error.id.clone()))?;
        *slot = error;
        Ok(())
    }

    async fn find(&self, filter: &ErrorFilter) -> AppResult<Vec<AnalyzerError>> {
        Ok(self
            .errors
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn count_unacknowledged(&self, analyzer_id: &str) -> AppResult<usize> {
        Ok(self
            .errors
            .read()
            .iter()
            .filter(|e| e.analyzer_id == analyzer_id && e.status == ErrorStatus::Unacknowledged)
            .count())
    }
}

#[async_trait]
impl CustomFieldTypeRepository for MemoryStore {
    async fn get(&self, id: &str) -> AppResult<Option<CustomFieldType>> {
        Ok(self.custom_types.read().get(id).cloned())
    }

    async fn find_by_name(&self, type_name: &str) -> AppResult<Option<CustomFieldType>> {
        Ok(self
            .custom_types
            .read()
            .values()
            .find(|t| t.type_name == type_name)
            .cloned())
    }

    async fn list(&self) -> AppResult<Vec<CustomFieldType>> {
        let all = self.custom_types.read().values().cloned().collect();
        Ok(sorted_by(all, |t: &CustomFieldType| t.type_name.clone()))
    }

    async fn save(&self, field_type: CustomFieldType) -> AppResult<()> {
        self.custom_types
            .write()
            .insert(field_type.id.clone(), field_type);
        Ok(())
    }
}

#[async_trait]
impl ValidationRuleRepository for MemoryStore {
    async fn get(&self, id: &str) -> AppResult<Option<ValidationRuleConfiguration>> {
        Ok(self.rules.read().get(id).cloned())
    }

    async fn find_by_field_type(
        &self,
        custom_field_type_id: &str,
    ) -> AppResult<Vec<ValidationRuleConfiguration>> {
        let matching = self
            .rules
            .read()
            .values()
            .filter(|r| r.custom_field_type_id == custom_field_type_id)
            .cloned()
            .collect();
        Ok(sorted_by(matching, |r: &ValidationRuleConfiguration| {
            r.rule_name.clone()
        }))
    }

    async fn save(&self, rule: ValidationRuleConfiguration) -> AppResult<()> {
        self.rules.write().insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.rules.write().remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DomainKind, MappingRequest, MappingType};

    fn mapping(analyzer: &str) -> FieldMapping {
        let req = MappingRequest::new("f-1", "glucose", DomainKind::Test, MappingType::TestLevel);
        FieldMapping::from_request(analyzer, &req)
    }

    #[tokio::test]
    async fn test_cas_bumps_version() {
        let store = MemoryStore::new();
        let m = MappingRepository::insert(&store, mapping("a-1")).await.expect("insert");
        let saved = store.save_if_unchanged(m.clone(), 0).await.expect("cas");
        assert_eq!(saved.version, 1);

        let err = store.save_if_unchanged(m, 0).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        let a = MappingRepository::insert(&store, mapping("a-1")).await.expect("insert");
        let b = MappingRepository::insert(&store, mapping("a-1")).await.expect("insert");
        // b moves on behind the batch's back
        store.save_if_unchanged(b.clone(), 0).await.expect("cas");

        let mut a_active = a.clone();
        a_active.active = true;
        let mut b_active = b.clone();
        b_active.active = true;
        let err = store
            .save_all_if_unchanged("a-1", vec![(a_active, 0), (b_active, 0)])
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let stored = MappingRepository::get(&store, &a.id).await.expect("get");
        assert_eq!(stored.map(|m| m.active), Some(false));
    }

    #[tokio::test]
    async fn test_batch_rejects_foreign_mapping() {
        let store = MemoryStore::new();
        let foreign = MappingRepository::insert(&store, mapping("a-2")).await.expect("insert");
        let err = store
            .save_all_if_unchanged("a-1", vec![(foreign, 0)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not belong to analyzer a-1"));
    }

    #[tokio::test]
    async fn test_status_update_checks_expected() {
        let store = MemoryStore::new();
        AnalyzerRepository::save(&store, Analyzer::new("a-1", "Chem"))
            .await
            .expect("save");
        let err = store
            .update_status("a-1", AnalyzerStatus::Setup, AnalyzerStatus::Validation, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        let updated = store
            .update_status("a-1", AnalyzerStatus::Inactive, AnalyzerStatus::Setup, None)
            .await
            .expect("update");
        assert_eq!(updated.status, AnalyzerStatus::Setup);
    }
}
