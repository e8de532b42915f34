//! Storage seams.
//!
//! Services depend on these narrow traits only. [`MemoryStore`] implements all of
//! them and is what the binary and the tests run against; a database-backed
//! implementation plugs in behind the same traits.
//!
//! ## Concurrency contract
//!
//! - `MappingRepository::save_if_unchanged` is a compare-and-swap on the stored
//!   version. On success the stored copy has `version + 1` and a fresh
//!   `last_updated`.
//! - `MappingRepository::save_all_if_unchanged` applies a batch under one lock:
//!   every mapping must still belong to the analyzer and still carry its expected
//!   version, or nothing is written.
//! - `AnalyzerRepository::update_status` only writes when the stored status is the
//!   one the caller read.

pub mod memory;
pub mod results;

pub use memory::MemoryStore;
pub use results::{MemoryResultStore, ResultStore, ResultTransaction};

use crate::error::AppResult;
use crate::model::{
    Analyzer, AnalyzerError, AnalyzerField, AnalyzerStatus, CustomFieldType, ErrorFilter,
    FieldMapping, QualitativeValueMapping, UnitMapping, ValidationRuleConfiguration,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Registered analyzers.
#[async_trait]
pub trait AnalyzerRepository: Send + Sync {
    /// Look up one analyzer.
    async fn get(&self, id: &str) -> AppResult<Option<Analyzer>>;

    /// Every analyzer.
    async fn list(&self) -> AppResult<Vec<Analyzer>>;

    /// Analyzers currently in `status`.
    async fn find_by_status(&self, status: AnalyzerStatus) -> AppResult<Vec<Analyzer>>;

    /// Insert or replace.
    async fn save(&self, analyzer: Analyzer) -> AppResult<()>;

    /// Move `id` from `expected` to `new`. Fails with a conflict if the stored status
    /// is no longer `expected`. `last_activated` is only written when `Some`.
    async fn update_status(
        &self,
        id: &str,
        expected: AnalyzerStatus,
        new: AnalyzerStatus,
        last_activated: Option<DateTime<Utc>>,
    ) -> AppResult<Analyzer>;
}

/// Fields discovered on analyzers.
#[async_trait]
pub trait FieldRepository: Send + Sync {
    /// Look up one field.
    async fn get(&self, id: &str) -> AppResult<Option<AnalyzerField>>;

    /// Batch lookup. Unknown ids are left out of the result.
    async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<AnalyzerField>>;

    /// Fields of one analyzer.
    async fn find_by_analyzer(&self, analyzer_id: &str) -> AppResult<Vec<AnalyzerField>>;

    /// Field of `analyzer_id` with this exact name.
    async fn find_by_name(&self, analyzer_id: &str, name: &str)
        -> AppResult<Option<AnalyzerField>>;

    /// Field of `analyzer_id` at this ASTM record reference.
    async fn find_by_astm_ref(
        &self,
        analyzer_id: &str,
        astm_ref: &str,
    ) -> AppResult<Option<AnalyzerField>>;

    /// Insert or replace.
    async fn save(&self, field: AnalyzerField) -> AppResult<()>;
}

/// Field mappings, versioned for optimistic locking.
#[async_trait]
pub trait MappingRepository: Send + Sync {
    /// Look up one mapping.
    async fn get(&self, id: &str) -> AppResult<Option<FieldMapping>>;

    /// Mappings of one analyzer, drafts included.
    async fn find_by_analyzer(&self, analyzer_id: &str) -> AppResult<Vec<FieldMapping>>;

    /// Mappings whose source is `analyzer_field_id`.
    async fn find_by_field(&self, analyzer_field_id: &str) -> AppResult<Vec<FieldMapping>>;

    /// Store a new mapping as given.
    async fn insert(&self, mapping: FieldMapping) -> AppResult<FieldMapping>;

    /// Compare-and-swap on `expected_version`. Returns the stored copy.
    async fn save_if_unchanged(
        &self,
        mapping: FieldMapping,
        expected_version: u64,
    ) -> AppResult<FieldMapping>;

    /// All-or-nothing batch write. Each entry pairs the new mapping state with the
    /// version it was read at.
    async fn save_all_if_unchanged(
        &self,
        analyzer_id: &str,
        updates: Vec<(FieldMapping, u64)>,
    ) -> AppResult<Vec<FieldMapping>>;
}

/// Unit conversions per field.
#[async_trait]
pub trait UnitMappingRepository: Send + Sync {
    /// Conversions for one field.
    async fn find_by_field(&self, analyzer_field_id: &str) -> AppResult<Vec<UnitMapping>>;

    /// Insert or replace.
    async fn save(&self, mapping: UnitMapping) -> AppResult<()>;
}

/// Qualitative value codes per field.
#[async_trait]
pub trait QualitativeMappingRepository: Send + Sync {
    /// Value mappings for one field.
    async fn find_by_field(
        &self,
        analyzer_field_id: &str,
    ) -> AppResult<Vec<QualitativeValueMapping>>;

    /// Insert or replace.
    async fn save(&self, mapping: QualitativeValueMapping) -> AppResult<()>;
}

/// The error queue's storage.
#[async_trait]
pub trait ErrorRepository: Send + Sync {
    /// Look up one record.
    async fn get(&self, id: &str) -> AppResult<Option<AnalyzerError>>;

    /// Store a new record.
    async fn insert(&self, error: AnalyzerError) -> AppResult<()>;

    /// Replace an existing record. Fails with NotFound for unknown ids.
    async fn update(&self, error: AnalyzerError) -> AppResult<()>;

    /// Matching records, oldest first.
    async fn find(&self, filter: &ErrorFilter) -> AppResult<Vec<AnalyzerError>>;

    /// Open UNACKNOWLEDGED records for one analyzer.
    async fn count_unacknowledged(&self, analyzer_id: &str) -> AppResult<usize>;
}

/// Custom field types.
#[async_trait]
pub trait CustomFieldTypeRepository: Send + Sync {
    /// Look up one type by id.
    async fn get(&self, id: &str) -> AppResult<Option<CustomFieldType>>;

    /// Look up one type by its unique name.
    async fn find_by_name(&self, type_name: &str) -> AppResult<Option<CustomFieldType>>;

    /// Every type.
    async fn list(&self) -> AppResult<Vec<CustomFieldType>>;

    /// Insert or replace.
    async fn save(&self, field_type: CustomFieldType) -> AppResult<()>;
}

/// Validation rules attached to custom field types.
#[async_trait]
pub trait ValidationRuleRepository: Send + Sync {
    /// Look up one rule.
    async fn get(&self, id: &str) -> AppResult<Option<ValidationRuleConfiguration>>;

    /// Rules of one custom field type.
    async fn find_by_field_type(
        &self,
        custom_field_type_id: &str,
    ) -> AppResult<Vec<ValidationRuleConfiguration>>;

    /// Insert or replace.
    async fn save(&self, rule: ValidationRuleConfiguration) -> AppResult<()>;

    /// Returns whether a rule was removed.
    async fn delete(&self, id: &str) -> AppResult<bool>;
}

/// Every repository a service might need, behind shared trait objects.
#[derive(Clone)]
pub struct Repositories {
    /// Analyzer registry.
    pub analyzers: Arc<dyn AnalyzerRepository>,
    /// Analyzer fields.
    pub fields: Arc<dyn FieldRepository>,
    /// Field mappings.
    pub mappings: Arc<dyn MappingRepository>,
    /// Unit conversions.
    pub unit_mappings: Arc<dyn UnitMappingRepository>,
    /// Qualitative value codes.
    pub qualitative_mappings: Arc<dyn QualitativeMappingRepository>,
    /// Error queue records.
    pub errors: Arc<dyn ErrorRepository>,
    /// Custom field types.
    pub custom_types: Arc<dyn CustomFieldTypeRepository>,
    /// Validation rules.
    pub rules: Arc<dyn ValidationRuleRepository>,
}

impl Repositories {
    /// Point every repository at the same in-memory store.
    pub fn from_store(store: Arc<MemoryStore>) -> Self {
        Self {
            analyzers: store.clone(),
            fields: store.clone(),
            mappings: store.clone(),
            unit_mappings: store.clone(),
            qualitative_mappings: store.clone(),
            errors: store.clone(),
            custom_types: store.clone(),
            rules: store,
        }
    }

    /// A fresh, empty in-memory store behind every repository.
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }
}
