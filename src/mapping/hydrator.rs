//! Attach analyzer fields to mappings with one batch lookup.

use crate::error::AppResult;
use crate::model::{AnalyzerField, FieldMapping};
use crate::repository::FieldRepository;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A mapping together with the field it maps, when the field still exists.
#[derive(Debug, Clone, Serialize)]
pub struct MappingView {
    /// The mapping.
    pub mapping: FieldMapping,
    /// Its source field.
    pub field: Option<AnalyzerField>,
}

impl MappingView {
    /// Name of the source field.
    pub fn field_name(&self) -> Option<&str> {
        self.field.as_ref().map(|f| f.name.as_str())
    }
}

/// Resolves source fields for batches of mappings.
#[derive(Clone)]
pub struct MappingHydrator {
    fields: Arc<dyn FieldRepository>,
}

impl MappingHydrator {
    /// Hydrator reading from `fields`.
    pub fn new(fields: Arc<dyn FieldRepository>) -> Self {
        Self { fields }
    }

    /// Pair each mapping with its field, in input order. Fields are fetched in one
    /// lookup.
    pub async fn hydrate(&self, mappings: Vec<FieldMapping>) -> AppResult<Vec<MappingView>> {
        let mut ids: Vec<String> = mappings
            .iter()
            .map(|m| m.analyzer_field_id.clone())
            .collect();
        ids.sort();
        ids.dedup();

        let by_id: HashMap<String, AnalyzerField> = self
            .fields
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();

        Ok(mappings
            .into_iter()
            .map(|mapping| {
                let field = by_id.get(&mapping.analyzer_field_id).cloned();
                MappingView { mapping, field }
            })
            .collect())
    }
}
