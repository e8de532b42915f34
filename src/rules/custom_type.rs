//! Custom field types: operator-defined value profiles for CUSTOM fields.

use super::evaluator::{full_match_regex, in_range, parse_decimal};
use crate::error::{AppResult, IntegrationError};
use crate::model::CustomFieldType;
use crate::repository::CustomFieldTypeRepository;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Check a value against a type's pattern, range and character set.
///
/// Empty values never pass. The range only applies to values that read as numbers.
pub fn validate_field_value(value: &str, field_type: &CustomFieldType) -> AppResult<bool> {
    if value.is_empty() {
        return Ok(false);
    }

    if let Some(pattern) = field_type.validation_pattern.as_deref().filter(|p| !p.is_empty()) {
        let re = full_match_regex(pattern).map_err(|e| {
            IntegrationError::Validation(format!("Invalid regex pattern in custom field type: {e}"))
        })?;
        if !re.is_match(value) {
            return Ok(false);
        }
    }

    if field_type.value_range_min.is_some() || field_type.value_range_max.is_some() {
        if let Some(number) = parse_decimal(value) {
            if !in_range(number, field_type.value_range_min, field_type.value_range_max) {
                return Ok(false);
            }
        }
    }

    if let Some(allowed) = field_type.allowed_characters.as_deref().filter(|a| !a.is_empty()) {
        if !value.chars().all(|c| allowed.contains(c)) {
            return Ok(false);
        }
    }

    Ok(true)
}

fn check_profile(field_type: &CustomFieldType) -> AppResult<()> {
    if field_type.type_name.trim().is_empty() {
        return Err(IntegrationError::Validation("Type name is required".to_string()));
    }
    if let Some(pattern) = field_type.validation_pattern.as_deref().filter(|p| !p.is_empty()) {
        full_match_regex(pattern)
            .map_err(|e| IntegrationError::Validation(format!("Invalid regex pattern: {e}")))?;
    }
    if let (Some(min), Some(max)) = (field_type.value_range_min, field_type.value_range_max) {
        if min > max {
            return Err(IntegrationError::Validation(
                "Value range minimum cannot be greater than maximum".to_string(),
            ));
        }
    }
    Ok(())
}

/// Stores custom field types. Type names are unique.
pub struct CustomFieldTypeService {
    types: Arc<dyn CustomFieldTypeRepository>,
}

impl CustomFieldTypeService {
    /// Service over `types`.
    pub fn new(types: Arc<dyn CustomFieldTypeRepository>) -> Self {
        Self { types }
    }

    /// Store a new type after checking its profile and name.
    pub async fn create(&self, mut field_type: CustomFieldType) -> AppResult<CustomFieldType> {
        check_profile(&field_type)?;
        if self.types.find_by_name(&field_type.type_name).await?.is_some() {
            return Err(IntegrationError::Validation(format!(
                "Custom field type with name '{}' already exists",
                field_type.type_name
            )));
        }
        field_type.updated_at = Utc::now();
        self.types.save(field_type.clone()).await?;
        info!(type_name = %field_type.type_name, "Created custom field type");
        Ok(field_type)
    }

    /// Replace an existing type. The name may not collide with another type.
    pub async fn update(&self, mut field_type: CustomFieldType) -> AppResult<CustomFieldType> {
        if self.types.get(&field_type.id).await?.is_none() {
            return Err(IntegrationError::not_found("CustomFieldType", field_type.id.clone()));
        }
        check_profile(&field_type)?;
        if let Some(existing) = self.types.find_by_name(&field_type.type_name).await? {
            if existing.id != field_type.id {
                return Err(IntegrationError::Validation(format!(
                    "Custom field type with name '{}' already exists",
                    field_type.type_name
                )));
            }
        }
        field_type.updated_at = Utc::now();
        self.types.save(field_type.clone()).await?;
        Ok(field_type)
    }

    /// Look up one type. Fails with NotFound.
    pub async fn get(&self, id: &str) -> AppResult<CustomFieldType> {
        self.types
            .get(id)
            .await?
            .ok_or_else(|| IntegrationError::not_found("CustomFieldType", id))
    }

    /// Active types.
    pub async fn active_types(&self) -> AppResult<Vec<CustomFieldType>> {
        let mut types: Vec<CustomFieldType> = self
            .types
            .list()
            .await?
            .into_iter()
            .filter(|t| t.active)
            .collect();
        types.sort_by(|a, b| a.type_name.cmp(&b.type_name));
        Ok(types)
    }
}
