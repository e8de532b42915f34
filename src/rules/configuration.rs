//! Validation rule configuration attached to custom field types.

use super::custom_type::validate_field_value;
use super::evaluator::{evaluate_rule, validate_expression};
use crate::error::{AppResult, IntegrationError};
use crate::model::{CustomFieldType, ValidationRuleConfiguration};
use crate::repository::{CustomFieldTypeRepository, ValidationRuleRepository};
use std::sync::Arc;
use tracing::{info, warn};

/// Stores validation rules and applies them to values.
pub struct ValidationRuleService {
    rules: Arc<dyn ValidationRuleRepository>,
    types: Arc<dyn CustomFieldTypeRepository>,
}

impl ValidationRuleService {
    /// Service over the rule and type repositories.
    pub fn new(
        rules: Arc<dyn ValidationRuleRepository>,
        types: Arc<dyn CustomFieldTypeRepository>,
    ) -> Self {
        Self { rules, types }
    }

    async fn load_type(&self, id: &str) -> AppResult<CustomFieldType> {
        self.types
            .get(id)
            .await?
            .ok_or_else(|| IntegrationError::not_found("CustomFieldType", id))
    }

    /// Store a new rule after checking its type exists and its expression parses.
    pub async fn create(&self, rule: ValidationRuleConfiguration) -> AppResult<ValidationRuleConfiguration> {
        self.load_type(&rule.custom_field_type_id).await?;
        if rule.rule_name.trim().is_empty() {
            return Err(IntegrationError::Validation("Rule name is required".to_string()));
        }
        validate_expression(rule.rule_type, &rule.rule_expression)?;
        self.rules.save(rule.clone()).await?;
        info!(
            rule_id = %rule.id,
            "Created {} rule '{}' for custom type {}",
            rule.rule_type, rule.rule_name, rule.custom_field_type_id
        );
        Ok(rule)
    }

    /// Replace an existing rule. Same checks as [`Self::create`].
    pub async fn update(&self, rule: ValidationRuleConfiguration) -> AppResult<ValidationRuleConfiguration> {
        if self.rules.get(&rule.id).await?.is_none() {
            return Err(IntegrationError::not_found("ValidationRule", rule.id.clone()));
        }
        self.load_type(&rule.custom_field_type_id).await?;
        validate_expression(rule.rule_type, &rule.rule_expression)?;
        self.rules.save(rule.clone()).await?;
        Ok(rule)
    }

    /// Remove a rule. Fails with NotFound for unknown ids.
    pub async fn delete(&self, rule_id: &str) -> AppResult<()> {
        if self.rules.delete(rule_id).await? {
            Ok(())
        } else {
            Err(IntegrationError::not_found("ValidationRule", rule_id))
        }
    }

    /// Active rules of one type.
    pub async fn active_rules(&self, field_type_id: &str) -> AppResult<Vec<ValidationRuleConfiguration>> {
        Ok(self
            .rules
            .find_by_field_type(field_type_id)
            .await?
            .into_iter()
            .filter(|r| r.active)
            .collect())
    }

    /// Check a value against a custom type and its active rules.
    ///
    /// Returns the failure messages, empty when the value is accepted. A rule with a
    /// broken expression counts as failed and is logged.
    pub async fn validate_custom_value(&self, field_type_id: &str, value: &str) -> AppResult<Vec<String>> {
        let field_type = self.load_type(field_type_id).await?;
        let mut failures = Vec::new();
        if !validate_field_value(value, &field_type)? {
            failures.push(format!(
                "Value '{}' does not match custom field type '{}'",
                value, field_type.display_name
            ));
        }

        for rule in self.active_rules(field_type_id).await? {
            match evaluate_rule(value, &rule) {
                Ok(true) => {}
                Ok(false) => failures.push(rule.failure_message()),
                Err(e) => {
                    warn!(rule_id = %rule.id, "Error evaluating validation rule: {}", e);
                    failures.push(rule.failure_message());
                }
            }
        }
        Ok(failures)
    }
}
