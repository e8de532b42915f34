//! Custom field types and the validation rules attached to them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operator-defined value profile for CUSTOM fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFieldType {
    /// Stable identifier.
    pub id: String,
    /// Unique across all custom types
    pub type_name: String,
    /// Label shown to operators.
    pub display_name: String,
    /// Whole-value regex
    pub validation_pattern: Option<String>,
    /// Inclusive lower bound for numeric values.
    pub value_range_min: Option<Decimal>,
    /// Inclusive upper bound for numeric values.
    pub value_range_max: Option<Decimal>,
    /// When set, every character of a value must appear here
    pub allowed_characters: Option<String>,
    /// Inactive types are not offered for new fields.
    pub active: bool,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

impl CustomFieldType {
    /// An active type without constraints.
    pub fn new(
        id: impl Into<String>,
        type_name: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            display_name: display_name.into(),
            validation_pattern: None,
            value_range_min: None,
            value_range_max: None,
            allowed_characters: None,
            active: true,
            updated_at: Utc::now(),
        }
    }
}

/// How a rule's expression is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleType {
    /// Whole-value regular expression.
    Regex,
    /// `{"min": .., "max": ..}`
    Range,
    /// `["A", "B"]`
    Enum,
    /// `{"minLength": .., "maxLength": ..}`
    Length,
}

impl RuleType {
    /// Wire and storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Regex => "REGEX",
            RuleType::Range => "RANGE",
            RuleType::Enum => "ENUM",
            RuleType::Length => "LENGTH",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rule evaluated against values of a custom field type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRuleConfiguration {
    /// Stable identifier.
    pub id: String,
    /// Type the rule belongs to.
    pub custom_field_type_id: String,
    /// Unique within its type.
    pub rule_name: String,
    /// Expression language.
    pub rule_type: RuleType,
    /// Regex source, or a JSON document for RANGE, ENUM and LENGTH
    pub rule_expression: String,
    /// Operator-supplied failure text.
    pub error_message: Option<String>,
    /// Inactive rules are skipped.
    pub active: bool,
}

impl ValidationRuleConfiguration {
    /// An active rule with the default failure message.
    pub fn new(
        id: impl Into<String>,
        custom_field_type_id: impl Into<String>,
        rule_name: impl Into<String>,
        rule_type: RuleType,
        rule_expression: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            custom_field_type_id: custom_field_type_id.into(),
            rule_name: rule_name.into(),
            rule_type,
            rule_expression: rule_expression.into(),
            error_message: None,
            active: true,
        }
    }

    /// Message reported when the rule fails.
    pub fn failure_message(&self) -> String {
        self.error_message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Value failed validation rule '{}'", self.rule_name))
    }
}
