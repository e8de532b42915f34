//! Custom validation rules.
//!
//! [`evaluator`] is stateless and evaluates one rule against one value.
//! [`custom_type`] and [`configuration`] manage the operator-defined profiles and
//! rules, and combine them in [`ValidationRuleService::validate_custom_value`].

pub mod configuration;
pub mod custom_type;
pub mod evaluator;

pub use configuration::ValidationRuleService;
pub use custom_type::{validate_field_value, CustomFieldTypeService};
pub use evaluator::{evaluate_rule, parse_decimal, validate_expression};
