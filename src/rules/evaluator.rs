//! Stateless evaluation of REGEX, RANGE, ENUM and LENGTH rules.
//!
//! RANGE, ENUM and LENGTH expressions are small JSON documents:
//!
//! ```text
//! RANGE   {"min": 0, "max": 100.5}      inclusive, either bound optional
//! ENUM    ["POS", "NEG", "IND"]         exact membership
//! LENGTH  {"minLength": 2, "maxLength": 8}
//! ```

use crate::error::{AppResult, IntegrationError};
use crate::model::{RuleType, ValidationRuleConfiguration};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;

/// Most compiled patterns kept at once. The oldest entry is dropped first.
pub const REGEX_CACHE_CAPACITY: usize = 256;

#[derive(Default)]
struct RegexCache {
    compiled: HashMap<String, Regex>,
    order: VecDeque<String>,
}

impl RegexCache {
    fn insert(&mut self, pattern: &str, re: Regex) {
        if self.compiled.contains_key(pattern) {
            return;
        }
        while self.order.len() >= REGEX_CACHE_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.compiled.remove(&oldest);
            }
        }
        self.order.push_back(pattern.to_string());
        self.compiled.insert(pattern.to_string(), re);
    }
}

static REGEX_CACHE: Lazy<Mutex<RegexCache>> = Lazy::new(|| Mutex::new(RegexCache::default()));

/// Compile `pattern` anchored at both ends. Recently used patterns are cached.
pub fn full_match_regex(pattern: &str) -> Result<Regex, regex::Error> {
    if let Some(re) = REGEX_CACHE.lock().compiled.get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(&format!("^(?:{pattern})$"))?;
    REGEX_CACHE.lock().insert(pattern, re.clone());
    Ok(re)
}

/// Parse a decimal, accepting scientific notation.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

#[derive(Debug, Deserialize)]
struct RangeExpr {
    #[serde(default)]
    min: Option<Value>,
    #[serde(default)]
    max: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LengthExpr {
    #[serde(default)]
    min_length: Option<usize>,
    #[serde(default)]
    max_length: Option<usize>,
}

fn bound(value: &Option<Value>, name: &str) -> AppResult<Option<Decimal>> {
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(IntegrationError::Validation(format!(
                "Invalid range expression: '{name}' must be a number, found {other}"
            )))
        }
    };
    parse_decimal(&text).map(Some).ok_or_else(|| {
        IntegrationError::Validation(format!(
            "Invalid range expression: '{name}' is not a decimal: {text}"
        ))
    })
}

fn parse_range(expression: &str) -> AppResult<(Option<Decimal>, Option<Decimal>)> {
    let expr: RangeExpr = serde_json::from_str(expression).map_err(|e| {
        IntegrationError::Validation(format!("Invalid JSON format in rule expression: {e}"))
    })?;
    Ok((bound(&expr.min, "min")?, bound(&expr.max, "max")?))
}

fn parse_enum(expression: &str) -> AppResult<Vec<String>> {
    serde_json::from_str(expression).map_err(|e| {
        IntegrationError::Validation(format!("Invalid JSON format in rule expression: {e}"))
    })
}

fn parse_length(expression: &str) -> AppResult<LengthExpr> {
    serde_json::from_str(expression).map_err(|e| {
        IntegrationError::Validation(format!("Invalid JSON format in rule expression: {e}"))
    })
}

/// Inclusive range check.
pub fn in_range(value: Decimal, min: Option<Decimal>, max: Option<Decimal>) -> bool {
    min.map_or(true, |m| value >= m) && max.map_or(true, |m| value <= m)
}

/// Check that a rule expression is well formed for its type.
pub fn validate_expression(rule_type: RuleType, expression: &str) -> AppResult<()> {
    if expression.trim().is_empty() {
        return Err(IntegrationError::Validation(
            "Rule expression is required".to_string(),
        ));
    }
    match rule_type {
        RuleType::Regex => {
            full_match_regex(expression).map_err(|e| {
                IntegrationError::Validation(format!("Invalid regex pattern: {e}"))
            })?;
        }
        RuleType::Range => {
            let (min, max) = parse_range(expression)?;
            if min.is_none() && max.is_none() {
                return Err(IntegrationError::Validation(
                    "Range expression must contain 'min' or 'max'".to_string(),
                ));
            }
        }
        RuleType::Enum => {
            if parse_enum(expression)?.is_empty() {
                return Err(IntegrationError::Validation(
                    "Enum expression must contain at least one value".to_string(),
                ));
            }
        }
        RuleType::Length => {
            let expr = parse_length(expression)?;
            if expr.min_length.is_none() && expr.max_length.is_none() {
                return Err(IntegrationError::Validation(
                    "Length expression must contain 'minLength' or 'maxLength'".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Evaluate one rule against a value.
///
/// A value that cannot be read for the rule (non-numeric under RANGE) fails the rule.
/// A malformed expression is an error.
pub fn evaluate_rule(value: &str, rule: &ValidationRuleConfiguration) -> AppResult<bool> {
    let expression = rule.rule_expression.as_str();
    match rule.rule_type {
        RuleType::Regex => {
            if expression.is_empty() {
                return Ok(true);
            }
            let re = full_match_regex(expression)
                .map_err(|e| IntegrationError::Validation(format!("Invalid regex pattern: {e}")))?;
            Ok(re.is_match(value))
        }
        RuleType::Range => {
            let (min, max) = parse_range(expression)?;
            Ok(parse_decimal(value).is_some_and(|v| in_range(v, min, max)))
        }
        RuleType::Enum => {
            let allowed = parse_enum(expression)?;
            Ok(allowed.iter().any(|a| a == value))
        }
        RuleType::Length => {
            let expr = parse_length(expression)?;
            let len = value.chars().count();
            Ok(expr.min_length.map_or(true, |m| len >= m) && expr.max_length.map_or(true, |m| len <= m))
        }
    }
}
