//! Quality-control segments and resolved QC results.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Control material level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlLevel {
    /// `L`
    Low,
    /// `N`
    Normal,
    /// `H`
    High,
}

impl ControlLevel {
    /// Parse the single-letter wire code. Case-insensitive, surrounding whitespace ignored.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "L" => Some(ControlLevel::Low),
            "N" => Some(ControlLevel::Normal),
            "H" => Some(ControlLevel::High),
            _ => None,
        }
    }

    /// Single-letter wire code.
    pub fn code(&self) -> &'static str {
        match self {
            ControlLevel::Low => "L",
            ControlLevel::Normal => "N",
            ControlLevel::High => "H",
        }
    }
}

/// A `Q` record as it arrived, values untouched apart from trimming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcSegment {
    /// From the message header, when present
    pub instrument_id: Option<String>,
    /// Analyzer test code.
    pub test_code: String,
    /// Lot number as written on the control material.
    pub control_lot_number: String,
    /// `L`, `N` or `H`
    pub control_level: String,
    /// Raw measured value.
    pub result_value: String,
    /// Empty when the record carries no unit
    pub unit: String,
    /// Measurement time, without zone.
    pub timestamp: NaiveDateTime,
}

/// A QC segment resolved through the analyzer's mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcResult {
    /// Analyzer that measured it.
    pub analyzer_id: String,
    /// Domain test.
    pub test_id: String,
    /// Domain control lot.
    pub control_lot_id: String,
    /// Control level.
    pub control_level: ControlLevel,
    /// Parsed measured value.
    pub result_value: Decimal,
    /// Unit as sent.
    pub unit: String,
    /// Measurement time, read as UTC.
    pub timestamp: DateTime<Utc>,
}
