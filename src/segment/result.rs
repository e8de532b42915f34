//! `R` (result) records, in both of the shapes the core consumes.
//!
//! A query response describes the fields an instrument can send:
//! `R|seq|^^^NAME|value|unit|...|type`. Inbound results carry one measured value for
//! the sample named by the preceding `O` record.

use super::{first_component, record_type, split_fields, split_records};
use crate::model::FieldKind;
use serde::{Deserialize, Serialize};
use tracing::warn;

const MIN_RESULT_FIELDS: usize = 4;
const UNIT_FIELD: usize = 4;
const TYPE_FIELD: usize = 7;

/// A field advertised by an instrument in its query response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredField {
    /// Test code, e.g. `GLU`.
    pub name: String,
    /// `^^^NAME` as sent.
    pub astm_ref: String,
    /// Declared type. NUMERIC when absent or unknown, QUALITATIVE when that leaves
    /// a NUMERIC field without a unit.
    pub kind: FieldKind,
    /// Unit for NUMERIC fields.
    pub unit: Option<String>,
}

/// One measured value from an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundResult {
    /// Sample named by the preceding order record.
    pub sample_id: Option<String>,
    /// Test code, e.g. `GLU`.
    pub test_code: String,
    /// Measured value, trimmed.
    pub value: String,
    /// Unit, when sent.
    pub unit: Option<String>,
    /// The record as received
    pub record: String,
}

/// Extract field descriptions from the records of a query response. Records that are
/// not `R`, or are too short, are skipped.
pub fn parse_field_records<S: AsRef<str>>(records: &[S]) -> Vec<DiscoveredField> {
    let mut discovered = Vec::new();

    for record in records.iter().flat_map(|r| split_records(r.as_ref())) {
        if record_type(record) != "R" {
            continue;
        }
        let fields = split_fields(record);
        if fields.len() < MIN_RESULT_FIELDS {
            warn!(record, "Skipping result record with too few fields");
            continue;
        }

        let seq = fields[1].trim();
        let astm_ref = fields[2].trim();
        let name = first_component(astm_ref)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Field_{seq}"));

        let unit = fields
            .get(UNIT_FIELD)
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        let mut kind = match fields.get(TYPE_FIELD).map(|t| t.trim()).filter(|t| !t.is_empty()) {
            None => FieldKind::Numeric,
            Some(token) => token.to_ascii_uppercase().parse().unwrap_or_else(|_| {
                warn!(field = %name, token, "Unknown field type, defaulting to NUMERIC");
                FieldKind::Numeric
            }),
        };
        if kind == FieldKind::Numeric && unit.is_none() {
            kind = FieldKind::Qualitative;
        }

        discovered.push(DiscoveredField {
            name,
            astm_ref: astm_ref.to_string(),
            kind,
            unit,
        });
    }

    discovered
}

/// Parse an inbound `R` record. Returns `None` for records that carry no test code.
pub fn parse_inbound_result(record: &str, sample_id: Option<&str>) -> Option<InboundResult> {
    let fields = split_fields(record);
    if fields.len() < MIN_RESULT_FIELDS {
        warn!(record, "Skipping result record with too few fields");
        return None;
    }
    let test_code = first_component(fields[2])?;
    Some(InboundResult {
        sample_id: sample_id.map(str::to_string),
        test_code: test_code.to_string(),
        value: fields[3].trim().to_string(),
        unit: fields
            .get(UNIT_FIELD)
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string),
        record: record.to_string(),
    })
}
