//! Message segment parser.
//!
//! Turns one raw LIS2-A2 message into typed records. Parsing is pure: no I/O, no
//! repository lookups. Records are separated by CR, LF or CRLF; fields by `|`;
//! components by `^`.
//!
//! ```text
//! H|\^&|||ACME^ModelX^1.0|||||||LIS2-A2
//! O|1|SAMPLE-1
//! R|1|^^^GLU|98|mg/dL
//! Q|1|GLU^LOT123^N|98|mg/dL|20250115093000|
//! ```

pub mod qc;
pub mod result;

pub use qc::{parse_qc_record, parse_qc_segments};
pub use result::{parse_field_records, parse_inbound_result, DiscoveredField, InboundResult};

use crate::model::QcSegment;
use serde::Serialize;
use thiserror::Error;

/// Separates fields within a record.
pub const FIELD_DELIMITER: char = '|';
/// Separates components within a field.
pub const COMPONENT_DELIMITER: char = '^';

/// Why a message could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentParseError {
    /// Nothing but whitespace.
    #[error("Message is empty")]
    EmptyMessage,

    /// A `Q` record was malformed.
    #[error("Invalid QC segment at record {record}: {reason}")]
    InvalidQc {
        /// One-based record number within the message
        record: usize,
        /// What was wrong with it
        reason: String,
    },
}

/// Split a message into non-blank records.
pub fn split_records(message: &str) -> impl Iterator<Item = &str> {
    message
        .split(['\r', '\n'])
        .filter(|record| !record.trim().is_empty())
}

/// Split a record on `|`. Empty fields are kept so indexes stay stable.
pub fn split_fields(record: &str) -> Vec<&str> {
    record.split(FIELD_DELIMITER).collect()
}

/// First non-empty `^` component of a field, trimmed.
pub fn first_component(field: &str) -> Option<&str> {
    field
        .split(COMPONENT_DELIMITER)
        .map(str::trim)
        .find(|c| !c.is_empty())
}

/// Record type letter(s): the first field, trimmed.
pub fn record_type(record: &str) -> &str {
    record
        .split(FIELD_DELIMITER)
        .next()
        .unwrap_or_default()
        .trim()
}

/// Instrument id carried in a header record: first component of field 4.
pub fn header_instrument_id(record: &str) -> Option<String> {
    if record_type(record) != "H" {
        return None;
    }
    let fields = split_fields(record);
    fields
        .get(4)
        .and_then(|f| f.split(COMPONENT_DELIMITER).next())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Everything the ingest pipeline needs from one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedMessage {
    /// Instrument id from the first header.
    pub instrument_id: Option<String>,
    /// Result records with a test code.
    pub results: Vec<InboundResult>,
    /// Every `Q` record.
    pub qc_segments: Vec<QcSegment>,
}

/// Parse a whole message. Any malformed `Q` record fails the whole message.
pub fn parse_message(message: &str) -> Result<ParsedMessage, SegmentParseError> {
    if message.trim().is_empty() {
        return Err(SegmentParseError::EmptyMessage);
    }

    let mut parsed = ParsedMessage::default();
    let mut current_sample: Option<String> = None;

    for (index, record) in split_records(message).enumerate() {
        match record_type(record) {
            "H" => {
                if parsed.instrument_id.is_none() {
                    parsed.instrument_id = header_instrument_id(record);
                }
            }
            "O" => {
                current_sample = split_fields(record)
                    .get(2)
                    .and_then(|f| first_component(f))
                    .map(str::to_string);
            }
            "R" => {
                if let Some(result) = parse_inbound_result(record, current_sample.as_deref()) {
                    parsed.results.push(result);
                }
            }
            "Q" => {
                let segment = parse_qc_record(record, index + 1, parsed.instrument_id.as_deref())?;
                parsed.qc_segments.push(segment);
            }
            _ => {}
        }
    }

    Ok(parsed)
}
