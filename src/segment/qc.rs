//! `Q` (quality control) records.
//!
//! `Q|seq|testCode^controlLot^controlLevel|value|unit|yyyyMMddHHmmss|...`

use super::{header_instrument_id, record_type, split_fields, split_records, SegmentParseError};
use crate::model::{ControlLevel, QcSegment};
use chrono::NaiveDateTime;

/// Wire format of the QC timestamp.
pub const QC_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

const MIN_QC_FIELDS: usize = 6;

/// Parse every `Q` record of a message. The first malformed one fails the call.
pub fn parse_qc_segments(message: &str) -> Result<Vec<QcSegment>, SegmentParseError> {
    if message.trim().is_empty() {
        return Err(SegmentParseError::EmptyMessage);
    }

    let mut instrument_id = None;
    let mut segments = Vec::new();
    for (index, record) in split_records(message).enumerate() {
        match record_type(record) {
            "H" if instrument_id.is_none() => instrument_id = header_instrument_id(record),
            "Q" => segments.push(parse_qc_record(record, index + 1, instrument_id.as_deref())?),
            _ => {}
        }
    }
    Ok(segments)
}

/// Parse one `Q` record. `record_no` is 1-based and only used in error text.
pub fn parse_qc_record(
    record: &str,
    record_no: usize,
    instrument_id: Option<&str>,
) -> Result<QcSegment, SegmentParseError> {
    let invalid = |reason: String| SegmentParseError::InvalidQc {
        record: record_no,
        reason,
    };

    let mut fields = split_fields(record);
    while fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    if fields.len() < MIN_QC_FIELDS {
        return Err(invalid(format!(
            "expected at least {MIN_QC_FIELDS} fields, found {}",
            fields.len()
        )));
    }

    let test_info = fields[2].trim();
    if test_info.is_empty() {
        return Err(invalid("missing test information".to_string()));
    }
    let components: Vec<&str> = test_info.split('^').map(str::trim).collect();
    let component = |i: usize, name: &str| {
        components
            .get(i)
            .copied()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| invalid(format!("missing {name}")))
    };
    let test_code = component(0, "test code")?;
    let control_lot = component(1, "control lot number")?;
    let level = component(2, "control level")?;
    let level = ControlLevel::from_code(level)
        .ok_or_else(|| invalid(format!("Invalid control level: {level}. Must be L, N, or H")))?;

    let value = fields[3].trim();
    if value.is_empty() {
        return Err(invalid("missing result value".to_string()));
    }
    let unit = fields[4].trim();

    let raw_timestamp = fields[5].trim();
    if raw_timestamp.is_empty() {
        return Err(invalid("missing timestamp".to_string()));
    }
    let timestamp = parse_qc_timestamp(raw_timestamp).ok_or_else(|| {
        invalid(format!(
            "Invalid timestamp '{raw_timestamp}': expected yyyyMMddHHmmss"
        ))
    })?;

    Ok(QcSegment {
        instrument_id: instrument_id.map(str::to_string),
        test_code: test_code.to_string(),
        control_lot_number: control_lot.to_string(),
        control_level: level.code().to_string(),
        result_value: value.to_string(),
        unit: unit.to_string(),
        timestamp,
    })
}

/// Exactly 14 ASCII digits forming a real calendar instant. Rollover such as
/// February 30th is rejected.
pub fn parse_qc_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if raw.len() != 14 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, QC_TIMESTAMP_FORMAT).ok()
}
