//! Message parsing from raw text to typed records.

use analyzer_core::segment::{parse_message, parse_qc_segments, SegmentParseError};
use chrono::NaiveDate;

const QC_MESSAGE: &str =
    "H|\\^&|||ACME^ModelX^1.0|||||||LIS2-A2\rQ|1|GLU^LOT123^N|98|mg/dL|20250115093000|\r";

#[test]
fn test_qc_message_scenario() {
    let segments = parse_qc_segments(QC_MESSAGE).expect("message parses");
    assert_eq!(segments.len(), 1);

    let seg = &segments[0];
    assert_eq!(seg.instrument_id.as_deref(), Some("ACME"));
    assert_eq!(seg.test_code, "GLU");
    assert_eq!(seg.control_lot_number, "LOT123");
    assert_eq!(seg.control_level, "N");
    assert_eq!(seg.result_value, "98");
    assert_eq!(seg.unit, "mg/dL");
    let expected = NaiveDate::from_ymd_opt(2025, 1, 15)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .unwrap();
    assert_eq!(seg.timestamp, expected);
}

#[test]
fn test_mixed_message() {
    let message = concat!(
        "H|\\^&|||ACME^ModelX^1.0|||||||LIS2-A2\r\n",
        "P|1\r\n",
        "O|1|SAMPLE-1\r\n",
        "R|1|^^^GLU|98|mg/dL\r\n",
        "R|2|^^^NA|140|mmol/L\r\n",
        "O|2|SAMPLE-2\r\n",
        "R|1|^^^GLU|101|mg/dL\r\n",
        "Q|1|GLU^LOT123^L|55|mg/dL|20250115093000\r\n",
        "Q|2|GLU^LOT124^H|310|mg/dL|20250115093100\r\n",
        "L|1|N\r\n",
    );
    let parsed = parse_message(message).expect("message parses");

    assert_eq!(parsed.instrument_id.as_deref(), Some("ACME"));
    assert_eq!(parsed.results.len(), 3);
    assert_eq!(parsed.results[0].sample_id.as_deref(), Some("SAMPLE-1"));
    assert_eq!(parsed.results[1].test_code, "NA");
    assert_eq!(parsed.results[2].sample_id.as_deref(), Some("SAMPLE-2"));
    assert_eq!(parsed.results[2].value, "101");

    assert_eq!(parsed.qc_segments.len(), 2);
    assert_eq!(parsed.qc_segments[0].control_level, "L");
    assert_eq!(parsed.qc_segments[1].control_lot_number, "LOT124");
}

#[test]
fn test_message_without_qc() {
    let segments =
        parse_qc_segments("H|\\^&|||ACME\rR|1|^^^GLU|98|mg/dL\rL|1|N\r").expect("parses");
    assert!(segments.is_empty());
}

#[test]
fn test_one_bad_segment_fails_message() {
    let message = concat!(
        "H|\\^&|||ACME\r",
        "Q|1|GLU^LOT123^N|98|mg/dL|20250115093000\r",
        "Q|2|GLU^LOT123^X|98|mg/dL|20250115093000\r",
    );
    let err = parse_message(message).unwrap_err();
    match err {
        SegmentParseError::InvalidQc { record, reason } => {
            assert_eq!(record, 3);
            assert!(reason.contains("Invalid control level: X"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_bad_timestamps_rejected() {
    for ts in ["2025011509300", "20250230093000", "2025O115093000", "20251315093000"] {
        let message = format!("H|\\^&|||ACME\rQ|1|GLU^LOT1^N|98|mg/dL|{ts}\r");
        assert!(
            parse_qc_segments(&message).is_err(),
            "timestamp {ts} should be rejected"
        );
    }
}

#[test]
fn test_empty_message() {
    assert_eq!(parse_message("  \r\n"), Err(SegmentParseError::EmptyMessage));
    assert_eq!(parse_qc_segments(""), Err(SegmentParseError::EmptyMessage));
}
