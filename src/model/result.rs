//! Patient results ready to be written.

use serde::{Deserialize, Serialize};

/// A patient result produced by ingesting one `R` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientResult {
    /// Analyzer that sent it.
    pub analyzer_id: String,
    /// From the preceding order record
    pub sample_id: Option<String>,
    /// Domain test the result field is mapped to
    pub test_id: String,
    /// Test code as sent.
    pub field_name: String,
    /// Value as sent.
    pub raw_value: String,
    /// Unit as sent.
    pub unit: Option<String>,
    /// Mapping that resolved the test.
    pub mapping_id: String,
}
