//! Fields exposed by an analyzer's messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Value kind of an analyzer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldKind {
    /// A number with a unit.
    Numeric,
    /// A coded token such as `POS` or `NEG`.
    Qualitative,
    /// Free text.
    Text,
    /// A timestamp.
    DateTime,
    /// A control material measurement.
    ControlTest,
    /// A melting-point reading.
    MeltingPoint,
    /// Validated against a custom field type.
    Custom,
}

impl FieldKind {
    /// Every kind.
    pub const ALL: [FieldKind; 7] = [
        FieldKind::Numeric,
        FieldKind::Qualitative,
        FieldKind::Text,
        FieldKind::DateTime,
        FieldKind::ControlTest,
        FieldKind::MeltingPoint,
        FieldKind::Custom,
    ];

    /// Wire and storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Numeric => "NUMERIC",
            FieldKind::Qualitative => "QUALITATIVE",
            FieldKind::Text => "TEXT",
            FieldKind::DateTime => "DATE_TIME",
            FieldKind::ControlTest => "CONTROL_TEST",
            FieldKind::MeltingPoint => "MELTING_POINT",
            FieldKind::Custom => "CUSTOM",
        }
    }

    /// Only NUMERIC fields carry a unit.
    pub fn requires_unit(&self) -> bool {
        matches!(self, FieldKind::Numeric)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_uppercase();
        FieldKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == token)
            .ok_or_else(|| format!("Unknown field type: {s}"))
    }
}

/// A field discovered on, or configured for, an analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerField {
    /// Stable identifier.
    pub id: String,
    /// Owning analyzer.
    pub analyzer_id: String,
    /// Name as reported by the analyzer, usually the test code.
    pub name: String,
    /// Protocol reference, e.g. `^^^GLU` or `SEG|3`
    pub astm_ref: String,
    /// Value kind.
    pub kind: FieldKind,
    /// Present iff `kind` is NUMERIC
    pub unit: Option<String>,
    /// Custom type for CUSTOM fields.
    pub custom_field_type_id: Option<String>,
    /// Inactive fields are kept but not offered for mapping.
    pub active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl AnalyzerField {
    /// An active field. A blank unit is dropped.
    pub fn new(
        analyzer_id: impl Into<String>,
        name: impl Into<String>,
        astm_ref: impl Into<String>,
        kind: FieldKind,
        unit: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            analyzer_id: analyzer_id.into(),
            name: name.into(),
            astm_ref: astm_ref.into(),
            kind,
            unit: unit.filter(|u| !u.trim().is_empty()),
            custom_field_type_id: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Unit present exactly when the kind requires one.
    pub fn unit_is_consistent(&self) -> bool {
        self.kind.requires_unit() == self.unit.is_some()
    }

    /// Record-type prefix of the protocol reference (`R`, `O`, `SEG`...), used to
    /// group coverage statistics.
    pub fn segment_prefix(&self) -> &str {
        self.astm_ref
            .split(['|', '^'])
            .find(|part| !part.is_empty())
            .unwrap_or("UNKNOWN")
    }
}
