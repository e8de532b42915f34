//! Field mappings and the value-level mappings hanging off them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of domain entity a field maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DomainKind {
    /// A single orderable test.
    Test,
    /// A group of tests ordered together.
    Panel,
    /// A reported result value.
    Result,
    /// Order-level data such as the order number.
    Order,
    /// Sample identity and specimen data.
    Sample,
    /// Quality control data.
    Qc,
    /// Instrument or message metadata.
    Metadata,
    /// Unit of measure.
    Unit,
}

impl DomainKind {
    /// Wire and storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainKind::Test => "TEST",
            DomainKind::Panel => "PANEL",
            DomainKind::Result => "RESULT",
            DomainKind::Order => "ORDER",
            DomainKind::Sample => "SAMPLE",
            DomainKind::Qc => "QC",
            DomainKind::Metadata => "METADATA",
            DomainKind::Unit => "UNIT",
        }
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level at which a mapping applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingType {
    /// Applies to the test as a whole.
    TestLevel,
    /// Applies to each reported result.
    ResultLevel,
    /// Carries metadata only.
    Metadata,
}

impl MappingType {
    /// Wire and storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingType::TestLevel => "TEST_LEVEL",
            MappingType::ResultLevel => "RESULT_LEVEL",
            MappingType::Metadata => "METADATA",
        }
    }
}

/// Links one analyzer field to one domain field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Stable identifier.
    pub id: String,
    /// Owning analyzer.
    pub analyzer_id: String,
    /// Source field on the analyzer.
    pub analyzer_field_id: String,
    /// Target field in the domain model.
    pub domain_field_id: String,
    /// Kind of target.
    pub domain_kind: DomainKind,
    /// Level the mapping applies at.
    pub mapping_type: MappingType,
    /// Counts towards the required set checked on activation.
    pub required: bool,
    /// Draft mappings are inactive
    pub active: bool,
    /// Only apply to this specimen type.
    pub specimen_type_constraint: Option<String>,
    /// Only apply within this panel.
    pub panel_constraint: Option<String>,
    /// Optimistic lock, bumped on every write
    pub version: u64,
    /// Time of the last write.
    pub last_updated: DateTime<Utc>,
}

impl FieldMapping {
    /// Build a draft mapping for `analyzer_id` with a fresh id and version 0.
    pub fn from_request(analyzer_id: impl Into<String>, request: &MappingRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            analyzer_id: analyzer_id.into(),
            analyzer_field_id: request.analyzer_field_id.clone(),
            domain_field_id: request.domain_field_id.clone(),
            domain_kind: request.domain_kind,
            mapping_type: request.mapping_type,
            required: request.required,
            active: false,
            specimen_type_constraint: request.specimen_type_constraint.clone(),
            panel_constraint: request.panel_constraint.clone(),
            version: 0,
            last_updated: Utc::now(),
        }
    }
}

/// What the caller last saw of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcurrencyToken {
    /// The mapping's version counter.
    Version(u64),
    /// The mapping's last update time.
    UpdatedAt(DateTime<Utc>),
}

impl ConcurrencyToken {
    /// True when the stored mapping is still the one the caller saw.
    pub fn matches(&self, mapping: &FieldMapping) -> bool {
        match self {
            ConcurrencyToken::Version(v) => *v == mapping.version,
            ConcurrencyToken::UpdatedAt(ts) => *ts == mapping.last_updated,
        }
    }
}

impl From<&FieldMapping> for ConcurrencyToken {
    fn from(mapping: &FieldMapping) -> Self {
        ConcurrencyToken::Version(mapping.version)
    }
}

/// Input for creating a mapping. Mappings always start as drafts; activation is a
/// separate call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRequest {
    /// Source field on the analyzer.
    pub analyzer_field_id: String,
    /// Target field in the domain model.
    pub domain_field_id: String,
    /// Kind of target.
    pub domain_kind: DomainKind,
    /// Level the mapping applies at.
    pub mapping_type: MappingType,
    /// See [`FieldMapping::required`].
    #[serde(default)]
    pub required: bool,
    /// Only apply to this specimen type.
    #[serde(default)]
    pub specimen_type_constraint: Option<String>,
    /// Only apply within this panel.
    #[serde(default)]
    pub panel_constraint: Option<String>,
}

impl MappingRequest {
    /// A non-required request without constraints.
    pub fn new(
        analyzer_field_id: impl Into<String>,
        domain_field_id: impl Into<String>,
        domain_kind: DomainKind,
        mapping_type: MappingType,
    ) -> Self {
        Self {
            analyzer_field_id: analyzer_field_id.into(),
            domain_field_id: domain_field_id.into(),
            domain_kind,
            mapping_type,
            required: false,
            specimen_type_constraint: None,
            panel_constraint: None,
        }
    }

    /// Mark the mapping as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Input for updating an existing mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingUpdate {
    /// Mapping to update.
    pub id: String,
    /// New target field.
    pub domain_field_id: String,
    /// New target kind.
    pub domain_kind: DomainKind,
    /// New mapping level.
    pub mapping_type: MappingType,
    /// New required flag.
    pub required: bool,
    /// New specimen constraint.
    pub specimen_type_constraint: Option<String>,
    /// New panel constraint.
    pub panel_constraint: Option<String>,
    /// When present, the write fails if the stored mapping moved on
    pub expected: Option<ConcurrencyToken>,
}

impl MappingUpdate {
    /// Start an update from the stored mapping, guarded by its current version.
    pub fn from_mapping(mapping: &FieldMapping) -> Self {
        Self {
            id: mapping.id.clone(),
            domain_field_id: mapping.domain_field_id.clone(),
            domain_kind: mapping.domain_kind,
            mapping_type: mapping.mapping_type,
            required: mapping.required,
            specimen_type_constraint: mapping.specimen_type_constraint.clone(),
            panel_constraint: mapping.panel_constraint.clone(),
            expected: Some(ConcurrencyToken::Version(mapping.version)),
        }
    }
}

/// Raw unit on the wire to the unit used in the domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitMapping {
    /// Stable identifier.
    pub id: String,
    /// Field the unit belongs to.
    pub analyzer_field_id: String,
    /// Unit as sent by the analyzer.
    pub analyzer_unit: String,
    /// Unit stored in the domain.
    pub domain_unit: String,
    /// Multiplier applied to the raw value
    pub conversion_factor: Option<Decimal>,
    /// Reject values whose unit does not match rather than converting
    pub reject_if_mismatch: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Raw qualitative token (`POS`, `+`, `Reactive`) to a coded domain value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitativeValueMapping {
    /// Stable identifier.
    pub id: String,
    /// Field the value belongs to.
    pub analyzer_field_id: String,
    /// Token as sent by the analyzer.
    pub analyzer_value: String,
    /// Coded value stored in the domain.
    pub domain_code: String,
    /// Used when no explicit value matches
    pub is_default: bool,
}
