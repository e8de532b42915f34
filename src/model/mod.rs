//! Domain types shared by every service.
//!
//! These are plain data: identifiers are strings (UUIDs for anything this crate
//! creates), timestamps are UTC, and every enum serializes the way it is written on
//! the wire or in storage (`ERROR_PENDING`, `TEST_LEVEL`, ...).

pub mod analyzer;
pub mod error_record;
pub mod field;
pub mod mapping;
pub mod qc;
pub mod result;
pub mod rules;

pub use analyzer::{Analyzer, AnalyzerStatus, AnalyzerType, TransportKind};
pub use error_record::{
    AnalyzerError, ErrorFilter, ErrorSeverity, ErrorStatistics, ErrorStatus, ErrorType,
};
pub use field::{AnalyzerField, FieldKind};
pub use mapping::{
    ConcurrencyToken, DomainKind, FieldMapping, MappingRequest, MappingType, MappingUpdate,
    QualitativeValueMapping, UnitMapping,
};
pub use qc::{ControlLevel, QcResult, QcSegment};
pub use result::PatientResult;
pub use rules::{CustomFieldType, RuleType, ValidationRuleConfiguration};
