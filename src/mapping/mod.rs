//! Mapping & validation engine.
//!
//! Maps analyzer fields onto domain fields under operator control:
//!
//! - [`compatibility`]: which field kinds may map to which domain kinds
//! - [`service`]: the draft to active workflow with optimistic locking, the
//!   activation checks and the lifecycle hand-off
//! - [`hydrator`]: attaches fields to mappings in one batch lookup
//! - [`units`] and [`qualitative`]: value-level mappings
//! - [`metrics`], [`copy`] and [`preview`]: operator tooling

pub mod compatibility;
pub mod copy;
pub mod hydrator;
pub mod metrics;
pub mod preview;
pub mod qualitative;
pub mod service;
pub mod units;

pub use compatibility::{check_compatibility, is_compatible};
pub use copy::{CopyOptions, CopyReport, MappingCopier};
pub use hydrator::{MappingHydrator, MappingView};
pub use metrics::{MappingMetrics, SegmentCoverage};
pub use preview::{MappingPreview, MappingPreviewService};
pub use qualitative::{QualitativeMappingRequest, QualitativeMappingService};
pub use service::{ActivationValidation, MappingService};
pub use units::{apply_unit_mapping, UnitMappingRequest, UnitMappingService};
