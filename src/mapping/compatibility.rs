//! Field kind to domain kind compatibility.
//!
//! | Field kind  | Allowed domain kinds      |
//! |-------------|---------------------------|
//! | NUMERIC     | TEST, RESULT              |
//! | QUALITATIVE | RESULT                    |
//! | TEXT        | METADATA, ORDER, SAMPLE   |
//! | others      | unrestricted              |

use crate::error::{AppResult, IntegrationError};
use crate::model::{DomainKind, FieldKind};

/// Enforced set, or `None` when the kind is unrestricted.
pub fn allowed_domain_kinds(kind: FieldKind) -> Option<&'static [DomainKind]> {
    match kind {
        FieldKind::Numeric => Some(&[DomainKind::Test, DomainKind::Result]),
        FieldKind::Qualitative => Some(&[DomainKind::Result]),
        FieldKind::Text => Some(&[DomainKind::Metadata, DomainKind::Order, DomainKind::Sample]),
        FieldKind::DateTime
        | FieldKind::ControlTest
        | FieldKind::MeltingPoint
        | FieldKind::Custom => None,
    }
}

/// Whether a field of `kind` may map onto `domain`.
pub fn is_compatible(kind: FieldKind, domain: DomainKind) -> bool {
    allowed_domain_kinds(kind).map_or(true, |allowed| allowed.contains(&domain))
}

/// Reject an incompatible pairing with the reason an operator needs to fix it.
pub fn check_compatibility(kind: FieldKind, domain: DomainKind) -> AppResult<()> {
    if is_compatible(kind, domain) {
        return Ok(());
    }
    let allowed = match kind {
        FieldKind::Numeric => "TEST or RESULT",
        FieldKind::Qualitative => "RESULT",
        _ => "METADATA, ORDER, or SAMPLE",
    };
    Err(IntegrationError::Validation(format!(
        "{kind} analyzer field can only map to {allowed} domain fields. Attempted: {domain}"
    )))
}

/// Looser pairing used only to flag suspicious mappings in metrics.
pub fn advisory_domain_kinds(kind: FieldKind) -> Option<&'static [DomainKind]> {
    match kind {
        FieldKind::Numeric => Some(&[DomainKind::Result, DomainKind::Unit]),
        FieldKind::Qualitative => Some(&[DomainKind::Result]),
        FieldKind::Text => Some(&[DomainKind::Test, DomainKind::Sample, DomainKind::Metadata]),
        FieldKind::DateTime => Some(&[DomainKind::Metadata]),
        _ => None,
    }
}
