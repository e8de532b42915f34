//! Analyzer lifecycle state machine.
//!
//! The legal-transition table lives on [`AnalyzerStatus::can_transition_to`]. Every
//! status change, manual or event-driven, goes through [`LifecycleManager`], which
//! checks the table, writes the new status and then publishes a [`StatusChange`].
//!
//! Event-driven changes are modelled as [`LifecycleTrigger`]s. The component that
//! detects the condition (mapping activation, error acknowledgement, connectivity
//! check, inactivity sweep) calls [`LifecycleManager::fire`]; the trigger re-checks
//! its precondition against the stored status before anything is written.

pub mod manager;
pub mod scheduler;

pub use manager::LifecycleManager;
pub use scheduler::{InactivityScheduler, SweepMetrics, SweepReport};

use crate::model::AnalyzerStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Published after every successful status write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Analyzer that moved.
    pub analyzer_id: String,
    /// Status before the write.
    pub old: AnalyzerStatus,
    /// Status after the write.
    pub new: AnalyzerStatus,
    /// Why it moved.
    pub reason: String,
}

/// Conditions that move an analyzer between statuses without operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleTrigger {
    /// First mapping created for an analyzer in SETUP
    MappingCreated,
    /// Every required role is covered by an active mapping
    RequiredMappingsActivated,
    /// An error was queued for an ACTIVE analyzer
    UnacknowledgedErrorCreated,
    /// A connectivity check failed
    ConnectionTestFailed,
    /// The last unacknowledged error was cleared
    AllErrorsAcknowledged,
    /// A connectivity check reached an OFFLINE analyzer
    ConnectionTestSucceeded,
    /// Daily sweep found the analyzer idle past the inactivity window
    InactivitySweep,
}

impl LifecycleTrigger {
    /// Whether the trigger may fire from `status`.
    pub fn applies_to(&self, status: AnalyzerStatus) -> bool {
        use AnalyzerStatus::*;
        match self {
            LifecycleTrigger::MappingCreated => status == Setup,
            LifecycleTrigger::RequiredMappingsActivated => status == Validation,
            LifecycleTrigger::UnacknowledgedErrorCreated => status == Active,
            LifecycleTrigger::ConnectionTestFailed => matches!(status, Active | ErrorPending),
            LifecycleTrigger::AllErrorsAcknowledged => status == ErrorPending,
            LifecycleTrigger::ConnectionTestSucceeded => status == Offline,
            LifecycleTrigger::InactivitySweep => status == Active,
        }
    }

    /// Status the trigger moves to.
    pub fn target(&self) -> AnalyzerStatus {
        match self {
            LifecycleTrigger::MappingCreated => AnalyzerStatus::Validation,
            LifecycleTrigger::RequiredMappingsActivated => AnalyzerStatus::Active,
            LifecycleTrigger::UnacknowledgedErrorCreated => AnalyzerStatus::ErrorPending,
            LifecycleTrigger::ConnectionTestFailed => AnalyzerStatus::Offline,
            LifecycleTrigger::AllErrorsAcknowledged => AnalyzerStatus::Active,
            LifecycleTrigger::ConnectionTestSucceeded => AnalyzerStatus::Active,
            LifecycleTrigger::InactivitySweep => AnalyzerStatus::Offline,
        }
    }

    /// Precondition as shown in error text.
    pub fn expected(&self) -> &'static str {
        match self {
            LifecycleTrigger::MappingCreated => "SETUP",
            LifecycleTrigger::RequiredMappingsActivated => "VALIDATION",
            LifecycleTrigger::UnacknowledgedErrorCreated | LifecycleTrigger::InactivitySweep => {
                "ACTIVE"
            }
            LifecycleTrigger::ConnectionTestFailed => "ACTIVE or ERROR_PENDING",
            LifecycleTrigger::AllErrorsAcknowledged => "ERROR_PENDING",
            LifecycleTrigger::ConnectionTestSucceeded => "OFFLINE",
        }
    }

    /// Reason recorded on the status change.
    pub fn reason(&self) -> &'static str {
        match self {
            LifecycleTrigger::MappingCreated => "First mapping created",
            LifecycleTrigger::RequiredMappingsActivated => "All required mappings activated",
            LifecycleTrigger::UnacknowledgedErrorCreated => "Unacknowledged error created",
            LifecycleTrigger::ConnectionTestFailed => "Connection test failed",
            LifecycleTrigger::AllErrorsAcknowledged => "All errors acknowledged",
            LifecycleTrigger::ConnectionTestSucceeded => "Connection restored",
            LifecycleTrigger::InactivitySweep => "No activity within inactivity window",
        }
    }

    /// Only activation through mappings stamps `last_activated`.
    pub fn stamps_activation(&self) -> bool {
        matches!(self, LifecycleTrigger::RequiredMappingsActivated)
    }
}

impl fmt::Display for LifecycleTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
