//! Instruments, instrument types and the lifecycle status table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operational lifecycle status of an analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyzerStatus {
    /// Registered but not being configured
    Inactive,
    /// Fields and mappings are being configured
    Setup,
    /// At least one mapping exists; waiting for required mappings to go live
    Validation,
    /// Accepting results
    Active,
    /// Active with unacknowledged errors in the queue
    ErrorPending,
    /// Unreachable or idle past the inactivity window
    Offline,
    /// Retired; can only be restored to INACTIVE
    Deleted,
}

impl AnalyzerStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [AnalyzerStatus; 7] = [
        AnalyzerStatus::Inactive,
        AnalyzerStatus::Setup,
        AnalyzerStatus::Validation,
        AnalyzerStatus::Active,
        AnalyzerStatus::ErrorPending,
        AnalyzerStatus::Offline,
        AnalyzerStatus::Deleted,
    ];

    /// Wire and storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerStatus::Inactive => "INACTIVE",
            AnalyzerStatus::Setup => "SETUP",
            AnalyzerStatus::Validation => "VALIDATION",
            AnalyzerStatus::Active => "ACTIVE",
            AnalyzerStatus::ErrorPending => "ERROR_PENDING",
            AnalyzerStatus::Offline => "OFFLINE",
            AnalyzerStatus::Deleted => "DELETED",
        }
    }

    /// The legal-transition table. Staying in the same status is always allowed.
    pub fn can_transition_to(self, target: AnalyzerStatus) -> bool {
        use AnalyzerStatus::*;

        if self == target {
            return true;
        }
        match (self, target) {
            // A retired analyzer can only be restored.
            (_, Inactive) => true,
            (Deleted, _) => false,
            (Inactive, Setup) | (Inactive, Deleted) => true,
            (Setup, Validation) => true,
            (Validation, Active) | (Validation, Setup) => true,
            (Active, ErrorPending) | (Active, Offline) => true,
            (ErrorPending, Active) | (ErrorPending, Offline) => true,
            (Offline, Active) | (Offline, ErrorPending) => true,
            _ => false,
        }
    }

    /// Statuses an operator may request directly. Everything else is reached
    /// through lifecycle triggers.
    pub fn is_manual_target(self) -> bool {
        matches!(
            self,
            AnalyzerStatus::Inactive | AnalyzerStatus::Setup | AnalyzerStatus::Validation
        )
    }
}

impl fmt::Display for AnalyzerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalyzerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalyzerStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown analyzer status: {s}"))
    }
}

/// How results reach the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportKind {
    /// Queried over a TCP socket.
    #[default]
    Tcp,
    /// Results are dropped as files and imported
    File,
    /// Results arrive over a serial line.
    Serial,
}

impl TransportKind {
    /// Push-only transports cannot be queried actively.
    pub fn is_push_only(&self) -> bool {
        matches!(self, TransportKind::File | TransportKind::Serial)
    }

    /// Wire and storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Tcp => "TCP",
            TransportKind::File => "FILE",
            TransportKind::Serial => "SERIAL",
        }
    }
}

/// A connected laboratory instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analyzer {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Network host for TCP instruments
    pub host: Option<String>,
    /// TCP port.
    pub port: Option<u16>,
    /// How results arrive.
    pub transport: TransportKind,
    /// Regex matched against the header instrument id
    pub identifier_pattern: Option<String>,
    /// Catalog entry this instrument belongs to.
    pub analyzer_type_id: Option<String>,
    /// Changed only by the lifecycle manager
    pub status: AnalyzerStatus,
    /// Set when the analyzer last entered ACTIVE through mapping activation
    pub last_activated: Option<DateTime<Utc>>,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

impl Analyzer {
    /// An INACTIVE TCP analyzer without an address.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            host: None,
            port: None,
            transport: TransportKind::Tcp,
            identifier_pattern: None,
            analyzer_type_id: None,
            status: AnalyzerStatus::Inactive,
            last_activated: None,
            updated_at: Utc::now(),
        }
    }

    /// Set host and port.
    #[must_use]
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Set the stored status.
    #[must_use]
    pub fn with_status(mut self, status: AnalyzerStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the transport.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Host and port when both are configured and the host is non-blank.
    pub fn address(&self) -> Option<(&str, u16)> {
        match (self.host.as_deref(), self.port) {
            (Some(host), Some(port)) if !host.trim().is_empty() => Some((host.trim(), port)),
            _ => None,
        }
    }
}

/// Catalog entry describing a family of instruments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerType {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Wire protocol, `ASTM` unless configured.
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Handled by the generic plugin rather than a vendor-specific one
    #[serde(default)]
    pub generic_plugin: bool,
    /// Regex matched against the header instrument id.
    pub identifier_pattern: Option<String>,
    /// Inactive types are ignored when matching instruments.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_protocol() -> String {
    "ASTM".to_string()
}

fn default_true() -> bool {
    true
}

impl AnalyzerType {
    /// An active ASTM type handled by a vendor plugin.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            protocol: default_protocol(),
            generic_plugin: false,
            identifier_pattern: None,
            active: true,
        }
    }
}
