use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SpecKitError;

// ---------------------------------------------------------------------------
// ScopeMode
// ---------------------------------------------------------------------------

/// Orchestration granularity recommended for a work request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    Feature,
    Epic,
    Program,
}

impl ScopeMode {
    pub fn all() -> &'static [ScopeMode] {
        &[ScopeMode::Feature, ScopeMode::Epic, ScopeMode::Program]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeMode::Feature => "feature",
            ScopeMode::Epic => "epic",
            ScopeMode::Program => "program",
        }
    }

    /// Case- and whitespace-insensitive parse used at external boundaries.
    pub fn parse_lenient(s: &str) -> Option<ScopeMode> {
        let normalized = s.trim().to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.as_str() == normalized)
    }

    /// Downstream action for a team that chose this mode.
    pub fn next_action(self) -> &'static str {
        match self {
            ScopeMode::Feature => "Proceed with feature-level task generation.",
            ScopeMode::Epic => "Decompose epic into features before generating tasks.",
            ScopeMode::Program => {
                "Decompose program into epics and features before generating tasks."
            }
        }
    }

    /// Who picks up the work after the gate for this mode.
    pub fn handoff_owner(self) -> &'static str {
        match self {
            ScopeMode::Feature => "agent:tasks",
            ScopeMode::Epic => "human:planner",
            ScopeMode::Program => "human:program-manager",
        }
    }
}

impl fmt::Display for ScopeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScopeMode {
    type Err = SpecKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScopeMode::parse_lenient(s).ok_or_else(|| {
            SpecKitError::InvalidInput(format!(
                "unknown scope mode '{s}'; valid: feature, epic, program"
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// GateChannel
// ---------------------------------------------------------------------------

/// Execution channel that produced or consumes a gate payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateChannel {
    Cli,
    Tty,
    #[default]
    Api,
}

impl GateChannel {
    pub fn all() -> &'static [GateChannel] {
        &[GateChannel::Cli, GateChannel::Tty, GateChannel::Api]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GateChannel::Cli => "cli",
            GateChannel::Tty => "tty",
            GateChannel::Api => "api",
        }
    }

    pub fn parse_lenient(s: &str) -> Option<GateChannel> {
        let normalized = s.trim().to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|channel| channel.as_str() == normalized)
    }
}

impl fmt::Display for GateChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GateChannel {
    type Err = SpecKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GateChannel::parse_lenient(s).ok_or_else(|| {
            SpecKitError::InvalidInput(format!("unknown channel '{s}'; valid: cli, tty, api"))
        })
    }
}

// ---------------------------------------------------------------------------
// IssueSeverity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Error,
}

impl IssueSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueSeverity::Warning => "warning",
            IssueSeverity::Error => "error",
        }
    }
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GateErrorCode
// ---------------------------------------------------------------------------

/// Known defects recorded while building or normalizing a gate payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateErrorCode {
    MissingRequiredField,
    InvalidFieldType,
    InvalidFieldValue,
    InvalidArtifactPath,
    UnknownField,
}

impl GateErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            GateErrorCode::MissingRequiredField => "missing_required_field",
            GateErrorCode::InvalidFieldType => "invalid_field_type",
            GateErrorCode::InvalidFieldValue => "invalid_field_value",
            GateErrorCode::InvalidArtifactPath => "invalid_artifact_path",
            GateErrorCode::UnknownField => "unknown_field",
        }
    }
}

impl fmt::Display for GateErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GateStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pass,
    Fail,
}

impl GateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GateStatus::Pass => "pass",
            GateStatus::Fail => "fail",
        }
    }

    pub fn parse_lenient(s: &str) -> Option<GateStatus> {
        match s.trim().to_lowercase().as_str() {
            "pass" => Some(GateStatus::Pass),
            "fail" => Some(GateStatus::Fail),
            _ => None,
        }
    }
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
