//! Scope gate consumption contract.
//!
//! Wraps a [`ScopeDetectionResult`] and the team's decision into a
//! channel-agnostic [`ScopeGatePayload`]. Payloads arriving from other
//! channels are untrusted: [`normalize_scope_gate_payload`] rebuilds them
//! field by field, substituting deterministic fallbacks and recording a
//! [`ScopeGateContractIssue`] for every repair. Only strict mode turns
//! ERROR issues into a hard failure.

use crate::detection::ScopeDetectionResult;
use crate::error::{Result, SpecKitError};
use crate::types::{GateChannel, GateErrorCode, GateStatus, IssueSeverity, ScopeMode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const SCOPE_GATE_CONTRACT_VERSION: &str = "scope-gate-consumption.v1";

pub const SCOPE_GATE_REQUIRED_FIELDS: [&str; 8] = [
    "mode_recommendation",
    "recommendation_reasons",
    "user_choice",
    "override_flag",
    "next_action",
    "handoff_owner",
    "artifacts_created",
    "validation_status",
];

pub const SCOPE_GATE_OPTIONAL_FIELDS: [&str; 4] = [
    "contract_version",
    "override_rationale",
    "channel",
    "contract_issues",
];

const MAX_REASONS: usize = 3;
const MIN_REASONS: usize = 2;

pub fn is_allowed_field(name: &str) -> bool {
    SCOPE_GATE_REQUIRED_FIELDS.contains(&name) || SCOPE_GATE_OPTIONAL_FIELDS.contains(&name)
}

// ---------------------------------------------------------------------------
// Contract types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeGateContractIssue {
    pub code: GateErrorCode,
    pub field: String,
    pub message: String,
    pub severity: IssueSeverity,
}

impl ScopeGateContractIssue {
    pub fn warning(code: GateErrorCode, field: &str, message: impl Into<String>) -> Self {
        Self {
            code,
            field: field.to_string(),
            message: message.into(),
            severity: IssueSeverity::Warning,
        }
    }

    pub fn error(code: GateErrorCode, field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            ..Self::warning(code, field, message)
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationStatus {
    pub status: GateStatus,
    #[serde(default)]
    pub blocking_reasons: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ValidationStatus {
    /// FAIL with every ERROR message as a blocking reason when any ERROR
    /// issue exists, otherwise PASS. WARNING messages become warnings.
    /// Messages are deduplicated in first-seen order.
    pub fn from_issues(issues: &[ScopeGateContractIssue]) -> Self {
        let mut blocking_reasons = Vec::new();
        let mut warnings = Vec::new();
        for issue in issues {
            let bucket = if issue.is_error() {
                &mut blocking_reasons
            } else {
                &mut warnings
            };
            push_unique(bucket, &issue.message);
        }
        Self {
            status: if blocking_reasons.is_empty() {
                GateStatus::Pass
            } else {
                GateStatus::Fail
            },
            blocking_reasons,
            warnings,
        }
    }

    /// A caller-supplied status can never hide ERROR issues.
    fn escalated(mut self, issues: &[ScopeGateContractIssue]) -> Self {
        for issue in issues.iter().filter(|i| i.is_error()) {
            self.status = GateStatus::Fail;
            push_unique(&mut self.blocking_reasons, &issue.message);
        }
        self
    }
}

fn push_unique(messages: &mut Vec<String>, message: &str) {
    if !messages.iter().any(|m| m == message) {
        messages.push(message.to_string());
    }
}

/// The stable payload every channel consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeGatePayload {
    pub contract_version: String,
    pub mode_recommendation: ScopeMode,
    pub recommendation_reasons: Vec<String>,
    pub user_choice: ScopeMode,
    /// Always `user_choice != mode_recommendation`.
    pub override_flag: bool,
    pub next_action: String,
    pub handoff_owner: String,
    pub artifacts_created: Vec<String>,
    pub validation_status: ValidationStatus,
    pub channel: GateChannel,
    #[serde(default)]
    pub contract_issues: Vec<ScopeGateContractIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_rationale: Option<String>,
}

impl ScopeGatePayload {
    pub fn passed(&self) -> bool {
        self.validation_status.status == GateStatus::Pass
    }
}

/// The team's answer at the gate. Everything is optional: an empty decision
/// accepts the recommendation with the default handoff for that mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateDecision {
    pub user_choice: Option<ScopeMode>,
    pub override_rationale: Option<String>,
    pub next_action: Option<String>,
    pub handoff_owner: Option<String>,
    pub artifacts_created: Option<Vec<String>>,
    pub channel: GateChannel,
}

// ---------------------------------------------------------------------------
// Build / normalize / validate
// ---------------------------------------------------------------------------

/// Build a payload from a trusted detection result. Absent decision fields
/// take their defaults without issues; unusable values are still recorded.
pub fn build_scope_gate_payload(
    result: &ScopeDetectionResult,
    decision: GateDecision,
) -> ScopeGatePayload {
    let mut issues = Vec::new();
    let recommendation = result.mode_recommendation;
    let user_choice = decision.user_choice.unwrap_or(recommendation);

    let next_action = coerce_text(
        decision.next_action.map(Value::String).as_ref(),
        "next_action",
        user_choice.next_action(),
        false,
        &mut issues,
    );
    let handoff_owner = coerce_text(
        decision.handoff_owner.map(Value::String).as_ref(),
        "handoff_owner",
        user_choice.handoff_owner(),
        false,
        &mut issues,
    );
    let artifacts_created = match decision.artifacts_created {
        Some(paths) => normalize_artifact_entries(paths.iter().map(|p| Some(p.as_str())), &mut issues),
        None => Vec::new(),
    };
    let reasons = Value::from(result.recommendation_reasons.clone());
    let recommendation_reasons = normalize_reasons(Some(&reasons), recommendation, &mut issues);

    log_issues("built", &issues);
    ScopeGatePayload {
        contract_version: SCOPE_GATE_CONTRACT_VERSION.to_string(),
        mode_recommendation: recommendation,
        recommendation_reasons,
        user_choice,
        override_flag: user_choice != recommendation,
        next_action,
        handoff_owner,
        artifacts_created,
        validation_status: ValidationStatus::from_issues(&issues),
        channel: decision.channel,
        contract_issues: issues,
        override_rationale: trimmed_non_empty(decision.override_rationale.as_deref()),
    }
}

/// Rebuild an untrusted payload into the stable shape.
///
/// Never fails in lenient mode. With `strict`, unknown top-level fields are
/// recorded as an ERROR and any ERROR issue fails the call.
pub fn normalize_scope_gate_payload(
    raw: &Map<String, Value>,
    strict: bool,
) -> Result<ScopeGatePayload> {
    let mut issues = Vec::new();
    if strict {
        if let Some(issue) = unknown_fields_issue(raw) {
            issues.push(issue);
        }
    }

    let recommendation = coerce_mode(
        raw.get("mode_recommendation"),
        "mode_recommendation",
        ScopeMode::Feature,
        Some(IssueSeverity::Error),
        &mut issues,
    );
    let recommendation_reasons =
        normalize_reasons(raw.get("recommendation_reasons"), recommendation, &mut issues);
    let user_choice = coerce_mode(
        raw.get("user_choice"),
        "user_choice",
        recommendation,
        Some(IssueSeverity::Warning),
        &mut issues,
    );
    let override_flag = coerce_override_flag(
        raw.get("override_flag"),
        user_choice != recommendation,
        &mut issues,
    );
    let override_rationale = match present(raw.get("override_rationale")) {
        None => None,
        Some(Value::String(s)) => trimmed_non_empty(Some(s)),
        Some(_) => {
            issues.push(ScopeGateContractIssue::warning(
                GateErrorCode::InvalidFieldType,
                "override_rationale",
                "Invalid override_rationale; expected string or null.",
            ));
            None
        }
    };
    let next_action = coerce_text(
        raw.get("next_action"),
        "next_action",
        user_choice.next_action(),
        true,
        &mut issues,
    );
    let handoff_owner = coerce_text(
        raw.get("handoff_owner"),
        "handoff_owner",
        user_choice.handoff_owner(),
        true,
        &mut issues,
    );
    let artifacts_created = normalize_artifacts(raw.get("artifacts_created"), &mut issues);
    let channel = coerce_channel(raw.get("channel"), &mut issues);
    let contract_version = coerce_contract_version(raw.get("contract_version"), &mut issues);
    let validation_status = normalize_validation_status(raw.get("validation_status"), &mut issues);

    log_issues("normalized", &issues);
    let payload = ScopeGatePayload {
        contract_version,
        mode_recommendation: recommendation,
        recommendation_reasons,
        user_choice,
        override_flag,
        next_action,
        handoff_owner,
        artifacts_created,
        validation_status,
        channel,
        contract_issues: issues,
        override_rationale,
    };
    raise_on_strict_errors(&payload.contract_issues, strict)?;
    Ok(payload)
}

/// Report the issues `raw` would produce without handing back a payload.
pub fn validate_scope_gate_payload(
    raw: &Map<String, Value>,
    strict: bool,
) -> Result<Vec<ScopeGateContractIssue>> {
    let mut issues = normalize_scope_gate_payload(raw, false)?.contract_issues;
    if strict {
        if let Some(issue) = unknown_fields_issue(raw) {
            issues.push(issue);
        }
    }
    raise_on_strict_errors(&issues, strict)?;
    Ok(issues)
}

fn raise_on_strict_errors(issues: &[ScopeGateContractIssue], strict: bool) -> Result<()> {
    if !strict {
        return Ok(());
    }
    let errors: Vec<String> = issues
        .iter()
        .filter(|i| i.is_error())
        .map(|i| format!("{}: {}", i.field, i.message))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(SpecKitError::GateValidation(errors.join("; ")))
    }
}

fn log_issues(stage: &str, issues: &[ScopeGateContractIssue]) {
    if issues.is_empty() {
        return;
    }
    let errors = issues.iter().filter(|i| i.is_error()).count();
    tracing::warn!(
        stage,
        issues = issues.len(),
        errors,
        "scope gate payload has contract issues"
    );
    for issue in issues {
        tracing::debug!(
            code = %issue.code,
            field = %issue.field,
            severity = %issue.severity,
            "{}",
            issue.message
        );
    }
}

// ---------------------------------------------------------------------------
// Field coercion
// ---------------------------------------------------------------------------

/// Explicit JSON null counts as absent.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn trimmed_non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn unknown_fields_issue(raw: &Map<String, Value>) -> Option<ScopeGateContractIssue> {
    let unknown: BTreeSet<&str> = raw
        .keys()
        .map(String::as_str)
        .filter(|k| !is_allowed_field(k))
        .collect();
    if unknown.is_empty() {
        return None;
    }
    Some(ScopeGateContractIssue::error(
        GateErrorCode::UnknownField,
        "*",
        format!(
            "Unknown contract fields: {}",
            unknown.into_iter().collect::<Vec<_>>().join(", ")
        ),
    ))
}

/// Parse a mode, falling back on anything unusable. `missing` is the severity
/// for an absent value, or `None` to accept absence silently.
fn coerce_mode(
    value: Option<&Value>,
    field: &str,
    fallback: ScopeMode,
    missing: Option<IssueSeverity>,
    issues: &mut Vec<ScopeGateContractIssue>,
) -> ScopeMode {
    let Some(value) = present(value) else {
        if let Some(severity) = missing {
            issues.push(ScopeGateContractIssue {
                code: GateErrorCode::MissingRequiredField,
                field: field.to_string(),
                message: format!("Missing {field}; fallback '{fallback}' was applied."),
                severity,
            });
        }
        return fallback;
    };
    if let Some(mode) = value.as_str().and_then(ScopeMode::parse_lenient) {
        return mode;
    }
    // Without a valid recommendation the payload cannot stay consistent.
    let severity = if field == "mode_recommendation" {
        IssueSeverity::Error
    } else {
        IssueSeverity::Warning
    };
    issues.push(ScopeGateContractIssue {
        code: GateErrorCode::InvalidFieldValue,
        field: field.to_string(),
        message: format!("Invalid {field}; fallback '{fallback}' was applied."),
        severity,
    });
    fallback
}

fn coerce_override_flag(
    value: Option<&Value>,
    derived: bool,
    issues: &mut Vec<ScopeGateContractIssue>,
) -> bool {
    match present(value) {
        None => issues.push(ScopeGateContractIssue::warning(
            GateErrorCode::MissingRequiredField,
            "override_flag",
            "Missing override_flag; derived from mode_recommendation vs user_choice.",
        )),
        Some(Value::Bool(flag)) if *flag == derived => {}
        Some(Value::Bool(_)) => issues.push(ScopeGateContractIssue::warning(
            GateErrorCode::InvalidFieldValue,
            "override_flag",
            "override_flag contradicted mode_recommendation vs user_choice. Derived value was applied.",
        )),
        Some(_) => issues.push(ScopeGateContractIssue::warning(
            GateErrorCode::InvalidFieldType,
            "override_flag",
            "Invalid override_flag; expected boolean. Derived value was applied.",
        )),
    }
    derived
}

/// Non-blank string, trimmed. `report_missing` controls whether absence is
/// an issue; a present but unusable value always is.
fn coerce_text(
    value: Option<&Value>,
    field: &str,
    fallback: &str,
    report_missing: bool,
    issues: &mut Vec<ScopeGateContractIssue>,
) -> String {
    let value = present(value);
    if let Some(text) = trimmed_non_empty(value.and_then(Value::as_str)) {
        return text;
    }
    if value.is_some() || report_missing {
        let code = if value.is_none() {
            GateErrorCode::MissingRequiredField
        } else {
            GateErrorCode::InvalidFieldType
        };
        issues.push(ScopeGateContractIssue::warning(
            code,
            field,
            format!("Invalid {field}; fallback value was applied."),
        ));
    }
    fallback.to_string()
}

fn coerce_channel(value: Option<&Value>, issues: &mut Vec<ScopeGateContractIssue>) -> GateChannel {
    let Some(value) = present(value) else {
        return GateChannel::default();
    };
    if let Some(channel) = value.as_str().and_then(GateChannel::parse_lenient) {
        return channel;
    }
    let fallback = GateChannel::default();
    issues.push(ScopeGateContractIssue::warning(
        GateErrorCode::InvalidFieldValue,
        "channel",
        format!("Invalid channel; fallback '{fallback}' was applied."),
    ));
    fallback
}

fn coerce_contract_version(
    value: Option<&Value>,
    issues: &mut Vec<ScopeGateContractIssue>,
) -> String {
    let value = present(value);
    if let Some(version) = trimmed_non_empty(value.and_then(Value::as_str)) {
        return version;
    }
    let (code, verb) = if value.is_none() {
        (GateErrorCode::MissingRequiredField, "Missing")
    } else {
        (GateErrorCode::InvalidFieldType, "Invalid")
    };
    issues.push(ScopeGateContractIssue::warning(
        code,
        "contract_version",
        format!("{verb} contract_version; defaulted to {SCOPE_GATE_CONTRACT_VERSION}."),
    ));
    SCOPE_GATE_CONTRACT_VERSION.to_string()
}

/// Two or three trimmed, non-blank reasons. Anything less is replaced by
/// two deterministic fallback reasons.
fn normalize_reasons(
    value: Option<&Value>,
    mode: ScopeMode,
    issues: &mut Vec<ScopeGateContractIssue>,
) -> Vec<String> {
    let value = present(value);
    let reasons: Option<Vec<String>> = value.and_then(Value::as_array).and_then(|items| {
        items
            .iter()
            .map(|item| trimmed_non_empty(item.as_str()))
            .collect()
    });

    if let Some(mut reasons) = reasons {
        if reasons.len() > MAX_REASONS {
            issues.push(ScopeGateContractIssue::warning(
                GateErrorCode::InvalidFieldValue,
                "recommendation_reasons",
                "recommendation_reasons had more than 3 items; truncated to the first 3.",
            ));
            reasons.truncate(MAX_REASONS);
        }
        if reasons.len() >= MIN_REASONS {
            return reasons;
        }
    }

    let code = if value.is_none() {
        GateErrorCode::MissingRequiredField
    } else {
        GateErrorCode::InvalidFieldType
    };
    issues.push(ScopeGateContractIssue::warning(
        code,
        "recommendation_reasons",
        "Invalid recommendation_reasons; deterministic fallback reasons were applied.",
    ));
    vec![
        "Producer payload did not provide enough valid rationale details.".to_string(),
        format!("Selected mode '{mode}' remains the conservative default under limited context."),
    ]
}

fn normalize_artifacts(
    value: Option<&Value>,
    issues: &mut Vec<ScopeGateContractIssue>,
) -> Vec<String> {
    match present(value) {
        None => {
            issues.push(ScopeGateContractIssue::warning(
                GateErrorCode::MissingRequiredField,
                "artifacts_created",
                "Missing artifacts_created; defaulted to empty list.",
            ));
            Vec::new()
        }
        Some(Value::Array(entries)) => {
            normalize_artifact_entries(entries.iter().map(Value::as_str), issues)
        }
        Some(_) => {
            issues.push(ScopeGateContractIssue::warning(
                GateErrorCode::InvalidFieldType,
                "artifacts_created",
                "Invalid artifacts_created; expected list of paths. Defaulted to empty list.",
            ));
            Vec::new()
        }
    }
}

/// `None` entries stand for non-string values.
fn normalize_artifact_entries<'a>(
    entries: impl Iterator<Item = Option<&'a str>>,
    issues: &mut Vec<ScopeGateContractIssue>,
) -> Vec<String> {
    let mut paths = Vec::new();
    for entry in entries {
        let issue = match entry.map(normalize_artifact_path) {
            Some(ArtifactPath::Safe(path)) => {
                paths.push(path);
                continue;
            }
            None => ScopeGateContractIssue::warning(
                GateErrorCode::InvalidArtifactPath,
                "artifacts_created",
                "Dropped non-string artifact path entry.",
            ),
            Some(ArtifactPath::Empty) => ScopeGateContractIssue::warning(
                GateErrorCode::InvalidArtifactPath,
                "artifacts_created",
                "Dropped empty artifact path entry.",
            ),
            Some(ArtifactPath::Unsafe) => ScopeGateContractIssue::error(
                GateErrorCode::InvalidArtifactPath,
                "artifacts_created",
                "Dropped unsafe artifact path (absolute or traversal).",
            ),
        };
        issues.push(issue);
    }
    paths
}

#[derive(Debug, PartialEq, Eq)]
enum ArtifactPath {
    Safe(String),
    Empty,
    /// Absolute, or contains a `..` segment.
    Unsafe,
}

/// Canonical POSIX relative form: `./specs//a.md` becomes `specs/a.md`.
fn normalize_artifact_path(raw: &str) -> ArtifactPath {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ArtifactPath::Empty;
    }
    if trimmed.starts_with('/') {
        return ArtifactPath::Unsafe;
    }
    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." => {}
            ".." => return ArtifactPath::Unsafe,
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        ArtifactPath::Safe(".".to_string())
    } else {
        ArtifactPath::Safe(segments.join("/"))
    }
}

fn normalize_validation_status(
    value: Option<&Value>,
    issues: &mut Vec<ScopeGateContractIssue>,
) -> ValidationStatus {
    let supplied = match present(value) {
        None => {
            issues.push(ScopeGateContractIssue::warning(
                GateErrorCode::MissingRequiredField,
                "validation_status",
                "Missing validation_status; derived from contract issues.",
            ));
            None
        }
        Some(Value::Object(status)) => {
            let parsed = parse_validation_status(status);
            if parsed.is_none() {
                issues.push(ScopeGateContractIssue::warning(
                    GateErrorCode::InvalidFieldValue,
                    "validation_status",
                    "Invalid validation_status shape; derived from contract issues.",
                ));
            }
            parsed
        }
        Some(_) => {
            issues.push(ScopeGateContractIssue::warning(
                GateErrorCode::InvalidFieldType,
                "validation_status",
                "Invalid validation_status; derived from contract issues.",
            ));
            None
        }
    };
    match supplied {
        Some(status) => status.escalated(issues),
        None => ValidationStatus::from_issues(issues),
    }
}

fn parse_validation_status(status: &Map<String, Value>) -> Option<ValidationStatus> {
    let string_list = |key: &str| -> Option<Vec<String>> {
        match status.get(key) {
            None => Some(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(|s| s.trim().to_string()))
                .collect(),
            Some(_) => None,
        }
    };
    Some(ValidationStatus {
        status: status
            .get("status")
            .and_then(Value::as_str)
            .and_then(GateStatus::parse_lenient)?,
        blocking_reasons: string_list("blocking_reasons")?,
        warnings: string_list("warnings")?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{detect_scope, ScopeDetectionInput};
    use serde_json::json;

    fn epic_result() -> ScopeDetectionResult {
        let input = ScopeDetectionInput {
            estimated_timeline_weeks: 8,
            expected_work_items: 3,
            dependency_count: 3,
            integration_surface_count: 2,
            domain_count: 2,
            cross_team_count: 2,
            risk_level: "medium".to_string(),
            ..ScopeDetectionInput::new(
                "Create onboarding capability with several internal integrations.",
            )
        };
        detect_scope(&input, None).unwrap()
    }

    fn built_map(decision: GateDecision) -> Map<String, Value> {
        let payload = build_scope_gate_payload(&epic_result(), decision);
        match serde_json::to_value(payload).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn codes(issues: &[ScopeGateContractIssue]) -> Vec<GateErrorCode> {
        issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn build_defaults_to_recommendation() {
        let payload = build_scope_gate_payload(&epic_result(), GateDecision::default());
        assert_eq!(payload.contract_version, SCOPE_GATE_CONTRACT_VERSION);
        assert_eq!(payload.mode_recommendation, ScopeMode::Epic);
        assert_eq!(payload.user_choice, ScopeMode::Epic);
        assert!(!payload.override_flag);
        assert_eq!(
            payload.next_action,
            "Decompose epic into features before generating tasks."
        );
        assert_eq!(payload.handoff_owner, "human:planner");
        assert_eq!(payload.channel, GateChannel::Api);
        assert!(payload.passed());
        assert!(payload.contract_issues.is_empty());
    }

    #[test]
    fn build_derives_override_from_choice() {
        let payload = build_scope_gate_payload(
            &epic_result(),
            GateDecision {
                user_choice: Some(ScopeMode::Feature),
                override_rationale: Some("  Need an emergency single-feature patch first. ".into()),
                channel: GateChannel::Tty,
                ..Default::default()
            },
        );
        assert!(payload.override_flag);
        assert_eq!(
            payload.override_rationale.as_deref(),
            Some("Need an emergency single-feature patch first.")
        );
        assert_eq!(
            payload.next_action,
            "Proceed with feature-level task generation."
        );
        assert_eq!(payload.handoff_owner, "agent:tasks");
        assert_eq!(payload.channel, GateChannel::Tty);
    }

    #[test]
    fn build_drops_blank_rationale_and_bad_artifacts() {
        let payload = build_scope_gate_payload(
            &epic_result(),
            GateDecision {
                override_rationale: Some("   ".into()),
                next_action: Some(" ".into()),
                artifacts_created: Some(vec![
                    "./specs//001/spec.md".into(),
                    "".into(),
                    "/etc/passwd".into(),
                ]),
                ..Default::default()
            },
        );
        assert_eq!(payload.override_rationale, None);
        assert_eq!(payload.artifacts_created, vec!["specs/001/spec.md"]);
        assert_eq!(
            payload.next_action,
            "Decompose epic into features before generating tasks."
        );
        assert_eq!(
            codes(&payload.contract_issues),
            vec![
                GateErrorCode::InvalidFieldType,
                GateErrorCode::InvalidArtifactPath,
                GateErrorCode::InvalidArtifactPath,
            ]
        );
        assert_eq!(payload.validation_status.status, GateStatus::Fail);
        assert_eq!(
            payload.validation_status.blocking_reasons,
            vec!["Dropped unsafe artifact path (absolute or traversal)."]
        );
    }

    #[test]
    fn built_payload_serializes_every_required_field() {
        let map = built_map(GateDecision::default());
        for field in SCOPE_GATE_REQUIRED_FIELDS {
            assert!(map.contains_key(field), "missing {field}");
        }
        assert!(!map.contains_key("override_rationale"));
        assert_eq!(map["validation_status"]["status"], "pass");
        assert!(map.keys().all(|k| is_allowed_field(k)));
    }

    #[test]
    fn built_payload_normalizes_cleanly() {
        let map = built_map(GateDecision {
            user_choice: Some(ScopeMode::Program),
            override_rationale: Some("Board mandate.".into()),
            artifacts_created: Some(vec!["specs/001/plan.md".into()]),
            channel: GateChannel::Cli,
            ..Default::default()
        });
        let original = build_scope_gate_payload(
            &epic_result(),
            GateDecision {
                user_choice: Some(ScopeMode::Program),
                override_rationale: Some("Board mandate.".into()),
                artifacts_created: Some(vec!["specs/001/plan.md".into()]),
                channel: GateChannel::Cli,
                ..Default::default()
            },
        );
        let normalized = normalize_scope_gate_payload(&map, true).unwrap();
        assert!(normalized.contract_issues.is_empty());
        assert_eq!(normalized, original);
    }

    #[test]
    fn normalize_applies_fallbacks() {
        let raw = object(json!({
            "mode_recommendation": "epic",
            "recommendation_reasons": [
                "Cross-team dependencies are moderate.",
                "Multiple integrations are required."
            ],
        }));
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert_eq!(payload.user_choice, ScopeMode::Epic);
        assert!(!payload.override_flag);
        assert_eq!(payload.handoff_owner, "human:planner");
        assert!(payload.artifacts_created.is_empty());
        assert_eq!(payload.channel, GateChannel::Api);
        assert_eq!(payload.contract_version, SCOPE_GATE_CONTRACT_VERSION);
        // Every repair is a warning, so the payload still passes.
        assert!(payload.passed());
        let fields: Vec<&str> = payload
            .contract_issues
            .iter()
            .map(|i| i.field.as_str())
            .collect();
        assert_eq!(
            fields,
            vec![
                "user_choice",
                "override_flag",
                "next_action",
                "handoff_owner",
                "artifacts_created",
                "contract_version",
                "validation_status",
            ]
        );
        assert!(payload
            .contract_issues
            .iter()
            .all(|i| i.code == GateErrorCode::MissingRequiredField));
        assert_eq!(payload.validation_status.warnings.len(), 7);
    }

    #[test]
    fn normalize_coerces_case_and_whitespace() {
        let mut raw = built_map(GateDecision::default());
        raw.insert("user_choice".into(), json!("  PROGRAM "));
        raw.insert("override_flag".into(), json!(true));
        raw.insert("channel".into(), json!("TTY"));
        let payload = normalize_scope_gate_payload(&raw, true).unwrap();
        assert_eq!(payload.user_choice, ScopeMode::Program);
        assert!(payload.override_flag);
        assert_eq!(payload.channel, GateChannel::Tty);
        // next_action was supplied for the epic choice and is kept as given.
        assert_eq!(
            payload.next_action,
            "Decompose epic into features before generating tasks."
        );
    }

    #[test]
    fn contradicting_override_flag_is_rederived() {
        let mut raw = built_map(GateDecision::default());
        raw.insert("override_flag".into(), json!(true));
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert!(!payload.override_flag);
        assert_eq!(codes(&payload.contract_issues), vec![GateErrorCode::InvalidFieldValue]);

        raw.insert("override_flag".into(), json!("yes"));
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert!(!payload.override_flag);
        assert_eq!(codes(&payload.contract_issues), vec![GateErrorCode::InvalidFieldType]);
    }

    #[test]
    fn unsafe_artifact_paths_fail_even_when_lenient() {
        let mut raw = built_map(GateDecision::default());
        raw.insert("artifacts_created".into(), json!(["../../etc/passwd", "ok.md"]));
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert_eq!(payload.artifacts_created, vec!["ok.md"]);
        assert_eq!(
            codes(&payload.contract_issues),
            vec![GateErrorCode::InvalidArtifactPath]
        );
        assert!(payload.contract_issues[0].is_error());
        // The supplied "pass" status is escalated.
        assert_eq!(payload.validation_status.status, GateStatus::Fail);
        assert_eq!(
            payload.validation_status.blocking_reasons,
            vec!["Dropped unsafe artifact path (absolute or traversal)."]
        );
    }

    #[test]
    fn repeated_errors_block_once_with_or_without_supplied_status() {
        let mut raw = built_map(GateDecision::default());
        raw.insert(
            "artifacts_created".into(),
            json!(["/etc/passwd", "../secret", "ok.md"]),
        );

        let mut derived = raw.clone();
        derived.remove("validation_status");
        let derived = normalize_scope_gate_payload(&derived, false).unwrap();

        raw.insert("validation_status".into(), json!({"status": "pass"}));
        let escalated = normalize_scope_gate_payload(&raw, false).unwrap();

        assert_eq!(derived.contract_issues.iter().filter(|i| i.is_error()).count(), 2);
        assert_eq!(derived.validation_status.status, GateStatus::Fail);
        assert_eq!(
            derived.validation_status.blocking_reasons,
            vec!["Dropped unsafe artifact path (absolute or traversal)."]
        );
        assert_eq!(escalated.validation_status.status, GateStatus::Fail);
        assert_eq!(
            derived.validation_status.blocking_reasons,
            escalated.validation_status.blocking_reasons
        );
    }

    #[test]
    fn status_from_issues_keeps_first_seen_order() {
        let issues = [
            ScopeGateContractIssue::warning(GateErrorCode::InvalidFieldType, "w", "second"),
            ScopeGateContractIssue::error(GateErrorCode::InvalidArtifactPath, "e", "bad"),
            ScopeGateContractIssue::warning(GateErrorCode::InvalidFieldType, "w", "first"),
            ScopeGateContractIssue::warning(GateErrorCode::InvalidFieldType, "w", "second"),
            ScopeGateContractIssue::error(GateErrorCode::InvalidArtifactPath, "e", "bad"),
        ];
        let status = ValidationStatus::from_issues(&issues);
        assert_eq!(status.status, GateStatus::Fail);
        assert_eq!(status.blocking_reasons, vec!["bad"]);
        assert_eq!(status.warnings, vec!["second", "first"]);
    }

    #[test]
    fn non_string_and_empty_artifacts_are_warnings() {
        let mut raw = built_map(GateDecision::default());
        raw.insert("artifacts_created".into(), json!(["specs/001/tasks.md", "", 123]));
        let payload = normalize_scope_gate_payload(&raw, true).unwrap();
        assert_eq!(payload.artifacts_created, vec!["specs/001/tasks.md"]);
        assert_eq!(payload.contract_issues.len(), 2);
        assert!(payload.contract_issues.iter().all(|i| !i.is_error()));

        raw.insert("artifacts_created".into(), json!("specs/001/tasks.md"));
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert!(payload.artifacts_created.is_empty());
        assert_eq!(codes(&payload.contract_issues), vec![GateErrorCode::InvalidFieldType]);
    }

    #[test]
    fn artifact_path_normalization() {
        let cases = [
            ("specs/001/spec.md", ArtifactPath::Safe("specs/001/spec.md".into())),
            ("./specs//001/./spec.md/", ArtifactPath::Safe("specs/001/spec.md".into())),
            ("./", ArtifactPath::Safe(".".into())),
            ("  ", ArtifactPath::Empty),
            ("/abs/path.md", ArtifactPath::Unsafe),
            ("specs/../../secret", ArtifactPath::Unsafe),
            ("..", ArtifactPath::Unsafe),
            ("notes..md", ArtifactPath::Safe("notes..md".into())),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_artifact_path(raw), expected, "{raw}");
        }
    }

    #[test]
    fn strict_rejects_invalid_recommendation() {
        let raw = object(json!({
            "mode_recommendation": "invalid-mode",
            "recommendation_reasons": ["Reason one.", "Reason two."],
        }));
        let err = normalize_scope_gate_payload(&raw, true).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Scope gate payload validation failed: "));
        assert!(message.contains("mode_recommendation: Invalid mode_recommendation"));

        let lenient = normalize_scope_gate_payload(&raw, false).unwrap();
        assert_eq!(lenient.mode_recommendation, ScopeMode::Feature);
        assert_eq!(lenient.validation_status.status, GateStatus::Fail);
    }

    #[test]
    fn missing_recommendation_is_an_error() {
        let raw = object(json!({"validation_status": null}));
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert_eq!(payload.mode_recommendation, ScopeMode::Feature);
        assert!(!payload.passed());
        assert_eq!(payload.contract_issues[0].field, "mode_recommendation");
        assert!(payload.contract_issues[0].is_error());
        assert_eq!(
            payload.recommendation_reasons[1],
            "Selected mode 'feature' remains the conservative default under limited context."
        );
    }

    #[test]
    fn reasons_are_validated() {
        let mut raw = built_map(GateDecision::default());
        raw.insert(
            "recommendation_reasons".into(),
            json!(["one", " two ", "three", "four"]),
        );
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert_eq!(payload.recommendation_reasons, vec!["one", "two", "three"]);
        assert_eq!(payload.contract_issues.len(), 1);

        raw.insert("recommendation_reasons".into(), json!(["only one"]));
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert_eq!(payload.recommendation_reasons.len(), 2);
        assert_eq!(
            payload.recommendation_reasons[0],
            "Producer payload did not provide enough valid rationale details."
        );

        raw.insert("recommendation_reasons".into(), json!(["fine", 7]));
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert_eq!(codes(&payload.contract_issues), vec![GateErrorCode::InvalidFieldType]);
    }

    #[test]
    fn invalid_channel_and_version_fall_back() {
        let mut raw = built_map(GateDecision::default());
        raw.insert("channel".into(), json!("carrier-pigeon"));
        raw.insert("contract_version".into(), json!(2));
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert_eq!(payload.channel, GateChannel::Api);
        assert_eq!(payload.contract_version, SCOPE_GATE_CONTRACT_VERSION);
        let fields: Vec<&str> = payload
            .contract_issues
            .iter()
            .map(|i| i.field.as_str())
            .collect();
        assert_eq!(fields, vec!["channel", "contract_version"]);
    }

    #[test]
    fn malformed_validation_status_is_derived() {
        let mut raw = built_map(GateDecision::default());
        raw.insert("validation_status".into(), json!({"status": "maybe"}));
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert_eq!(payload.validation_status.status, GateStatus::Pass);
        assert_eq!(
            payload.validation_status.warnings,
            vec!["Invalid validation_status shape; derived from contract issues."]
        );

        raw.insert("validation_status".into(), json!("pass"));
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert_eq!(codes(&payload.contract_issues), vec![GateErrorCode::InvalidFieldType]);

        raw.insert(
            "validation_status".into(),
            json!({"status": " FAIL ", "blocking_reasons": ["manual hold"]}),
        );
        let payload = normalize_scope_gate_payload(&raw, false).unwrap();
        assert_eq!(payload.validation_status.status, GateStatus::Fail);
        assert_eq!(payload.validation_status.blocking_reasons, vec!["manual hold"]);
        assert!(payload.contract_issues.is_empty());
    }

    #[test]
    fn incoming_contract_issues_are_recomputed() {
        let mut raw = built_map(GateDecision::default());
        raw.insert(
            "contract_issues".into(),
            json!([{"code": "unknown_field", "field": "*", "message": "stale", "severity": "error"}]),
        );
        let payload = normalize_scope_gate_payload(&raw, true).unwrap();
        assert!(payload.contract_issues.is_empty());
    }

    #[test]
    fn validate_rejects_unknown_fields_only_when_strict() {
        let mut raw = built_map(GateDecision::default());
        raw.insert("unexpected_field".into(), json!("value"));
        raw.insert("another".into(), json!(1));

        let issues = validate_scope_gate_payload(&raw, false).unwrap();
        assert!(issues.is_empty());

        let err = validate_scope_gate_payload(&raw, true).unwrap_err();
        assert!(err
            .to_string()
            .contains("*: Unknown contract fields: another, unexpected_field"));
    }

    #[test]
    fn validate_returns_warnings_without_failing() {
        let raw = object(json!({
            "mode_recommendation": "program",
            "recommendation_reasons": ["a", "b"],
        }));
        let issues = validate_scope_gate_payload(&raw, true).unwrap();
        assert!(!issues.is_empty());
        assert!(issues.iter().all(|i| !i.is_error()));
    }

    #[test]
    fn issue_serializes_snake_case() {
        let issue = ScopeGateContractIssue::error(
            GateErrorCode::InvalidArtifactPath,
            "artifacts_created",
            "Dropped unsafe artifact path (absolute or traversal).",
        );
        assert_eq!(
            serde_json::to_value(&issue).unwrap(),
            json!({
                "code": "invalid_artifact_path",
                "field": "artifacts_created",
                "message": "Dropped unsafe artifact path (absolute or traversal).",
                "severity": "error"
            })
        );
    }
}
