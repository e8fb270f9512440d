use crate::detection::{score_band_label, CONTRACT_VERSION, SIGNAL_NAMES};
use crate::error::{Result, SpecKitError};
use crate::scope_config::ScopeDetectionConfig;
use crate::types::ScopeMode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub const RUBRIC_VERSION: &str = "scope-scoring-rubric.v1";

const REQUIRED_KEYS: [&str; 7] = [
    "rubric_version",
    "contract_version",
    "aggregation_formula",
    "score_bands",
    "tie_break_rule",
    "rationale_rule",
    "dimensions",
];

// ---------------------------------------------------------------------------
// ScoringType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringType {
    /// `min(cap, max(0, raw_delta) * multiplier)`
    Scaled,
    /// Fixed weight per enumerated level.
    Mapped,
    /// Fixed points when true.
    Boolean,
    /// `min(cap, matched keywords)`
    KeywordCount,
}

impl ScoringType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoringType::Scaled => "scaled",
            ScoringType::Mapped => "mapped",
            ScoringType::Boolean => "boolean",
            ScoringType::KeywordCount => "keyword_count",
        }
    }
}

// ---------------------------------------------------------------------------
// ScoringRubric
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricScoreBand {
    pub mode: ScopeMode,
    pub min_score: u32,
    pub max_score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieBreakRule {
    pub classification: String,
    pub boundary_proximity_confidence_rule: String,
}

/// One scored dimension. Only the metadata fields relevant to
/// `scoring_type` are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricDimension {
    pub name: String,
    pub input_field: String,
    pub scoring_type: ScoringType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_units: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<BTreeMap<String, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

impl RubricDimension {
    fn scaled(name: &str, input_field: &str, multiplier: u32, cap: u32, free_units: u32) -> Self {
        Self {
            multiplier: Some(multiplier),
            cap: Some(cap),
            free_units: Some(free_units),
            ..Self::bare(name, input_field, ScoringType::Scaled)
        }
    }

    fn bare(name: &str, input_field: &str, scoring_type: ScoringType) -> Self {
        Self {
            name: name.to_string(),
            input_field: input_field.to_string(),
            scoring_type,
            multiplier: None,
            cap: None,
            free_units: None,
            weights: None,
            points: None,
            keywords: None,
        }
    }
}

/// Machine-readable description of how detection scores a request, for
/// external validation and governance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRubric {
    pub rubric_version: String,
    pub contract_version: String,
    pub aggregation_formula: String,
    pub score_bands: Vec<RubricScoreBand>,
    pub tie_break_rule: TieBreakRule,
    pub rationale_rule: String,
    pub dimensions: Vec<RubricDimension>,
}

impl ScoringRubric {
    /// Serialize and run the strict payload check over the result.
    pub fn validate(&self) -> Result<()> {
        let value = serde_json::to_value(self)?;
        validate_scope_scoring_rubric_payload(&value, true)
    }
}

/// Export the rubric for `config`. The config is validated first, so the
/// bands of an exported rubric are always ordered.
pub fn scope_scoring_rubric(config: &ScopeDetectionConfig) -> Result<ScoringRubric> {
    config.validate()?;
    let score_bands = config
        .score_bands()
        .into_iter()
        .map(|(mode, min_score, max_score)| RubricScoreBand {
            mode,
            min_score,
            max_score,
        })
        .collect();

    let [timeline, items, deps, surfaces, domains, teams, risk, compliance, migration, keywords] =
        SIGNAL_NAMES;
    let dimensions = vec![
        RubricDimension::scaled(
            timeline,
            "estimated_timeline_weeks",
            config.timeline_multiplier,
            config.timeline_cap,
            1,
        ),
        RubricDimension::scaled(
            items,
            items,
            config.work_items_multiplier,
            config.work_items_cap,
            1,
        ),
        RubricDimension::scaled(
            deps,
            deps,
            config.dependency_multiplier,
            config.dependency_cap,
            0,
        ),
        RubricDimension::scaled(
            surfaces,
            surfaces,
            config.integration_multiplier,
            config.integration_cap,
            0,
        ),
        RubricDimension::scaled(domains, domains, config.domain_multiplier, config.domain_cap, 1),
        RubricDimension::scaled(
            teams,
            teams,
            config.cross_team_multiplier,
            config.cross_team_cap,
            1,
        ),
        RubricDimension {
            weights: Some(config.risk_weights.clone()),
            ..RubricDimension::bare(risk, risk, ScoringType::Mapped)
        },
        RubricDimension {
            points: Some(config.compliance_points),
            ..RubricDimension::bare(compliance, compliance, ScoringType::Boolean)
        },
        RubricDimension {
            points: Some(config.migration_points),
            ..RubricDimension::bare(migration, migration, ScoringType::Boolean)
        },
        RubricDimension {
            keywords: Some(config.complexity_keywords.iter().cloned().collect()),
            cap: Some(config.keyword_cap),
            ..RubricDimension::bare(keywords, "description", ScoringType::KeywordCount)
        },
    ];

    Ok(ScoringRubric {
        rubric_version: RUBRIC_VERSION.to_string(),
        contract_version: CONTRACT_VERSION.to_string(),
        aggregation_formula: format!(
            "total_score = min({}, sum(dimension scores))",
            config.max_total_score
        ),
        score_bands,
        tie_break_rule: TieBreakRule {
            classification: format!(
                "Upper bounds are inclusive: {} is feature, {} is epic, {} is program.",
                score_band_label(ScopeMode::Feature, config),
                score_band_label(ScopeMode::Epic, config),
                score_band_label(ScopeMode::Program, config),
            ),
            boundary_proximity_confidence_rule: format!(
                "Confidence drops by {} when the total is within {} point(s) of {}.",
                config.boundary_penalty,
                config.boundary_distance_threshold,
                config
                    .boundary_points()
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        },
        rationale_rule: "Up to three reasons from the highest-scoring positive signals \
                         (ties by name); padded to two with deterministic fallbacks."
            .to_string(),
        dimensions,
    })
}

// ---------------------------------------------------------------------------
// Payload validation
// ---------------------------------------------------------------------------

/// Check an externally supplied rubric document. Every problem is reported
/// in one `InvalidRubric` error. Strict mode also rejects unknown top-level
/// keys.
pub fn validate_scope_scoring_rubric_payload(payload: &Value, strict: bool) -> Result<()> {
    let Some(object) = payload.as_object() else {
        return Err(SpecKitError::InvalidRubric(
            "payload must be an object".to_string(),
        ));
    };
    let mut problems: Vec<String> = Vec::new();

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|k| !object.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        problems.push(format!("missing keys: {}", missing.join(", ")));
    }
    if strict {
        let unknown: BTreeSet<&str> = object
            .keys()
            .map(String::as_str)
            .filter(|k| !REQUIRED_KEYS.contains(k))
            .collect();
        if !unknown.is_empty() {
            problems.push(format!(
                "unknown keys: {}",
                unknown.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
    }

    match object.get("score_bands") {
        None => {}
        Some(Value::Array(bands)) => {
            let is_v1 = object.get("rubric_version").and_then(Value::as_str) == Some(RUBRIC_VERSION);
            if is_v1 && bands.len() != 3 {
                problems.push(format!(
                    "score_bands must contain exactly 3 bands for {RUBRIC_VERSION}, got {}",
                    bands.len()
                ));
            }
            for (i, band) in bands.iter().enumerate() {
                check_band(i, band, &mut problems);
            }
        }
        Some(_) => problems.push("score_bands must be a list".to_string()),
    }

    match object.get("dimensions") {
        None => {}
        Some(Value::Array(dimensions)) if !dimensions.is_empty() => {
            let mut seen = BTreeSet::new();
            for (i, dimension) in dimensions.iter().enumerate() {
                match dimension.get("name").and_then(Value::as_str) {
                    _ if !dimension.is_object() => {
                        problems.push(format!("dimensions[{i}] must be an object"))
                    }
                    Some(name) if !name.trim().is_empty() => {
                        if !seen.insert(name) {
                            problems.push(format!("duplicate dimension name: {name}"));
                        }
                    }
                    _ => problems.push(format!("dimensions[{i}].name must be a non-empty string")),
                }
            }
        }
        Some(_) => problems.push("dimensions must be a non-empty list".to_string()),
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(SpecKitError::InvalidRubric(problems.join("; ")))
    }
}

fn check_band(i: usize, band: &Value, problems: &mut Vec<String>) {
    let Some(band) = band.as_object() else {
        problems.push(format!("score_bands[{i}] must be an object"));
        return;
    };
    let mode_ok = band
        .get("mode")
        .and_then(Value::as_str)
        .and_then(ScopeMode::parse_lenient)
        .is_some();
    if !mode_ok {
        problems.push(format!(
            "score_bands[{i}].mode must be one of: feature, epic, program"
        ));
    }
    let bound = |key: &str| band.get(key).and_then(Value::as_i64);
    match (bound("min_score"), bound("max_score")) {
        (Some(min), Some(max)) if min > max => {
            problems.push(format!("score_bands[{i}].min_score must be <= max_score"))
        }
        (Some(_), Some(_)) => {}
        (min, max) => {
            if min.is_none() {
                problems.push(format!("score_bands[{i}].min_score must be an integer"));
            }
            if max.is_none() {
                problems.push(format!("score_bands[{i}].max_score must be an integer"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
