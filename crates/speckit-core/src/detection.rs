//! Deterministic scope detection.
//!
//! Scores a work request on ten fixed dimensions, sums the capped scores and
//! maps the total onto the FEATURE / EPIC / PROGRAM bands of the active
//! [`ScopeDetectionConfig`]. Detection has no side effects: the same input
//! and config always produce the same result.

use crate::error::{Result, SpecKitError};
use crate::scope_config::ScopeDetectionConfig;
use crate::types::ScopeMode;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;

pub const CONTRACT_VERSION: &str = "scope-detection.v1";

/// Signal names in emission order.
pub const SIGNAL_NAMES: [&str; 10] = [
    "timeline_weeks",
    "expected_work_items",
    "dependency_count",
    "integration_surface_count",
    "domain_count",
    "cross_team_count",
    "risk_level",
    "requires_compliance_review",
    "requires_migration",
    "complexity_keywords",
];

const INPUT_FIELDS: [&str; 10] = [
    "description",
    "estimated_timeline_weeks",
    "expected_work_items",
    "dependency_count",
    "integration_surface_count",
    "domain_count",
    "cross_team_count",
    "risk_level",
    "requires_compliance_review",
    "requires_migration",
];

const GENERIC_FALLBACK_REASON: &str =
    "Structured signals were used to produce a deterministic recommendation.";

// ---------------------------------------------------------------------------
// ScopeDetectionInput
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDetectionInput {
    pub description: String,
    pub estimated_timeline_weeks: u32,
    pub expected_work_items: u32,
    pub dependency_count: u32,
    pub integration_surface_count: u32,
    pub domain_count: u32,
    pub cross_team_count: u32,
    pub risk_level: String,
    pub requires_compliance_review: bool,
    pub requires_migration: bool,
}

impl ScopeDetectionInput {
    /// A single-week, single-item, low-risk request with the given description.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            estimated_timeline_weeks: 1,
            expected_work_items: 1,
            dependency_count: 0,
            integration_surface_count: 0,
            domain_count: 1,
            cross_team_count: 1,
            risk_level: "low".to_string(),
            requires_compliance_review: false,
            requires_migration: false,
        }
    }

    /// Strictly typed construction from an untyped JSON object, as received
    /// from API callers. Missing fields take the [`ScopeDetectionInput::new`]
    /// defaults; wrong types are rejected, booleans are never counts.
    pub fn from_mapping(values: &Map<String, Value>) -> Result<Self> {
        let unknown: Vec<&str> = values
            .keys()
            .map(String::as_str)
            .filter(|k| !INPUT_FIELDS.contains(k))
            .collect();
        if !unknown.is_empty() {
            return Err(SpecKitError::InvalidInput(format!(
                "unknown scope detection input fields: {}",
                unknown.join(", ")
            )));
        }

        let description = match values.get("description") {
            Some(Value::String(s)) => s.clone(),
            _ => {
                return Err(SpecKitError::InvalidInputType(
                    "description must be a string".to_string(),
                ))
            }
        };
        let defaults = Self::new(description);

        let risk_level = match values.get("risk_level") {
            None => defaults.risk_level.clone(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(SpecKitError::InvalidInputType(
                    "risk_level must be a string".to_string(),
                ))
            }
        };

        Ok(Self {
            estimated_timeline_weeks: count_field(
                values,
                "estimated_timeline_weeks",
                defaults.estimated_timeline_weeks,
                1,
            )?,
            expected_work_items: count_field(
                values,
                "expected_work_items",
                defaults.expected_work_items,
                1,
            )?,
            dependency_count: count_field(values, "dependency_count", defaults.dependency_count, 0)?,
            integration_surface_count: count_field(
                values,
                "integration_surface_count",
                defaults.integration_surface_count,
                0,
            )?,
            domain_count: count_field(values, "domain_count", defaults.domain_count, 1)?,
            cross_team_count: count_field(values, "cross_team_count", defaults.cross_team_count, 1)?,
            risk_level,
            requires_compliance_review: flag_field(
                values,
                "requires_compliance_review",
                defaults.requires_compliance_review,
            )?,
            requires_migration: flag_field(values, "requires_migration", defaults.requires_migration)?,
            description: defaults.description,
        })
    }

    /// Fail on the first invalid field. Nothing is scored for invalid input.
    pub fn validate(&self, config: &ScopeDetectionConfig) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(SpecKitError::InvalidInput(
                "description cannot be empty".to_string(),
            ));
        }
        if !config.risk_weights.contains_key(&self.normalized_risk_level()) {
            return Err(SpecKitError::InvalidInput(format!(
                "risk_level must be one of: {}",
                config.risk_levels().join(", ")
            )));
        }
        for (field, value, floor) in [
            ("estimated_timeline_weeks", self.estimated_timeline_weeks, 1),
            ("expected_work_items", self.expected_work_items, 1),
            ("domain_count", self.domain_count, 1),
            ("cross_team_count", self.cross_team_count, 1),
        ] {
            if value < floor {
                return Err(SpecKitError::InvalidInput(format!(
                    "{field} must be >= {floor}"
                )));
            }
        }
        Ok(())
    }

    /// Lower-cased with runs of whitespace collapsed to single spaces.
    pub fn normalized_description(&self) -> String {
        self.description
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    pub fn normalized_risk_level(&self) -> String {
        self.risk_level.trim().to_lowercase()
    }
}

fn count_field(values: &Map<String, Value>, field: &str, default: u32, floor: u32) -> Result<u32> {
    let Some(value) = values.get(field) else {
        return Ok(default);
    };
    let Value::Number(n) = value else {
        return Err(SpecKitError::InvalidInputType(format!(
            "{field} must be an integer"
        )));
    };
    if let Some(u) = n.as_u64() {
        return u32::try_from(u)
            .map_err(|_| SpecKitError::InvalidInput(format!("{field} is out of range")));
    }
    if n.is_i64() {
        return Err(SpecKitError::InvalidInput(format!(
            "{field} must be >= {floor}"
        )));
    }
    Err(SpecKitError::InvalidInputType(format!(
        "{field} must be an integer"
    )))
}

fn flag_field(values: &Map<String, Value>, field: &str, default: bool) -> Result<bool> {
    match values.get(field) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(SpecKitError::InvalidInputType(format!(
            "{field} must be a boolean"
        ))),
    }
}

// ---------------------------------------------------------------------------
// ScopeSignal / ScopeDetectionResult
// ---------------------------------------------------------------------------

/// Raw input behind a signal, serialized as the plain JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Count(u32),
    Flag(bool),
    Level(String),
    Keywords(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSignal {
    pub name: String,
    pub value: SignalValue,
    pub weight: u32,
    pub score: u32,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeDetectionResult {
    pub contract_version: String,
    pub total_score: u32,
    pub score_band: String,
    pub mode_recommendation: ScopeMode,
    /// Two or three human-readable reasons, strongest signal first.
    pub recommendation_reasons: Vec<String>,
    pub confidence: f64,
    pub signals: Vec<ScopeSignal>,
}

impl ScopeDetectionResult {
    pub fn signal(&self, name: &str) -> Option<&ScopeSignal> {
        self.signals.iter().find(|s| s.name == name)
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// A validated config with its keyword patterns compiled once, for scoring
/// many inputs against the same config.
#[derive(Debug, Clone)]
pub struct ScopeDetector {
    config: ScopeDetectionConfig,
    keywords: KeywordMatcher,
}

impl ScopeDetector {
    pub fn new(config: ScopeDetectionConfig) -> Result<Self> {
        config.validate()?;
        let keywords = KeywordMatcher::new(&config.complexity_keywords)?;
        Ok(Self { config, keywords })
    }

    pub fn detect(&self, input: &ScopeDetectionInput) -> Result<ScopeDetectionResult> {
        let config = &self.config;
        input.validate(config)?;

        let keywords = self.keywords.matches(&input.normalized_description());
        let signals = score_signals(input, config, &keywords);

        let raw_score = signals
            .iter()
            .fold(0u32, |sum, signal| sum.saturating_add(signal.score));
        let total_score = raw_score.min(config.max_total_score);
        let mode = mode_for_score(total_score, config);
        let recommendation_reasons = build_reasons(&signals, mode);
        let confidence = compute_confidence(input, total_score, &signals, keywords.len(), config);

        tracing::debug!(
            total_score,
            raw_score,
            mode = %mode,
            confidence,
            keywords = keywords.len(),
            "scope detected"
        );

        Ok(ScopeDetectionResult {
            contract_version: CONTRACT_VERSION.to_string(),
            total_score,
            score_band: score_band_label(mode, config),
            mode_recommendation: mode,
            recommendation_reasons,
            confidence,
            signals,
        })
    }
}

/// Score `input` against `config` (defaults when `None`).
pub fn detect_scope(
    input: &ScopeDetectionInput,
    config: Option<&ScopeDetectionConfig>,
) -> Result<ScopeDetectionResult> {
    let config = config.cloned().unwrap_or_default();
    ScopeDetector::new(config)?.detect(input)
}

/// Detect with the layered config of the project at `root`.
pub fn detect_scope_for_project(
    input: &ScopeDetectionInput,
    root: &Path,
) -> Result<ScopeDetectionResult> {
    let config = ScopeDetectionConfig::load(root)?;
    detect_scope(input, Some(&config))
}

pub fn detect_scope_for_project_with_env<I, K, V>(
    input: &ScopeDetectionInput,
    root: &Path,
    vars: I,
) -> Result<ScopeDetectionResult>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let config = ScopeDetectionConfig::load_with_env(root, vars)?;
    detect_scope(input, Some(&config))
}

/// Inclusive upper bounds: `<= feature_max_score` is FEATURE, `<= epic_max_score`
/// is EPIC, anything above is PROGRAM.
pub fn mode_for_score(score: u32, config: &ScopeDetectionConfig) -> ScopeMode {
    if score <= config.feature_max_score {
        ScopeMode::Feature
    } else if score <= config.epic_max_score {
        ScopeMode::Epic
    } else {
        ScopeMode::Program
    }
}

/// "0-34", "35-64", "65+" for the default boundaries.
pub fn score_band_label(mode: ScopeMode, config: &ScopeDetectionConfig) -> String {
    match mode {
        ScopeMode::Feature => format!("0-{}", config.feature_max_score),
        ScopeMode::Epic => format!(
            "{}-{}",
            config.feature_max_score.saturating_add(1),
            config.epic_max_score
        ),
        ScopeMode::Program => format!("{}+", config.epic_max_score.saturating_add(1)),
    }
}

/// Whole-word keyword patterns compiled into one set. "sso" does not match
/// inside "blossom".
#[derive(Debug, Clone)]
struct KeywordMatcher {
    keywords: Vec<String>,
    patterns: RegexSet,
}

impl KeywordMatcher {
    fn new(keywords: &BTreeSet<String>) -> Result<Self> {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
            .filter(|k| !k.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let patterns = RegexSet::new(
            keywords
                .iter()
                .map(|k| format!(r"(?:^|\W){}(?:\W|$)", regex::escape(k))),
        )
        .map_err(|e| SpecKitError::InvalidConfig(format!("complexity_keywords: {e}")))?;
        Ok(Self { keywords, patterns })
    }

    /// Matches in an already normalized description, sorted and deduplicated.
    fn matches(&self, description: &str) -> Vec<String> {
        self.patterns
            .matches(description)
            .into_iter()
            .map(|i| self.keywords[i].clone())
            .collect()
    }
}

/// `min(cap, max(0, raw_delta) * multiplier)`
fn scaled(raw_delta: u32, multiplier: u32, cap: u32) -> u32 {
    raw_delta.saturating_mul(multiplier).min(cap)
}

fn score_signals(
    input: &ScopeDetectionInput,
    config: &ScopeDetectionConfig,
    keywords: &[String],
) -> Vec<ScopeSignal> {
    // The first week, work item, domain and team are free; dependencies and
    // integration surfaces count from zero.
    let weeks = input.estimated_timeline_weeks;
    let timeline = scaled(
        weeks.saturating_sub(1),
        config.timeline_multiplier,
        config.timeline_cap,
    );
    let items = input.expected_work_items;
    let work_items = scaled(
        items.saturating_sub(1),
        config.work_items_multiplier,
        config.work_items_cap,
    );
    let deps = input.dependency_count;
    let dependency = scaled(deps, config.dependency_multiplier, config.dependency_cap);
    let surfaces = input.integration_surface_count;
    let integration = scaled(surfaces, config.integration_multiplier, config.integration_cap);
    let domains = input.domain_count;
    let domain = scaled(
        domains.saturating_sub(1),
        config.domain_multiplier,
        config.domain_cap,
    );
    let teams = input.cross_team_count;
    let cross_team = scaled(
        teams.saturating_sub(1),
        config.cross_team_multiplier,
        config.cross_team_cap,
    );
    let risk_level = input.normalized_risk_level();
    let risk = config.risk_weights.get(&risk_level).copied().unwrap_or(0);
    let compliance = if input.requires_compliance_review {
        config.compliance_points
    } else {
        0
    };
    let migration = if input.requires_migration {
        config.migration_points
    } else {
        0
    };
    let keyword_score = u32::try_from(keywords.len())
        .unwrap_or(u32::MAX)
        .min(config.keyword_cap);
    let keyword_list = if keywords.is_empty() {
        "none".to_string()
    } else {
        keywords.join(", ")
    };

    vec![
        ScopeSignal {
            name: SIGNAL_NAMES[0].to_string(),
            value: SignalValue::Count(weeks),
            weight: config.timeline_multiplier,
            score: timeline,
            rationale: format!(
                "Estimated timeline of {weeks} weeks adds {timeline} complexity points."
            ),
        },
        ScopeSignal {
            name: SIGNAL_NAMES[1].to_string(),
            value: SignalValue::Count(items),
            weight: config.work_items_multiplier,
            score: work_items,
            rationale: format!(
                "{items} expected work items call for deeper decomposition ({work_items} points)."
            ),
        },
        ScopeSignal {
            name: SIGNAL_NAMES[2].to_string(),
            value: SignalValue::Count(deps),
            weight: config.dependency_multiplier,
            score: dependency,
            rationale: format!(
                "{deps} external dependencies raise coordination and operational risk \
                 ({dependency} points)."
            ),
        },
        ScopeSignal {
            name: SIGNAL_NAMES[3].to_string(),
            value: SignalValue::Count(surfaces),
            weight: config.integration_multiplier,
            score: integration,
            rationale: format!(
                "{surfaces} integration surfaces add technical coupling ({integration} points)."
            ),
        },
        ScopeSignal {
            name: SIGNAL_NAMES[4].to_string(),
            value: SignalValue::Count(domains),
            weight: config.domain_multiplier,
            score: domain,
            rationale: format!(
                "{domains} business domains involved indicate scope breadth ({domain} points)."
            ),
        },
        ScopeSignal {
            name: SIGNAL_NAMES[5].to_string(),
            value: SignalValue::Count(teams),
            weight: config.cross_team_multiplier,
            score: cross_team,
            rationale: format!(
                "{teams} impacted teams increase alignment cost ({cross_team} points)."
            ),
        },
        ScopeSignal {
            name: SIGNAL_NAMES[6].to_string(),
            rationale: format!("Declared risk '{risk_level}' adds {risk} points."),
            value: SignalValue::Level(risk_level),
            weight: 1,
            score: risk,
        },
        ScopeSignal {
            name: SIGNAL_NAMES[7].to_string(),
            value: SignalValue::Flag(input.requires_compliance_review),
            weight: config.compliance_points,
            score: compliance,
            rationale: format!(
                "Formal compliance review adds validation steps and approval dependencies \
                 ({compliance} points)."
            ),
        },
        ScopeSignal {
            name: SIGNAL_NAMES[8].to_string(),
            value: SignalValue::Flag(input.requires_migration),
            weight: config.migration_points,
            score: migration,
            rationale: format!(
                "Migration or cutover adds transition and rollback risk ({migration} points)."
            ),
        },
        ScopeSignal {
            name: SIGNAL_NAMES[9].to_string(),
            value: SignalValue::Keywords(keywords.to_vec()),
            weight: 1,
            score: keyword_score,
            rationale: format!(
                "Complexity keywords detected ({keyword_list}) contribute {keyword_score} points."
            ),
        },
    ]
}

fn mode_fallback_reason(mode: ScopeMode) -> &'static str {
    match mode {
        ScopeMode::Feature => {
            "Dependency, risk and coordination signals stay low; delivering a single \
             feature is viable."
        }
        ScopeMode::Epic => {
            "Intermediate complexity spans several relevant vectors; decompose into \
             features before generating final tasks."
        }
        ScopeMode::Program => {
            "High aggregate complexity calls for a program structure with progressive \
             decomposition into epics and features."
        }
    }
}

/// Top three positive signals by (score desc, name asc), padded to two with
/// deterministic fallbacks.
fn build_reasons(signals: &[ScopeSignal], mode: ScopeMode) -> Vec<String> {
    let mut positive: Vec<&ScopeSignal> = signals.iter().filter(|s| s.score > 0).collect();
    positive.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));

    let mut reasons: Vec<String> = positive
        .iter()
        .take(3)
        .map(|s| s.rationale.clone())
        .collect();
    if reasons.len() < 2 {
        reasons.push(mode_fallback_reason(mode).to_string());
    }
    if reasons.len() < 2 {
        reasons.push(GENERIC_FALLBACK_REASON.to_string());
    }
    reasons
}

fn compute_confidence(
    input: &ScopeDetectionInput,
    score: u32,
    signals: &[ScopeSignal],
    keyword_count: usize,
    config: &ScopeDetectionConfig,
) -> f64 {
    let active_signals = signals.iter().filter(|s| s.score > 0).count() as f64;
    let boundary_distance = config
        .boundary_points()
        .iter()
        .map(|point| score.abs_diff(*point))
        .min()
        .unwrap_or(u32::MAX);

    let mut confidence = config.confidence_base;
    confidence += (active_signals * config.confidence_active_signal_step)
        .min(config.confidence_active_signal_cap);
    confidence +=
        (keyword_count as f64 * config.confidence_keyword_step).min(config.confidence_keyword_cap);
    if boundary_distance <= config.boundary_distance_threshold {
        confidence -= config.boundary_penalty;
    }
    if input.description.split_whitespace().count() < config.short_description_word_threshold {
        confidence -= config.short_description_penalty;
    }
    round2(confidence.clamp(config.confidence_min, config.confidence_max))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
