use crate::config::ProjectConfig;
use crate::error::{Result, SpecKitError};
use crate::types::ScopeMode;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const DEFAULT_COMPLEXITY_KEYWORDS: &[&str] = &[
    "platform",
    "migration",
    "rollout",
    "integration",
    "compliance",
    "audit",
    "multi-tenant",
    "legacy",
    "cross-team",
    "multi-region",
    "portfolio",
    "sso",
    "billing",
    "observability",
    "security",
];

pub const DEFAULT_RISK_WEIGHTS: &[(&str, u32)] =
    &[("low", 0), ("medium", 6), ("high", 12), ("critical", 18)];

/// Every key accepted in the `scope_detection` config section.
pub const FIELD_NAMES: &[&str] = &[
    "timeline_multiplier",
    "timeline_cap",
    "work_items_multiplier",
    "work_items_cap",
    "dependency_multiplier",
    "dependency_cap",
    "integration_multiplier",
    "integration_cap",
    "domain_multiplier",
    "domain_cap",
    "cross_team_multiplier",
    "cross_team_cap",
    "compliance_points",
    "migration_points",
    "keyword_cap",
    "feature_max_score",
    "epic_max_score",
    "max_total_score",
    "confidence_base",
    "confidence_active_signal_step",
    "confidence_active_signal_cap",
    "confidence_keyword_step",
    "confidence_keyword_cap",
    "boundary_distance_threshold",
    "boundary_penalty",
    "short_description_word_threshold",
    "short_description_penalty",
    "confidence_min",
    "confidence_max",
    "complexity_keywords",
    "risk_weights",
];

// ---------------------------------------------------------------------------
// ScopeDetectionConfig
// ---------------------------------------------------------------------------

/// Weights, caps, band boundaries and confidence heuristics for scope
/// detection. Build a new value to change anything; detection never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScopeDetectionConfig {
    pub timeline_multiplier: u32,
    pub timeline_cap: u32,
    pub work_items_multiplier: u32,
    pub work_items_cap: u32,
    pub dependency_multiplier: u32,
    pub dependency_cap: u32,
    pub integration_multiplier: u32,
    pub integration_cap: u32,
    pub domain_multiplier: u32,
    pub domain_cap: u32,
    pub cross_team_multiplier: u32,
    pub cross_team_cap: u32,
    pub compliance_points: u32,
    pub migration_points: u32,
    pub keyword_cap: u32,

    /// Inclusive upper bound of the FEATURE band.
    pub feature_max_score: u32,
    /// Inclusive upper bound of the EPIC band.
    pub epic_max_score: u32,
    pub max_total_score: u32,

    pub confidence_base: f64,
    pub confidence_active_signal_step: f64,
    pub confidence_active_signal_cap: f64,
    pub confidence_keyword_step: f64,
    pub confidence_keyword_cap: f64,
    pub boundary_distance_threshold: u32,
    pub boundary_penalty: f64,
    pub short_description_word_threshold: usize,
    pub short_description_penalty: f64,
    pub confidence_min: f64,
    pub confidence_max: f64,

    /// Lower-cased, whitespace-collapsed. Matched as whole words.
    #[serde(deserialize_with = "deserialize_keywords")]
    pub complexity_keywords: BTreeSet<String>,
    /// Risk level name (lower-cased) to points.
    #[serde(deserialize_with = "deserialize_risk_weights")]
    pub risk_weights: BTreeMap<String, u32>,
}

impl Default for ScopeDetectionConfig {
    fn default() -> Self {
        Self {
            timeline_multiplier: 1,
            timeline_cap: 10,
            work_items_multiplier: 5,
            work_items_cap: 20,
            dependency_multiplier: 3,
            dependency_cap: 15,
            integration_multiplier: 3,
            integration_cap: 12,
            domain_multiplier: 10,
            domain_cap: 20,
            cross_team_multiplier: 6,
            cross_team_cap: 12,
            compliance_points: 7,
            migration_points: 9,
            keyword_cap: 12,
            feature_max_score: 34,
            epic_max_score: 64,
            max_total_score: 100,
            confidence_base: 0.55,
            confidence_active_signal_step: 0.04,
            confidence_active_signal_cap: 0.30,
            confidence_keyword_step: 0.01,
            confidence_keyword_cap: 0.10,
            boundary_distance_threshold: 1,
            boundary_penalty: 0.08,
            short_description_word_threshold: 8,
            short_description_penalty: 0.05,
            confidence_min: 0.35,
            confidence_max: 0.95,
            complexity_keywords: DEFAULT_COMPLEXITY_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            risk_weights: DEFAULT_RISK_WEIGHTS
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}

impl ScopeDetectionConfig {
    /// Build from an untyped `scope_detection` mapping, e.g. the merged
    /// project config. Unknown keys are rejected rather than ignored.
    pub fn from_mapping(values: &Mapping) -> Result<Self> {
        let unknown: BTreeSet<String> = values
            .keys()
            .filter_map(|key| match key.as_str() {
                Some(name) if FIELD_NAMES.contains(&name) => None,
                Some(name) => Some(name.to_string()),
                None => Some(format!("{key:?}")),
            })
            .collect();
        if !unknown.is_empty() {
            let names: Vec<String> = unknown.into_iter().collect();
            return Err(SpecKitError::UnknownConfigKeys(names.join(", ")));
        }

        let config: Self = serde_yaml::from_value(Value::Mapping(values.clone()))
            .map_err(|e| SpecKitError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config for a project root, env overrides included.
    pub fn load(root: &Path) -> Result<Self> {
        ProjectConfig::load(root)?.scope_detection()
    }

    pub fn load_with_env<I, K, V>(root: &Path, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        ProjectConfig::load_with_env(root, vars)?.scope_detection()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Result<()> {
        if self.feature_max_score >= self.epic_max_score
            || self.epic_max_score >= self.max_total_score
        {
            return Err(SpecKitError::InvalidConfig(format!(
                "score boundaries must be strictly increasing: feature_max_score ({}) < \
                 epic_max_score ({}) < max_total_score ({})",
                self.feature_max_score, self.epic_max_score, self.max_total_score
            )));
        }

        for (name, bound) in [
            ("confidence_min", self.confidence_min),
            ("confidence_max", self.confidence_max),
        ] {
            if !(0.0..=1.0).contains(&bound) {
                return Err(SpecKitError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {bound}"
                )));
            }
        }
        if self.confidence_min >= self.confidence_max {
            return Err(SpecKitError::InvalidConfig(format!(
                "confidence_min ({}) must be lower than confidence_max ({})",
                self.confidence_min, self.confidence_max
            )));
        }

        for (name, value) in [
            ("confidence_base", self.confidence_base),
            ("confidence_active_signal_step", self.confidence_active_signal_step),
            ("confidence_active_signal_cap", self.confidence_active_signal_cap),
            ("confidence_keyword_step", self.confidence_keyword_step),
            ("confidence_keyword_cap", self.confidence_keyword_cap),
            ("boundary_penalty", self.boundary_penalty),
            ("short_description_penalty", self.short_description_penalty),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SpecKitError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        if self.risk_weights.is_empty() {
            return Err(SpecKitError::InvalidConfig(
                "risk_weights must define at least one risk level".to_string(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Band helpers
    // -----------------------------------------------------------------------

    /// The three bands as `(mode, min_score, max_score)`, inclusive.
    pub fn score_bands(&self) -> [(ScopeMode, u32, u32); 3] {
        [
            (ScopeMode::Feature, 0, self.feature_max_score),
            (
                ScopeMode::Epic,
                self.feature_max_score.saturating_add(1),
                self.epic_max_score,
            ),
            (
                ScopeMode::Program,
                self.epic_max_score.saturating_add(1),
                self.max_total_score,
            ),
        ]
    }

    /// Scores on either side of each band edge.
    pub fn boundary_points(&self) -> [u32; 4] {
        [
            self.feature_max_score,
            self.feature_max_score.saturating_add(1),
            self.epic_max_score,
            self.epic_max_score.saturating_add(1),
        ]
    }

    /// Configured risk level names, sorted.
    pub fn risk_levels(&self) -> Vec<&str> {
        self.risk_weights.keys().map(String::as_str).collect()
    }
}

// ---------------------------------------------------------------------------
// Field normalization
// ---------------------------------------------------------------------------

fn normalize_keywords<I: IntoIterator<Item = String>>(items: I) -> BTreeSet<String> {
    items
        .into_iter()
        .map(|k| k.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn deserialize_keywords<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<BTreeSet<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(normalize_keywords(s.split(',').map(str::to_string))),
        Value::Sequence(items) => {
            let mut keywords = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => keywords.push(s),
                    _ => {
                        return Err(D::Error::custom(
                            "complexity_keywords entries must be strings",
                        ))
                    }
                }
            }
            Ok(normalize_keywords(keywords))
        }
        _ => Err(D::Error::custom(
            "complexity_keywords must be a string or a list of strings",
        )),
    }
}

fn deserialize_risk_weights<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, u32>, D::Error> {
    let Value::Mapping(entries) = Value::deserialize(deserializer)? else {
        return Err(D::Error::custom("risk_weights must be a mapping"));
    };
    let mut weights = BTreeMap::new();
    for (key, value) in entries {
        let name = key
            .as_str()
            .map(|k| k.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| D::Error::custom("risk_weights keys must be non-empty strings"))?;
        // Booleans and floats are not numbers we accept, even when YAML would coerce them.
        let weight = match &value {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            _ => None,
        }
        .ok_or_else(|| {
            D::Error::custom(format!("risk_weights.{name} must be a non-negative integer"))
        })?;
        weights.insert(name, weight);
    }
    Ok(weights)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
