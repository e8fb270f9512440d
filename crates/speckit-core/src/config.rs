//! Layered project configuration.
//!
//! Precedence, lowest to highest:
//! 1. built-in defaults
//! 2. `.specify/spec-kit.yml` (project-shared, committed)
//! 3. `.specify/spec-kit.local.yml` (machine-local, gitignored)
//! 4. `SPECIFY_CONFIG__...` environment overrides

use crate::error::{Result, SpecKitError};
use crate::paths;
use crate::scope_config::ScopeDetectionConfig;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;

pub const ENV_CONFIG_PREFIX: &str = "SPECIFY_CONFIG__";
pub const SCHEMA_VERSION: u64 = 1;

const SCOPE_DETECTION_KEY: &str = "scope_detection";

/// `{schema_version: 1, scope_detection: {}}`
pub fn default_project_config() -> Mapping {
    let mut m = Mapping::new();
    m.insert(Value::from("schema_version"), Value::from(SCHEMA_VERSION));
    m.insert(
        Value::from(SCOPE_DETECTION_KEY),
        Value::Mapping(Mapping::new()),
    );
    m
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Recursively merge `overlay` onto `base`, returning a new mapping.
///
/// Nested mappings merge key by key; any other value in `overlay` replaces
/// the value in `base` wholesale (sequences are not concatenated).
pub fn deep_merge(base: &Mapping, overlay: &Mapping) -> Mapping {
    let mut result = base.clone();
    for (key, value) in overlay {
        let merged = match (result.get(key), value) {
            (Some(Value::Mapping(existing)), Value::Mapping(incoming)) => {
                Value::Mapping(deep_merge(existing, incoming))
            }
            _ => value.clone(),
        };
        result.insert(key.clone(), merged);
    }
    result
}

fn load_yaml_mapping(path: &Path) -> Result<Mapping> {
    if !path.exists() {
        return Ok(Mapping::new());
    }
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(Mapping::new());
    }
    let value: Value = serde_yaml::from_str(&data).map_err(|e| SpecKitError::InvalidYaml {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(m) => Ok(m),
        _ => Err(SpecKitError::ConfigNotMapping(path.display().to_string())),
    }
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

/// Parse an env value as a YAML scalar, sequence or mapping, falling back to
/// the raw string when it isn't valid YAML.
pub fn parse_env_value(raw: &str) -> Value {
    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested_value(target: &mut Mapping, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = target;
    for segment in parents {
        let key = Value::from(segment.as_str());
        if !matches!(cursor.get(&key), Some(Value::Mapping(_))) {
            cursor.insert(key.clone(), Value::Mapping(Mapping::new()));
        }
        cursor = match cursor.get_mut(&key) {
            Some(Value::Mapping(next)) => next,
            _ => return,
        };
    }
    cursor.insert(Value::from(last.as_str()), value);
}

/// Turn `SPECIFY_CONFIG__A__B=value` variables into `{a: {b: value}}`.
///
/// Variables are applied in sorted key order so that conflicting paths
/// resolve the same way on every run.
pub fn parse_env_overrides<I, K, V>(vars: I) -> Mapping
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let matching: BTreeMap<String, String> = vars
        .into_iter()
        .filter(|(k, _)| k.as_ref().starts_with(ENV_CONFIG_PREFIX))
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
        .collect();

    let mut overrides = Mapping::new();
    for (key, raw) in &matching {
        let remainder = &key[ENV_CONFIG_PREFIX.len()..];
        let segments: Vec<String> = remainder
            .split("__")
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if segments.is_empty() {
            continue;
        }
        set_nested_value(&mut overrides, &segments, parse_env_value(raw));
    }
    overrides
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

/// The merged configuration mapping for one project root.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    values: Mapping,
}

impl ProjectConfig {
    /// Load with overrides taken from the process environment.
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_with_env(root, std::env::vars())
    }

    pub fn load_with_env<I, K, V>(root: &Path, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::load_with_defaults(root, vars, default_project_config())
    }

    pub fn load_with_defaults<I, K, V>(root: &Path, vars: I, defaults: Mapping) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let layers = [
            load_yaml_mapping(&paths::project_config_path(root))?,
            load_yaml_mapping(&paths::local_config_path(root))?,
            parse_env_overrides(vars),
        ];
        tracing::debug!(
            root = %root.display(),
            project_keys = layers[0].len(),
            local_keys = layers[1].len(),
            env_keys = layers[2].len(),
            "loaded project config layers"
        );
        let values = layers
            .iter()
            .fold(defaults, |merged, layer| deep_merge(&merged, layer));
        Ok(Self { values })
    }

    pub fn from_mapping(values: Mapping) -> Self {
        Self { values }
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.values
    }

    pub fn schema_version(&self) -> Option<u64> {
        self.values.get("schema_version").and_then(Value::as_u64)
    }

    /// The raw `scope_detection` section; absent or null reads as empty.
    pub fn scope_detection_section(&self) -> Result<Mapping> {
        match self.values.get(SCOPE_DETECTION_KEY) {
            None | Some(Value::Null) => Ok(Mapping::new()),
            Some(Value::Mapping(m)) => Ok(m.clone()),
            Some(_) => Err(SpecKitError::InvalidConfig(
                "scope_detection must be a mapping".to_string(),
            )),
        }
    }

    pub fn scope_detection(&self) -> Result<ScopeDetectionConfig> {
        ScopeDetectionConfig::from_mapping(&self.scope_detection_section()?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NO_ENV: [(&str, &str); 0] = [];

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn scope_value<'a>(cfg: &'a ProjectConfig, key: &str) -> &'a Value {
        cfg.as_mapping()
            .get("scope_detection")
            .and_then(|s| s.get(key))
            .unwrap_or_else(|| panic!("missing scope_detection.{key}"))
    }

    #[test]
    fn defaults_when_no_files() {
        let dir = TempDir::new().unwrap();
        let cfg = ProjectConfig::load_with_env(dir.path(), NO_ENV).unwrap();
        assert_eq!(cfg.schema_version(), Some(1));
        assert!(cfg.scope_detection_section().unwrap().is_empty());
    }

    #[test]
    fn project_and_local_merge_with_precedence() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            paths::PROJECT_CONFIG_FILE,
            "schema_version: 1\nscope_detection:\n  work_items_multiplier: 4\n  domain_multiplier: 8\n",
        );
        write(
            dir.path(),
            paths::LOCAL_CONFIG_FILE,
            "scope_detection:\n  work_items_multiplier: 2\n  cross_team_multiplier: 1\n",
        );

        let cfg = ProjectConfig::load_with_env(dir.path(), NO_ENV).unwrap();
        assert_eq!(scope_value(&cfg, "work_items_multiplier").as_u64(), Some(2));
        assert_eq!(scope_value(&cfg, "domain_multiplier").as_u64(), Some(8));
        assert_eq!(scope_value(&cfg, "cross_team_multiplier").as_u64(), Some(1));
    }

    #[test]
    fn env_overrides_are_applied_last() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            paths::PROJECT_CONFIG_FILE,
            "scope_detection:\n  work_items_multiplier: 4\n  keyword_cap: 8\n",
        );
        let env = [
            ("SPECIFY_CONFIG__SCOPE_DETECTION__WORK_ITEMS_MULTIPLIER", "3"),
            (
                "SPECIFY_CONFIG__SCOPE_DETECTION__COMPLEXITY_KEYWORDS",
                r#"["platform","migration","security"]"#,
            ),
            ("UNRELATED_VAR", "ignored"),
        ];

        let cfg = ProjectConfig::load_with_env(dir.path(), env).unwrap();
        assert_eq!(scope_value(&cfg, "work_items_multiplier").as_u64(), Some(3));
        assert_eq!(scope_value(&cfg, "keyword_cap").as_u64(), Some(8));
        let keywords: Vec<&str> = scope_value(&cfg, "complexity_keywords")
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(keywords, ["platform", "migration", "security"]);
    }

    #[test]
    fn env_overrides_handle_nested_paths() {
        let overrides = parse_env_overrides([
            ("SPECIFY_CONFIG__SCOPE_DETECTION__FEATURE_MAX_SCORE", "30"),
            ("SPECIFY_CONFIG__SCOPE_DETECTION__RISK_WEIGHTS__HIGH", "10"),
            ("SPECIFY_CONFIG__", "dropped"),
            ("SPECIFY_CONFIG____", "dropped"),
        ]);
        let scope = overrides.get("scope_detection").unwrap();
        assert_eq!(scope.get("feature_max_score").unwrap().as_u64(), Some(30));
        assert_eq!(
            scope.get("risk_weights").unwrap().get("high").unwrap().as_u64(),
            Some(10)
        );
        assert_eq!(overrides.len(), 1);
    }

    #[test]
    fn env_value_falls_back_to_raw_string() {
        assert_eq!(parse_env_value("2").as_u64(), Some(2));
        assert_eq!(parse_env_value("true"), Value::from(true));
        assert_eq!(parse_env_value("plain text"), Value::from("plain text"));
        assert_eq!(parse_env_value("{ broken: [yaml }"), Value::from("{ broken: [yaml }"));
    }

    #[test]
    fn env_scalar_replaces_nested_mapping_path() {
        let overrides = parse_env_overrides([
            ("SPECIFY_CONFIG__A", "1"),
            ("SPECIFY_CONFIG__A__B", "2"),
        ]);
        // Sorted order: `A` is set first, then replaced by the mapping for `A__B`.
        assert_eq!(
            overrides.get("a").unwrap().get("b").unwrap().as_u64(),
            Some(2)
        );
    }

    #[test]
    fn deep_merge_does_not_mutate_layers() {
        let base: Mapping = serde_yaml::from_str("a:\n  x: 1\n  y: 2\nb: [1, 2]\n").unwrap();
        let overlay: Mapping = serde_yaml::from_str("a:\n  y: 3\nb: [9]\n").unwrap();
        let merged = deep_merge(&base, &overlay);

        let expected: Mapping = serde_yaml::from_str("a:\n  x: 1\n  y: 3\nb: [9]\n").unwrap();
        assert_eq!(merged, expected);
        assert_eq!(base.get("a").unwrap().get("y").unwrap().as_u64(), Some(2));
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), paths::PROJECT_CONFIG_FILE, "{ invalid: [yaml }");
        let err = ProjectConfig::load_with_env(dir.path(), NO_ENV).unwrap_err();
        assert!(err.to_string().contains("Invalid YAML"), "{err}");
    }

    #[test]
    fn non_mapping_yaml_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), paths::PROJECT_CONFIG_FILE, "- just\n- a\n- list\n");
        let err = ProjectConfig::load_with_env(dir.path(), NO_ENV).unwrap_err();
        assert!(err.to_string().contains("must contain a YAML mapping"), "{err}");
    }

    #[test]
    fn empty_file_reads_as_empty_layer() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), paths::LOCAL_CONFIG_FILE, "\n");
        let cfg = ProjectConfig::load_with_env(dir.path(), NO_ENV).unwrap();
        assert_eq!(cfg.as_mapping(), &default_project_config());
    }

    #[test]
    fn scope_detection_section_must_be_a_mapping() {
        let mut values = default_project_config();
        values.insert(Value::from("scope_detection"), Value::from("nope"));
        let cfg = ProjectConfig::from_mapping(values);
        assert!(cfg.scope_detection_section().is_err());
    }
}
