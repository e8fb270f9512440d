pub mod config;
pub mod scope;

use anyhow::Context;
use std::path::Path;

/// Read a JSON or YAML document into a JSON object.
pub fn read_object(path: &Path) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    match read_document(path)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{} must contain an object at top level", path.display()),
    }
}

/// Read a document as JSON when the extension says so, otherwise as YAML.
pub fn read_document(path: &Path) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if path.extension().is_some_and(|ext| ext == "json") {
        return serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()));
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    serde_json::to_value(yaml)
        .with_context(|| format!("{} is not representable as JSON", path.display()))
}
