use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecKitError {
    #[error("invalid scope detection config: {0}")]
    InvalidConfig(String),

    #[error("Unknown scope_detection config keys: {0}")]
    UnknownConfigKeys(String),

    /// Out-of-range or semantically invalid detection input.
    #[error("{0}")]
    InvalidInput(String),

    /// Detection input field carried the wrong JSON type.
    #[error("{0}")]
    InvalidInputType(String),

    #[error("invalid scoring rubric: {0}")]
    InvalidRubric(String),

    #[error("Scope gate payload validation failed: {0}")]
    GateValidation(String),

    #[error("Invalid YAML in {path}: {message}")]
    InvalidYaml { path: String, message: String },

    #[error("Config file {0} must contain a YAML mapping at top level")]
    ConfigNotMapping(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SpecKitError>;
