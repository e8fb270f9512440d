use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SPECIFY_DIR: &str = ".specify";

/// Project-shared configuration, committed to the repository.
pub const PROJECT_CONFIG_FILE: &str = ".specify/spec-kit.yml";
/// Machine-local overrides; should stay out of version control.
pub const LOCAL_CONFIG_FILE: &str = ".specify/spec-kit.local.yml";

pub const SCOPE_GATE_FILE: &str = ".specify/scope-gate.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn project_config_path(root: &Path) -> PathBuf {
    root.join(PROJECT_CONFIG_FILE)
}

pub fn local_config_path(root: &Path) -> PathBuf {
    root.join(LOCAL_CONFIG_FILE)
}

pub fn scope_gate_path(root: &Path) -> PathBuf {
    root.join(SCOPE_GATE_FILE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
