use crate::output::{print_field, print_json};
use anyhow::Context;
use clap::Subcommand;
use speckit_core::config::{ProjectConfig, ENV_CONFIG_PREFIX};
use speckit_core::io::{ensure_gitignore_entry, write_if_missing};
use speckit_core::paths::{self, LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE};
use std::path::Path;

const STARTER_CONFIG: &str = "\
schema_version: 1

# Scope detection overrides. Unknown keys are rejected.
# Machine-local overrides go in .specify/spec-kit.local.yml;
# environment overrides use SPECIFY_CONFIG__SCOPE_DETECTION__<KEY>.
scope_detection: {}
";

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the merged project config (defaults, project, local, environment)
    Show,

    /// Check that the scope detection config is valid
    Validate,

    /// Write a starter .specify/spec-kit.yml and ignore the local override file
    Init,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
        ConfigSubcommand::Init => init(root, json),
    }
}

fn load(root: &Path) -> anyhow::Result<ProjectConfig> {
    ProjectConfig::load(root).context("failed to load project config")
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load(root)?;
    if json {
        return print_json(config.as_mapping());
    }
    print!("{}", serde_yaml::to_string(config.as_mapping())?);
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load(root)?;
    let scope = config
        .scope_detection()
        .context("scope_detection config is invalid")?;

    if json {
        return print_json(&serde_json::json!({
            "valid": true,
            "schema_version": config.schema_version(),
            "scope_detection": scope,
        }));
    }
    println!("Config is valid.");
    print_field(
        "Bands",
        scope
            .score_bands()
            .iter()
            .map(|(mode, min, max)| format!("{mode} {min}-{max}"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    print_field("Risk levels", scope.risk_levels().join(", "));
    print_field("Keywords", scope.complexity_keywords.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(root: &Path, json: bool) -> anyhow::Result<()> {
    let config_path = paths::project_config_path(root);
    let created = write_if_missing(&config_path, STARTER_CONFIG.as_bytes())
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    let ignored =
        ensure_gitignore_entry(root, LOCAL_CONFIG_FILE).context("failed to update .gitignore")?;

    if json {
        return print_json(&serde_json::json!({
            "config": PROJECT_CONFIG_FILE,
            "created": created,
            "gitignore_updated": ignored,
        }));
    }
    if created {
        println!("Created {PROJECT_CONFIG_FILE}");
    } else {
        println!("{PROJECT_CONFIG_FILE} already exists; left unchanged");
    }
    if ignored {
        println!("Added {LOCAL_CONFIG_FILE} to .gitignore");
    }
    println!("Environment overrides use the {ENV_CONFIG_PREFIX} prefix.");
    Ok(())
}
