use crate::cmd::{read_document, read_object};
use crate::output::{print_field, print_json, print_table};
use anyhow::Context;
use clap::{Args, Subcommand};
use speckit_core::detection::{detect_scope, ScopeDetectionInput, ScopeDetectionResult, SignalValue};
use speckit_core::gate::{
    build_scope_gate_payload, normalize_scope_gate_payload, validate_scope_gate_payload,
    GateDecision, ScopeGateContractIssue, ScopeGatePayload,
};
use speckit_core::io::atomic_write;
use speckit_core::paths;
use speckit_core::rubric::{scope_scoring_rubric, validate_scope_scoring_rubric_payload};
use speckit_core::scope_config::ScopeDetectionConfig;
use speckit_core::types::{GateChannel, ScopeMode};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ScopeSubcommand {
    /// Score a work request and recommend feature, epic, or program scope
    Detect {
        #[command(flatten)]
        input: DetectArgs,
    },

    /// Detect scope and wrap the result in a scope gate payload
    Gate {
        #[command(flatten)]
        input: DetectArgs,
        /// Mode chosen by the team (default: the recommendation)
        #[arg(long)]
        choice: Option<String>,
        /// Why the recommendation was overridden
        #[arg(long)]
        rationale: Option<String>,
        /// Override the default next action for the chosen mode
        #[arg(long)]
        next_action: Option<String>,
        /// Override the default handoff owner for the chosen mode
        #[arg(long)]
        handoff_owner: Option<String>,
        /// Relative path of an artifact created at the gate (repeatable)
        #[arg(long = "artifact", value_name = "PATH")]
        artifacts: Vec<String>,
        /// Channel recorded in the payload: cli, tty, or api
        #[arg(long, default_value = "cli")]
        channel: String,
        /// Write the payload JSON to this file
        #[arg(long, conflicts_with = "save")]
        out: Option<PathBuf>,
        /// Write the payload JSON to .specify/scope-gate.json
        #[arg(long)]
        save: bool,
    },

    /// Rebuild a gate payload from another channel into the stable shape
    Normalize {
        /// JSON or YAML payload file
        file: PathBuf,
        /// Fail on unknown fields and error-severity issues
        #[arg(long)]
        strict: bool,
    },

    /// Report contract issues in a gate payload (strict by default)
    Validate {
        /// JSON or YAML payload file
        file: PathBuf,
        /// Report issues without failing
        #[arg(long)]
        lenient: bool,
    },

    /// Print the scoring rubric for the active config, or check a rubric document
    Rubric {
        /// Rubric document to validate instead of printing
        #[arg(long, value_name = "FILE")]
        check: Option<PathBuf>,
        /// Accept unknown top-level keys when checking
        #[arg(long, requires = "check")]
        lenient: bool,
    },
}

/// Detection input, either from flags or from a JSON/YAML file.
#[derive(Args)]
pub struct DetectArgs {
    /// Work request description
    #[arg(long, short = 'd', required_unless_present = "input")]
    description: Option<String>,
    /// Estimated timeline in weeks
    #[arg(long, default_value_t = 1)]
    weeks: u32,
    /// Expected number of work items
    #[arg(long, default_value_t = 1)]
    work_items: u32,
    /// External dependencies
    #[arg(long, default_value_t = 0)]
    dependencies: u32,
    /// Integration surfaces touched
    #[arg(long, default_value_t = 0)]
    integrations: u32,
    /// Business domains involved
    #[arg(long, default_value_t = 1)]
    domains: u32,
    /// Teams impacted
    #[arg(long, default_value_t = 1)]
    teams: u32,
    /// Risk level: low, medium, high, critical
    #[arg(long, default_value = "low")]
    risk: String,
    /// A formal compliance review is required
    #[arg(long)]
    compliance: bool,
    /// A data or system migration is required
    #[arg(long)]
    migration: bool,
    /// Read the detection input from a JSON or YAML file
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = [
            "description",
            "weeks",
            "work_items",
            "dependencies",
            "integrations",
            "domains",
            "teams",
            "risk",
            "compliance",
            "migration",
        ]
    )]
    input: Option<PathBuf>,
}

impl DetectArgs {
    fn to_input(&self) -> anyhow::Result<ScopeDetectionInput> {
        if let Some(path) = &self.input {
            let object = read_object(path)?;
            return ScopeDetectionInput::from_mapping(&object)
                .with_context(|| format!("invalid detection input in {}", path.display()));
        }
        Ok(ScopeDetectionInput {
            description: self.description.clone().unwrap_or_default(),
            estimated_timeline_weeks: self.weeks,
            expected_work_items: self.work_items,
            dependency_count: self.dependencies,
            integration_surface_count: self.integrations,
            domain_count: self.domains,
            cross_team_count: self.teams,
            risk_level: self.risk.clone(),
            requires_compliance_review: self.compliance,
            requires_migration: self.migration,
        })
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ScopeSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ScopeSubcommand::Detect { input } => detect(root, &input, json),
        ScopeSubcommand::Gate {
            input,
            choice,
            rationale,
            next_action,
            handoff_owner,
            artifacts,
            channel,
            out,
            save,
        } => {
            let decision = GateDecision {
                user_choice: choice.as_deref().map(str::parse::<ScopeMode>).transpose()?,
                override_rationale: rationale,
                next_action,
                handoff_owner,
                artifacts_created: (!artifacts.is_empty()).then_some(artifacts),
                channel: channel.parse::<GateChannel>()?,
            };
            let out = if save {
                Some(paths::scope_gate_path(root))
            } else {
                out
            };
            gate(root, &input, decision, out.as_deref(), json)
        }
        ScopeSubcommand::Normalize { file, strict } => normalize(&file, strict, json),
        ScopeSubcommand::Validate { file, lenient } => validate(&file, !lenient, json),
        ScopeSubcommand::Rubric { check, lenient } => match check {
            Some(file) => check_rubric(&file, !lenient, json),
            None => rubric(root, json),
        },
    }
}

fn load_config(root: &Path) -> anyhow::Result<ScopeDetectionConfig> {
    ScopeDetectionConfig::load(root).context("failed to load scope detection config")
}

// ---------------------------------------------------------------------------
// detect
// ---------------------------------------------------------------------------

fn detect(root: &Path, args: &DetectArgs, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let input = args.to_input()?;
    let result = detect_scope(&input, Some(&config)).context("scope detection failed")?;

    if json {
        return print_json(&result);
    }
    print_detection(&result);
    Ok(())
}

fn print_detection(result: &ScopeDetectionResult) {
    print_field(
        "Mode",
        format!("{} ({})", result.mode_recommendation, result.score_band),
    );
    print_field("Score", result.total_score);
    print_field("Confidence", format!("{:.2}", result.confidence));
    println!("Reasons:");
    for reason in &result.recommendation_reasons {
        println!("  - {reason}");
    }
    println!();
    let rows = result
        .signals
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                signal_value_display(&s.value),
                s.weight.to_string(),
                s.score.to_string(),
            ]
        })
        .collect();
    print_table(&["SIGNAL", "VALUE", "WEIGHT", "SCORE"], rows);
}

fn signal_value_display(value: &SignalValue) -> String {
    match value {
        SignalValue::Count(n) => n.to_string(),
        SignalValue::Flag(true) => "yes".to_string(),
        SignalValue::Flag(false) => "no".to_string(),
        SignalValue::Level(level) => level.clone(),
        SignalValue::Keywords(k) if k.is_empty() => "-".to_string(),
        SignalValue::Keywords(k) => k.join(", "),
    }
}

// ---------------------------------------------------------------------------
// gate
// ---------------------------------------------------------------------------

fn gate(
    root: &Path,
    args: &DetectArgs,
    decision: GateDecision,
    out: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let input = args.to_input()?;
    let result = detect_scope(&input, Some(&config)).context("scope detection failed")?;
    let payload = build_scope_gate_payload(&result, decision);

    if let Some(path) = out {
        let mut data = serde_json::to_vec_pretty(&payload)?;
        data.push(b'\n');
        atomic_write(path, &data)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), "wrote scope gate payload");
    }

    if json {
        return print_json(&payload);
    }
    print_payload(&payload);
    if let Some(path) = out {
        println!();
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn print_payload(payload: &ScopeGatePayload) {
    print_field("Recommendation", payload.mode_recommendation);
    let choice = if payload.override_flag {
        format!("{} (override)", payload.user_choice)
    } else {
        payload.user_choice.to_string()
    };
    print_field("Choice", choice);
    if let Some(rationale) = &payload.override_rationale {
        print_field("Rationale", rationale);
    }
    print_field("Next action", &payload.next_action);
    print_field("Handoff owner", &payload.handoff_owner);
    print_field("Channel", payload.channel);
    if !payload.artifacts_created.is_empty() {
        print_field("Artifacts", payload.artifacts_created.join(", "));
    }
    print_field("Validation", payload.validation_status.status);
    for reason in &payload.validation_status.blocking_reasons {
        println!("  blocking: {reason}");
    }
    if !payload.contract_issues.is_empty() {
        println!();
        print_issues(&payload.contract_issues);
    }
}

fn print_issues(issues: &[ScopeGateContractIssue]) {
    let rows = issues
        .iter()
        .map(|i| {
            vec![
                i.severity.to_string(),
                i.code.to_string(),
                i.field.clone(),
                i.message.clone(),
            ]
        })
        .collect();
    print_table(&["SEVERITY", "CODE", "FIELD", "MESSAGE"], rows);
}

// ---------------------------------------------------------------------------
// normalize / validate
// ---------------------------------------------------------------------------

fn normalize(file: &Path, strict: bool, json: bool) -> anyhow::Result<()> {
    let raw = read_object(file)?;
    let payload = normalize_scope_gate_payload(&raw, strict)?;
    if json {
        return print_json(&payload);
    }
    print_payload(&payload);
    Ok(())
}

fn validate(file: &Path, strict: bool, json: bool) -> anyhow::Result<()> {
    let raw = read_object(file)?;
    let issues = validate_scope_gate_payload(&raw, strict)?;
    if json {
        let errors = issues.iter().filter(|i| i.is_error()).count();
        return print_json(&serde_json::json!({
            "valid": errors == 0,
            "issues": issues,
        }));
    }
    if issues.is_empty() {
        println!("Payload is valid. No contract issues.");
    } else {
        print_issues(&issues);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// rubric
// ---------------------------------------------------------------------------

fn rubric(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let rubric = scope_scoring_rubric(&config).context("failed to build scoring rubric")?;
    if json {
        return print_json(&rubric);
    }

    print_field("Rubric", &rubric.rubric_version);
    print_field("Aggregation", &rubric.aggregation_formula);
    println!();
    let bands = rubric
        .score_bands
        .iter()
        .map(|b| {
            vec![
                b.mode.to_string(),
                b.min_score.to_string(),
                b.max_score.to_string(),
            ]
        })
        .collect();
    print_table(&["MODE", "MIN", "MAX"], bands);
    println!();
    let dimensions = rubric
        .dimensions
        .iter()
        .map(|d| {
            let opt = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
            vec![
                d.name.clone(),
                d.scoring_type.as_str().to_string(),
                opt(d.multiplier),
                opt(d.cap.or(d.points)),
            ]
        })
        .collect();
    print_table(&["DIMENSION", "TYPE", "MULTIPLIER", "CAP/POINTS"], dimensions);
    Ok(())
}

fn check_rubric(file: &Path, strict: bool, json: bool) -> anyhow::Result<()> {
    let document = read_document(file)?;
    validate_scope_scoring_rubric_payload(&document, strict)?;
    if json {
        print_json(&serde_json::json!({ "valid": true }))
    } else {
        println!("Rubric is valid.");
        Ok(())
    }
}
