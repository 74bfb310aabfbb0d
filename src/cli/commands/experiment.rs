//! splitlab experiment - Create, list, inspect and update experiments.

use std::collections::HashMap;

use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::cli::commands::{parse_timestamp, split_pair};
use crate::cli::output::{HumanLayout, emit_human, emit_json, format_time, robot_ok};
use crate::core::model::{Experiment, ExperimentStatus, ExperimentWithVariants, NewExperiment, NewVariant};
use crate::error::{LabError, Result};

#[derive(Args, Debug)]
pub struct ExperimentArgs {
    #[command(subcommand)]
    pub command: ExperimentCommand,
}

#[derive(Subcommand, Debug)]
pub enum ExperimentCommand {
    /// Create a new experiment
    Create(ExperimentCreateArgs),
    /// List experiments, newest first
    List(ExperimentListArgs),
    /// Show one experiment with its variants
    Show(ExperimentShowArgs),
    /// Change an experiment's status
    SetStatus(ExperimentSetStatusArgs),
}

#[derive(Args, Debug)]
pub struct ExperimentCreateArgs {
    /// Unique experiment name
    pub name: String,

    /// Event type that counts as a conversion
    #[arg(long)]
    pub metric: String,

    /// Variant and its traffic share as name=percent (repeatable, must total 100)
    #[arg(long, required = true)]
    pub variant: Vec<String>,

    /// Control variant name (default: first --variant)
    #[arg(long)]
    pub control: Option<String>,

    /// Variant configuration payload as name=JSON (repeatable)
    #[arg(long)]
    pub variant_config: Vec<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Initial status
    #[arg(long, default_value = "draft")]
    pub status: String,

    /// Start time (RFC 3339 or YYYY-MM-DD, default: now)
    #[arg(long)]
    pub start: Option<String>,

    /// End time (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<String>,

    /// Planned duration in days
    #[arg(long, default_value = "7")]
    pub target_days: f64,

    /// Target confidence level
    #[arg(long, default_value = "0.95")]
    pub confidence: f64,
}

#[derive(Args, Debug)]
pub struct ExperimentListArgs {
    /// Limit results
    #[arg(long, default_value = "20")]
    pub limit: usize,

    /// Offset results
    #[arg(long, default_value = "0")]
    pub offset: usize,
}

#[derive(Args, Debug)]
pub struct ExperimentShowArgs {
    /// Experiment ID
    pub experiment_id: String,
}

#[derive(Args, Debug)]
pub struct ExperimentSetStatusArgs {
    /// Experiment ID
    pub experiment_id: String,

    /// draft, running, paused, completed or archived
    pub status: String,
}

pub fn run(ctx: &AppContext, args: &ExperimentArgs) -> Result<()> {
    match &args.command {
        ExperimentCommand::Create(args) => run_create(ctx, args),
        ExperimentCommand::List(args) => run_list(ctx, args),
        ExperimentCommand::Show(args) => run_show(ctx, args),
        ExperimentCommand::SetStatus(args) => run_set_status(ctx, args),
    }
}

fn run_create(ctx: &AppContext, args: &ExperimentCreateArgs) -> Result<()> {
    let new = build_new_experiment(args)?;
    let created = ctx.service.create_experiment(new)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(&created));
    }

    let mut layout = HumanLayout::new();
    layout.title("Experiment Created");
    describe(&mut layout, &created);
    emit_human(layout);
    Ok(())
}

fn run_list(ctx: &AppContext, args: &ExperimentListArgs) -> Result<()> {
    let experiments = ctx.service.list_experiments(args.limit, args.offset)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "count": experiments.len(),
            "experiments": experiments,
        })));
    }

    if experiments.is_empty() {
        println!("No experiments found.");
        return Ok(());
    }

    let mut layout = HumanLayout::new();
    layout.title("Experiments");
    for experiment in &experiments {
        summarize(&mut layout, experiment);
        layout.blank();
    }
    emit_human(layout);
    Ok(())
}

fn run_show(ctx: &AppContext, args: &ExperimentShowArgs) -> Result<()> {
    let experiment = ctx.service.get_experiment(&args.experiment_id)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(&experiment));
    }

    let mut layout = HumanLayout::new();
    layout.title(&experiment.experiment.name);
    describe(&mut layout, &experiment);
    emit_human(layout);
    Ok(())
}

fn run_set_status(ctx: &AppContext, args: &ExperimentSetStatusArgs) -> Result<()> {
    let status: ExperimentStatus = args.status.parse()?;
    let updated = ctx.service.set_status(&args.experiment_id, status)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(&updated));
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Status Updated")
        .kv("ID", &updated.id)
        .kv("Status", updated.status.as_str())
        .kv("Updated", &format_time(updated.updated_at));
    emit_human(layout);
    Ok(())
}

fn summarize(layout: &mut HumanLayout, experiment: &Experiment) {
    layout
        .section(&experiment.name)
        .kv("ID", &experiment.id)
        .kv("Status", experiment.status.as_str())
        .kv("Primary metric", &experiment.primary_metric_name)
        .kv("Started", &format_time(experiment.start_time))
        .kv(
            "Ends",
            &experiment
                .end_time
                .map_or_else(|| "-".to_string(), format_time),
        );
}

fn describe(layout: &mut HumanLayout, experiment: &ExperimentWithVariants) {
    summarize(layout, &experiment.experiment);
    if let Some(description) = &experiment.experiment.description {
        layout.kv("Description", description);
    }
    layout.blank().section("Variants");
    for variant in &experiment.variants {
        let marker = if variant.is_control { " (control)" } else { "" };
        layout.bullet(&format!(
            "{}{marker}: {}% [{}]",
            variant.name, variant.traffic_allocation_percent, variant.id
        ));
    }
}

fn build_new_experiment(args: &ExperimentCreateArgs) -> Result<NewExperiment> {
    let mut variants = parse_variant_specs(&args.variant)?;
    let control = args
        .control
        .clone()
        .or_else(|| variants.first().map(|v| v.name.clone()))
        .unwrap_or_default();
    if !variants.iter().any(|v| v.name == control) {
        return Err(LabError::ValidationFailed(format!(
            "control variant {control} is not among --variant"
        )));
    }

    let mut configs = parse_variant_configs(&args.variant_config)?;
    for variant in &mut variants {
        variant.is_control = variant.name == control;
        variant.configuration = configs.remove(&variant.name);
    }
    if let Some(orphan) = configs.keys().next() {
        return Err(LabError::ValidationFailed(format!(
            "--variant-config names unknown variant {orphan}"
        )));
    }

    let mut new = NewExperiment::new(args.name.clone(), args.metric.clone(), variants);
    new.description = args.description.clone();
    new.status = args.status.parse()?;
    new.start_time = args.start.as_deref().map(parse_timestamp).transpose()?;
    new.end_time = args.end.as_deref().map(parse_timestamp).transpose()?;
    new.target_duration_days = args.target_days;
    new.target_confidence = args.confidence;
    Ok(new)
}

/// `name=percent` specs in the order given. Range and total checks happen
/// in the service.
fn parse_variant_specs(specs: &[String]) -> Result<Vec<NewVariant>> {
    let mut variants: Vec<NewVariant> = Vec::with_capacity(specs.len());
    for spec in specs {
        let (name, value) = split_pair(spec, "variant")?;
        let weight: f64 = value.parse().map_err(|_| {
            LabError::ValidationFailed(format!("invalid weight value for {name}: {value}"))
        })?;
        if variants.iter().any(|v| v.name == name) {
            return Err(LabError::ValidationFailed(format!(
                "duplicate variant {name}"
            )));
        }
        variants.push(NewVariant {
            name: name.to_string(),
            traffic_allocation_percent: weight,
            is_control: false,
            configuration: None,
        });
    }
    Ok(variants)
}

fn parse_variant_configs(specs: &[String]) -> Result<HashMap<String, serde_json::Value>> {
    let mut configs = HashMap::new();
    for spec in specs {
        let (name, raw) = split_pair(spec, "variant config")?;
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|err| {
            LabError::ValidationFailed(format!("invalid JSON for variant {name}: {err}"))
        })?;
        if configs.insert(name.to_string(), value).is_some() {
            return Err(LabError::ValidationFailed(format!(
                "duplicate config for variant {name}"
            )));
        }
    }
    Ok(configs)
}
