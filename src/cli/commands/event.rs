//! splitlab event - Record behavioural events.

use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::cli::commands::{parse_timestamp, split_pair};
use crate::cli::output::{HumanLayout, emit_human, emit_json, format_time, robot_ok};
use crate::core::model::{NewEvent, Properties, PropertyValue};
use crate::error::{LabError, Result};

#[derive(Args, Debug)]
pub struct EventArgs {
    #[command(subcommand)]
    pub command: EventCommand,
}

#[derive(Subcommand, Debug)]
pub enum EventCommand {
    /// Append one event
    Record(EventRecordArgs),
}

#[derive(Args, Debug)]
pub struct EventRecordArgs {
    /// User ID
    pub user_id: String,

    /// Event type, e.g. click or purchase
    pub event_type: String,

    /// Experiment the event belongs to
    #[arg(long)]
    pub experiment: Option<String>,

    /// Event time (RFC 3339 or YYYY-MM-DD, default: now)
    #[arg(long)]
    pub timestamp: Option<String>,

    /// Property as key=value (repeatable); numbers and booleans are typed
    #[arg(long = "prop")]
    pub props: Vec<String>,
}

pub fn run(ctx: &AppContext, args: &EventArgs) -> Result<()> {
    match &args.command {
        EventCommand::Record(args) => run_record(ctx, args),
    }
}

fn run_record(ctx: &AppContext, args: &EventRecordArgs) -> Result<()> {
    let new = NewEvent {
        user_id: args.user_id.clone(),
        event_type: args.event_type.clone(),
        timestamp: args.timestamp.as_deref().map(parse_timestamp).transpose()?,
        experiment_id: args.experiment.clone(),
        properties: parse_properties(&args.props)?,
    };
    let event = ctx.service.record_event(new)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(&event));
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Event Recorded")
        .kv("ID", &event.id)
        .kv("User", &event.user_id)
        .kv("Type", &event.event_type)
        .kv("Experiment", event.experiment_id.as_deref().unwrap_or("-"))
        .kv("Timestamp", &format_time(event.timestamp));
    for (key, value) in &event.properties {
        layout.bullet(&format!("{key} = {}", serde_json::to_string(value)?));
    }
    emit_human(layout);
    Ok(())
}

fn parse_properties(specs: &[String]) -> Result<Properties> {
    let mut properties = Properties::new();
    for spec in specs {
        let (key, raw) = split_pair(spec, "property")?;
        if properties
            .insert(key.to_string(), parse_property_value(raw))
            .is_some()
        {
            return Err(LabError::ValidationFailed(format!("duplicate property {key}")));
        }
    }
    Ok(properties)
}

fn parse_property_value(raw: &str) -> PropertyValue {
    match raw {
        "true" => PropertyValue::Bool(true),
        "false" => PropertyValue::Bool(false),
        _ => raw
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map_or_else(|| PropertyValue::Text(raw.to_string()), PropertyValue::Number),
    }
}
