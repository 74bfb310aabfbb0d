//! splitlab assign - Resolve a user's variant.

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, format_time, robot_ok};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct AssignArgs {
    /// Experiment ID
    pub experiment_id: String,

    /// User ID
    pub user_id: String,
}

pub fn run(ctx: &AppContext, args: &AssignArgs) -> Result<()> {
    let experiment = ctx.service.get_experiment(&args.experiment_id)?;
    let mut rng = ctx.assignment_rng(&experiment.experiment.name, &args.user_id);
    let assignment =
        ctx.service
            .resolve_assignment_with(&args.experiment_id, &args.user_id, &mut rng)?;

    let variant = experiment
        .variants
        .iter()
        .find(|v| v.id == assignment.variant_id);

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "assignment": assignment,
            "variant_name": variant.map(|v| v.name.as_str()),
            "configuration": variant.and_then(|v| v.configuration.as_ref()),
        })));
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Assignment")
        .kv("Experiment", &assignment.experiment_id)
        .kv("User", &assignment.user_id)
        .kv("Variant", variant.map_or(assignment.variant_id.as_str(), |v| v.name.as_str()))
        .kv("Variant ID", &assignment.variant_id)
        .kv("Assigned", &format_time(assignment.assigned_at));
    emit_human(layout);
    Ok(())
}
