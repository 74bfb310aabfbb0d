//! splitlab report - Per-variant conversion and revenue report.

use clap::Args;

use crate::app::AppContext;
use crate::cli::commands::parse_timestamp;
use crate::cli::output::{HumanLayout, emit_human, emit_json, format_rate, format_time, robot_ok};
use crate::core::report::{Report, ReportFilters};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Experiment ID
    pub experiment_id: String,

    /// Only count events of this type
    #[arg(long)]
    pub event_type: Option<String>,

    /// Window start, inclusive (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,

    /// Window end, inclusive (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<String>,
}

pub fn run(ctx: &AppContext, args: &ReportArgs) -> Result<()> {
    let filters = ReportFilters {
        event_type: args.event_type.clone(),
        start_time: args.start.as_deref().map(parse_timestamp).transpose()?,
        end_time: args.end.as_deref().map(parse_timestamp).transpose()?,
    };
    let report = ctx.service.compute_report(&args.experiment_id, &filters)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(&report));
    }

    emit_human(render(&report, &ctx.service.options().revenue.metric));
    Ok(())
}

fn render(report: &Report, revenue_metric: &str) -> HumanLayout {
    let mut layout = HumanLayout::new();
    layout
        .title(&format!("Report: {}", report.name))
        .kv("ID", &report.experiment_id)
        .kv("Status", report.status.as_str())
        .kv("Primary metric", &report.primary_metric_name)
        .kv("Started", &format_time(report.start_time))
        .kv("Days running", &report.days_running.to_string())
        .kv("Users", &report.total_users.to_string())
        .kv("Events counted", &report.count_events.to_string())
        .kv("Conversion", &format_rate(report.global_conversion_rate));

    for (name, stats) in &report.variants {
        let heading = if stats.is_control {
            format!("{name} (control)")
        } else {
            name.clone()
        };
        layout
            .blank()
            .section(&heading)
            .kv("Traffic", &format!("{}%", stats.traffic_allocation_percent))
            .kv("Users", &stats.total_assigned_users.to_string())
            .kv("Converted", &stats.conversion_count.to_string())
            .kv("Conversion", &format_rate(stats.conversion_rate))
            .kv(revenue_metric, &format!("{:.2}", stats.metric(revenue_metric)));
        for (event_type, count) in &stats.event_counts {
            layout.bullet(&format!("{event_type}: {count}"));
        }
    }

    if !report.daily_event_volume.is_empty() {
        layout.blank().section("Daily events");
        for (day, count) in &report.daily_event_volume {
            layout.kv(&day.to_string(), &count.to_string());
        }
    }
    if !report.weekly_event_volume.is_empty() {
        layout.blank().section("Weekly events");
        for (week, count) in &report.weekly_event_volume {
            layout.kv(week, &count.to_string());
        }
    }
    layout
}
