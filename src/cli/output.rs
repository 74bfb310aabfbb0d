use chrono::{DateTime, SecondsFormat, Utc};
use console::style;
use serde::Serialize;

use crate::error::{ErrorCode, LabError, Result};

/// Envelope for every robot-mode payload.
#[derive(Serialize)]
pub struct RobotResponse<T> {
    pub status: RobotStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub data: T,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    Ok,
    Error {
        code: ErrorCode,
        numeric_code: u16,
        message: String,
        suggestion: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
        recoverable: bool,
        category: String,
    },
}

pub fn robot_ok<T: Serialize>(data: T) -> RobotResponse<T> {
    RobotResponse {
        status: RobotStatus::Ok,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        data,
    }
}

/// Robot error envelope carrying the structured form of `err`.
pub fn robot_error(err: &LabError) -> RobotResponse<serde_json::Value> {
    let structured = err.to_structured();
    RobotResponse {
        status: RobotStatus::Error {
            code: structured.code,
            numeric_code: structured.numeric_code,
            message: structured.message,
            suggestion: structured.suggestion,
            context: structured.context,
            recoverable: structured.recoverable,
            category: structured.category,
        },
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        data: serde_json::Value::Null,
    }
}

pub fn emit_robot<T: Serialize>(response: &RobotResponse<T>) -> Result<()> {
    emit_json(response)
}

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub struct HumanLayout {
    lines: Vec<String>,
    key_width: usize,
}

impl Default for HumanLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanLayout {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            key_width: 18,
        }
    }

    pub fn title(&mut self, text: &str) -> &mut Self {
        self.lines.push(style(text).bold().to_string());
        self.lines.push(String::new());
        self
    }

    pub fn section(&mut self, text: &str) -> &mut Self {
        self.lines.push(style(text).bold().to_string());
        self.lines.push("-".repeat(text.len().max(3)));
        self
    }

    pub fn kv(&mut self, key: &str, value: &str) -> &mut Self {
        // pad first: escape codes count toward the width
        let padded = format!("{key:width$}", width = self.key_width);
        self.lines
            .push(format!("{} {value}", style(padded).dim()));
        self
    }

    pub fn bullet(&mut self, text: &str) -> &mut Self {
        self.lines.push(format!("- {text}"));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    #[must_use]
    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn emit_human(layout: HumanLayout) {
    println!("{}", layout.build());
}

/// Ratio in [0, 1] as a percentage with two decimals.
#[must_use]
pub fn format_rate(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

#[must_use]
pub fn format_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_layout_keeps_line_order() {
        console::set_colors_enabled(false);
        let mut layout = HumanLayout::new();
        layout.title("Report").kv("Users", "4").bullet("control").blank();
        let text = layout.build();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Report");
        assert!(lines[2].starts_with("Users"));
        assert!(lines[2].ends_with(" 4"));
        assert_eq!(lines[3], "- control");
    }

    #[test]
    fn robot_error_carries_structured_code() {
        let response = robot_error(&LabError::NotFound("experiment x".into()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"]["error"]["code"], "NOT_FOUND");
        assert_eq!(json["status"]["error"]["numeric_code"], 104);
        assert!(json["data"].is_null());
    }

    #[test]
    fn robot_ok_wraps_payload() {
        let json = serde_json::to_value(robot_ok(serde_json::json!({"n": 1}))).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["data"]["n"], 1);
    }

    #[test]
    fn rate_formatting() {
        assert_eq!(format_rate(0.5), "50.00%");
        assert_eq!(format_rate(0.0), "0.00%");
    }
}
