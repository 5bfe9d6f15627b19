//! Output formatting: table, JSON, YAML.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde.

use std::io::{self, IsTerminal, Write};

use devlink_core::ConditionStatus;
use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Condition status, colored when enabled.
pub fn paint_status(status: ConditionStatus, color: bool) -> String {
    let text = status.to_string();
    if !color {
        return text;
    }
    match status {
        ConditionStatus::True => text.green().to_string(),
        ConditionStatus::False => text.red().to_string(),
        ConditionStatus::Unknown => text.yellow().to_string(),
    }
}

pub fn heading(text: &str, color: bool) -> String {
    if color {
        text.bold().to_string()
    } else {
        text.to_owned()
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses `detail_fn`, since detail views are hand-laid out.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Table helpers ────────────────────────────────────────────────────

pub fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Two-column field/value table for detail views.
pub fn render_fields(fields: &[(&str, String)]) -> String {
    #[derive(Tabled)]
    struct Field<'a> {
        #[tabled(rename = "Field")]
        name: &'a str,
        #[tabled(rename = "Value")]
        value: &'a str,
    }

    let rows: Vec<Field<'_>> = fields
        .iter()
        .map(|(name, value)| Field {
            name,
            value: value.as_str(),
        })
        .collect();
    render_table(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncolored_status_is_plain() {
        assert_eq!(paint_status(ConditionStatus::True, false), "True");
        assert!(paint_status(ConditionStatus::False, true).contains("\u{1b}["));
    }

    #[test]
    fn field_table_contains_values() {
        let table = render_fields(&[("Kind", "DummyDevice".into())]);
        assert!(table.contains("Kind"));
        assert!(table.contains("DummyDevice"));
    }
}
