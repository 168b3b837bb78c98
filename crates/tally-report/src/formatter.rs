//! Report formatting: JSON, Table, Markdown, and CSV output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output format for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
    Markdown,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            "markdown" | "md" => Ok(Self::Markdown),
            "csv" => Ok(Self::Csv),
            other => Err(format!(
                "unknown format '{other}': expected json, table, markdown, or csv"
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Json => "json",
            Self::Table => "table",
            Self::Markdown => "markdown",
            Self::Csv => "csv",
        };
        f.write_str(s)
    }
}

/// Rows of values under a fixed, ordered set of columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Report {
    #[must_use]
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Missing trailing cells render as `null`.
    pub fn push(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn cell(&self, row: usize, column: usize) -> String {
        self.rows[row]
            .get(column)
            .map_or_else(|| "null".to_string(), value_to_display)
    }

    /// Each row as a JSON object keyed by column name.
    #[must_use]
    pub fn to_objects(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c.clone(), row.get(i).cloned().unwrap_or(Value::Null)))
                    .collect();
                Value::Object(object)
            })
            .collect()
    }
}

/// Format a report in the specified output format.
#[must_use]
pub fn format_report(report: &Report, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(report),
        OutputFormat::Table => format_table(report),
        OutputFormat::Markdown => format_markdown(report),
        OutputFormat::Csv => format_csv(report),
    }
}

fn format_json(report: &Report) -> String {
    serde_json::to_string_pretty(&report.to_objects()).unwrap_or_else(|_| "[]".to_string())
}

fn format_table(report: &Report) -> String {
    if report.is_empty() {
        return "(no results)".to_string();
    }

    let mut widths: Vec<usize> = report.columns.iter().map(|c| c.chars().count()).collect();
    for row in 0..report.len() {
        for (col, width) in widths.iter_mut().enumerate() {
            *width = (*width).max(report.cell(row, col).chars().count());
        }
    }

    let mut output = String::new();

    let header: Vec<String> = report
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
        .collect();
    output.push_str(header.join(" | ").trim_end());
    output.push('\n');

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&sep.join("-+-"));
    output.push('\n');

    for row in 0..report.len() {
        let vals: Vec<String> = (0..report.columns.len())
            .map(|col| format!("{:width$}", report.cell(row, col), width = widths[col]))
            .collect();
        output.push_str(vals.join(" | ").trim_end());
        output.push('\n');
    }

    output
}

fn format_markdown(report: &Report) -> String {
    if report.is_empty() {
        return "*No results*\n".to_string();
    }

    let mut output = String::new();

    output.push_str("| ");
    output.push_str(&report.columns.join(" | "));
    output.push_str(" |\n");

    output.push_str("| ");
    let seps: Vec<&str> = report.columns.iter().map(|_| "---").collect();
    output.push_str(&seps.join(" | "));
    output.push_str(" |\n");

    for row in 0..report.len() {
        output.push_str("| ");
        let vals: Vec<String> = (0..report.columns.len())
            .map(|col| report.cell(row, col).replace('|', "\\|"))
            .collect();
        output.push_str(&vals.join(" | "));
        output.push_str(" |\n");
    }

    output
}

fn format_csv(report: &Report) -> String {
    let mut output = String::new();
    let header: Vec<String> = report.columns.iter().map(|c| csv_field(c)).collect();
    output.push_str(&header.join(","));
    output.push('\n');

    for row in 0..report.len() {
        // Nulls are empty fields in CSV.
        let vals: Vec<String> = (0..report.columns.len())
            .map(|col| match report.rows[row].get(col) {
                None | Some(Value::Null) => String::new(),
                Some(v) => csv_field(&value_to_display(v)),
            })
            .collect();
        output.push_str(&vals.join(","));
        output.push('\n');
    }

    output
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn value_to_display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_display)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
