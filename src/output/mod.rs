mod cli;
mod json;

pub use cli::{print_findings_table, print_summary_table};
pub use json::{findings_json, print_json, summary_json};

use crate::convert::{validate_id, Outcome, Record};
use crate::lint::Finding;
use crate::model::Vulnerability;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Output format for the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format for programmatic use
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use 'table' or 'json'", s)),
        }
    }
}

/// Per-status totals for a batch of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub converted: usize,
    pub unchanged: usize,
    pub ignored: usize,
    pub failed: usize,
}

impl Counts {
    pub fn from_records(records: &[Record]) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.outcome {
                Outcome::Converted(_) => counts.converted += 1,
                Outcome::Unchanged => counts.unchanged += 1,
                Outcome::Ignored => counts.ignored += 1,
                Outcome::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.converted + self.unchanged + self.ignored + self.failed
    }
}

pub fn print_summary(records: &[Record], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_summary_table(records),
        OutputFormat::Json => print_json(&summary_json(records)),
    }
}

pub fn print_findings(findings: &[(String, Finding)], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_findings_table(findings),
        OutputFormat::Json => print_json(&findings_json(findings)),
    }
}

/// Writes `vuln` as pretty JSON to `<dir>/<id>.json`, or to stdout when no
/// directory is given. Returns the path written.
pub fn write_record(vuln: &Vulnerability, dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let json = serde_json::to_string_pretty(vuln)?;

    let Some(dir) = dir else {
        println!("{}", json);
        return Ok(None);
    };

    validate_id(&vuln.id)?;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = dir.join(format!("{}.json", vuln.id));
    fs::write(&path, format!("{}\n", json))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Some(path))
}
