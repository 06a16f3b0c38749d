use super::Counts;
use crate::convert::{Outcome, Record};
use crate::lint::Finding;
use anyhow::Result;
use serde_json::{json, Value};

pub fn summary_json(records: &[Record]) -> Value {
    let rows: Vec<Value> = records
        .iter()
        .map(|r| {
            let mut row = json!({
                "id": r.id,
                "status": r.status(),
            });
            if let Some(vuln) = r.vulnerability() {
                row["affected"] = json!(vuln.affected.len());
            }
            if let Outcome::Failed(error) = &r.outcome {
                row["error"] = json!(error.to_string());
            }
            row
        })
        .collect();

    json!({
        "counts": Counts::from_records(records),
        "records": rows,
    })
}

pub fn findings_json(findings: &[(String, Finding)]) -> Value {
    findings
        .iter()
        .map(|(file, finding)| {
            json!({
                "file": file,
                "code": finding.code,
                "message": finding.message,
            })
        })
        .collect()
}

pub fn print_json(value: &Value) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}
