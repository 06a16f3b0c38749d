use super::Counts;
use crate::convert::{Outcome, Record};
use crate::lint::Finding;
use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Affected")]
    affected: String,
    #[tabled(rename = "Error")]
    error: String,
}

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Code")]
    code: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub fn print_summary_table(records: &[Record]) -> Result<()> {
    let counts = Counts::from_records(records);

    println!();
    if records.is_empty() {
        println!("No advisories found.");
        return Ok(());
    }

    // Unchanged and ignored records only show up in the totals
    let rows: Vec<RecordRow> = records
        .iter()
        .filter(|r| matches!(r.outcome, Outcome::Converted(_) | Outcome::Failed(_)))
        .map(|r| RecordRow {
            id: truncate(&r.id, 40),
            status: format_status(r),
            affected: r
                .vulnerability()
                .map(|v| v.affected.len().to_string())
                .unwrap_or_else(|| "-".to_string()),
            error: match &r.outcome {
                Outcome::Failed(error) => truncate(&error.to_string(), 60),
                _ => "-".to_string(),
            },
        })
        .collect();

    if !rows.is_empty() {
        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{}", table);
        println!();
    }

    println!("{}", summary_line(&counts));
    Ok(())
}

pub fn print_findings_table(findings: &[(String, Finding)]) -> Result<()> {
    println!();
    if findings.is_empty() {
        println!("No lint findings.");
        return Ok(());
    }

    println!("Found {} lint findings:", findings.len());
    println!();

    let rows: Vec<FindingRow> = findings
        .iter()
        .map(|(file, finding)| FindingRow {
            file: truncate(file, 50),
            code: finding.code.to_string(),
            message: truncate(&finding.message, 60),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
    Ok(())
}

fn summary_line(counts: &Counts) -> String {
    format!(
        "{} advisories: {} converted, {} unchanged, {} ignored, {} failed",
        counts.total(),
        counts.converted,
        counts.unchanged,
        counts.ignored,
        counts.failed
    )
}

fn format_status(record: &Record) -> String {
    match record.outcome {
        Outcome::Converted(_) => "\x1b[32mconverted\x1b[0m".to_string(),
        Outcome::Failed(_) => "\x1b[31mfailed\x1b[0m".to_string(),
        _ => record.status().to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer identifier", 10), "a much ...");
        assert_eq!(truncate("ääääääääääää", 6), "äää...");
        assert_eq!(truncate("abcdef", 2), "...");
    }

    #[test]
    fn test_summary_line() {
        let counts = Counts {
            converted: 3,
            unchanged: 1,
            ignored: 0,
            failed: 2,
        };
        assert_eq!(
            summary_line(&counts),
            "6 advisories: 3 converted, 1 unchanged, 0 ignored, 2 failed"
        );
    }
}
