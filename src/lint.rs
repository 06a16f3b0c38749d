//! Consistency checks for finished OSV records.

use serde::Serialize;

use crate::model::{Event, RangeType, Vulnerability};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub code: &'static str,
    pub message: String,
}

impl Finding {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Runs every check against `vuln`. An empty result means the record is clean.
pub fn check(vuln: &Vulnerability) -> Vec<Finding> {
    let mut findings = Vec::new();

    if vuln.affected.is_empty() {
        findings.push(Finding::new("A0001", "record has no affected packages"));
    }

    for affected in &vuln.affected {
        let package = &affected.package.name;

        for range in &affected.ranges {
            let introduced: Vec<&str> = range
                .events
                .iter()
                .filter_map(|e| match e {
                    Event::Introduced(v) => Some(v.as_str()),
                    _ => None,
                })
                .collect();

            if introduced.is_empty() {
                findings.push(Finding::new(
                    "RNG:001",
                    format!("{}: range has no introduced event", package),
                ));
            }

            for event in &range.events {
                if let Event::Fixed(fixed) = event {
                    if introduced.contains(&fixed.as_str()) {
                        findings.push(Finding::new(
                            "RNG:002",
                            format!("{}: {} is both introduced and fixed", package, fixed),
                        ));
                    }
                }
            }

            if range.range_type == RangeType::Semver {
                for event in &range.events {
                    let version = event.version();
                    if version != "0" && semver::Version::parse(version).is_err() {
                        findings.push(Finding::new(
                            "RNG:003",
                            format!("{}: {} is not a valid SemVer version", package, version),
                        ));
                    }
                }
            }
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Affected, Package, Range};

    fn vuln_with(range_type: RangeType, events: Vec<Event>) -> Vulnerability {
        let mut affected = Affected::new(Package::new("npm", "left-pad"));
        affected.ranges.push(Range { range_type, events });
        let mut vuln = Vulnerability::new("GHSA-xxxx-xxxx-xxxx");
        vuln.affected.push(affected);
        vuln
    }

    fn codes(vuln: &Vulnerability) -> Vec<&'static str> {
        check(vuln).into_iter().map(|f| f.code).collect()
    }

    #[test]
    fn test_clean_record() {
        let vuln = vuln_with(
            RangeType::Semver,
            vec![
                Event::Introduced("0".to_string()),
                Event::Fixed("1.3.0".to_string()),
            ],
        );
        assert!(check(&vuln).is_empty());
    }

    #[test]
    fn test_no_affected() {
        assert_eq!(codes(&Vulnerability::new("DSA-1-1")), vec!["A0001"]);
    }

    #[test]
    fn test_missing_introduced() {
        let vuln = vuln_with(
            RangeType::Ecosystem,
            vec![Event::LastAffected("2.0".to_string())],
        );
        assert_eq!(codes(&vuln), vec!["RNG:001"]);
    }

    #[test]
    fn test_fixed_equals_introduced() {
        let vuln = vuln_with(
            RangeType::Ecosystem,
            vec![
                Event::Introduced("1.0".to_string()),
                Event::Fixed("1.0".to_string()),
            ],
        );
        assert_eq!(codes(&vuln), vec!["RNG:002"]);
    }

    #[test]
    fn test_invalid_semver_only_checked_for_semver_ranges() {
        let events = vec![
            Event::Introduced("0".to_string()),
            Event::Fixed("1.0".to_string()),
        ];
        assert_eq!(
            codes(&vuln_with(RangeType::Semver, events.clone())),
            vec!["RNG:003"]
        );
        assert!(codes(&vuln_with(RangeType::Ecosystem, events)).is_empty());
    }

    #[test]
    fn test_git_range_commits_are_not_semver_checked() {
        let vuln: Vulnerability = serde_json::from_value(serde_json::json!({
            "id": "OSV-2024-1",
            "affected": [{
                "package": {"ecosystem": "OSS-Fuzz", "name": "libfoo"},
                "ranges": [{
                    "type": "GIT",
                    "repo": "https://example.org/libfoo.git",
                    "events": [
                        {"introduced": "7d2f1c3"},
                        {"fixed": "a41be09"}
                    ]
                }]
            }]
        }))
        .unwrap();
        assert_eq!(vuln.affected[0].ranges[0].range_type, RangeType::Git);
        assert!(check(&vuln).is_empty());
    }

    #[test]
    fn test_finding_display() {
        let finding = Finding::new("A0001", "record has no affected packages");
        assert_eq!(finding.to_string(), "A0001: record has no affected packages");
    }
}
