use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use roxmltree::{Document, Node, ParsingOptions};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::error::{ConvertError, Result};
use crate::model::{Affected, Package, RangeType, Reference, ReferenceType, Vulnerability};
use crate::normalize::{EventSequenceBuilder, InclusiveUpper, RangeParser, SourceFormat, VuxmlRangeParser};

use super::{midnight, ConvertContext, Record};

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(19|20)\d{2}-\d{2}-\d{2}$").expect("valid date regex"));

static INVALID_PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[@!#$%^&*()<>?/\\|}{~:]").expect("valid package name regex")
});

const URL_ADVISORIES: [&str; 4] = [
    "https://cve.mitre.org/cgi-bin/cvename.cgi?name=",
    "https://nvd.nist.gov/vuln/detail/",
    "https://github.com/advisories/",
    "https://www.debian.org/security/",
];

const URL_REPORTS: [&str; 5] = [
    "https://bugs.freebsd.org/bugzilla/show_bug.cgi?id=",
    "http://bugzilla.mozilla.org/show_bug.cgi?id=",
    "https://bugzilla.mozilla.org/show_bug.cgi?id=",
    "https://bugzilla.redhat.com/show_bug.cgi?id=",
    "https://bugzilla.suse.com/show_bug.cgi?id=",
];

/// Converts the FreeBSD ports vulnerability database (`vuln.xml`).
pub struct VuxmlConverter {
    ecosystem: String,
    description_limit: usize,
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn children<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn trimmed_text<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.text().map(str::trim).filter(|t| !t.is_empty())
}

/// Reads `<dates><name>`. An absent date is `None`; a malformed one fails.
fn date(dates: Option<Node<'_, '_>>, name: &str) -> Result<Option<String>> {
    let Some(text) = dates.and_then(|d| child(d, name)).and_then(trimmed_text) else {
        return Ok(None);
    };

    if !DATE_PATTERN.is_match(text) {
        return Err(ConvertError::parse(
            text,
            format!("{} date not in YYYY-MM-DD format", name),
        ));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|d| Some(midnight(d)))
        .map_err(|e| ConvertError::parse(text, e.to_string()))
}

fn reference(node: Node<'_, '_>) -> Option<Reference> {
    let text = trimmed_text(node)?;

    let (reference_type, url) = match node.tag_name().name() {
        "bid" => (
            ReferenceType::Advisory,
            format!("https://www.securityfocus.com/bid/{}/info", text),
        ),
        "certsa" => (
            ReferenceType::Advisory,
            format!("https://www.cert.org/advisories/{}.html", text),
        ),
        "certvu" => (
            ReferenceType::Advisory,
            format!("https://www.kb.cert.org/vuls/id/{}", text),
        ),
        "cvename" => (
            ReferenceType::Advisory,
            format!("https://api.osv.dev/v1/vulns/{}", text),
        ),
        "freebsdpr" => {
            // ports/NNNNNN
            let (_, id) = text.split_once('/').filter(|(_, id)| !id.contains('/'))?;
            (
                ReferenceType::Report,
                format!("https://bugs.freebsd.org/bugzilla/show_bug.cgi?id={}", id),
            )
        }
        "freebsdsa" => (
            ReferenceType::Advisory,
            format!("https://www.freebsd.org/security/advisories/FreeBSD-{}.asc", text),
        ),
        "mlist" => (ReferenceType::Discussion, text.to_string()),
        "url" => {
            let reference_type = if URL_ADVISORIES.iter().any(|p| text.starts_with(p)) {
                ReferenceType::Advisory
            } else if URL_REPORTS.iter().any(|p| text.starts_with(p)) {
                ReferenceType::Report
            } else {
                ReferenceType::Web
            };
            (reference_type, text.to_string())
        }
        _ => return None,
    };

    Some(Reference::new(reference_type, url))
}

/// All text below `node`, one trimmed line per non-blank source line.
fn plain_text(node: Node<'_, '_>) -> String {
    let raw: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();

    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

impl VuxmlConverter {
    pub fn new(ecosystem: impl Into<String>, description_limit: usize) -> Self {
        Self {
            ecosystem: ecosystem.into(),
            description_limit,
        }
    }

    fn details(&self, id: &str, description: Node<'_, '_>) -> Option<String> {
        let text = plain_text(description);
        if text.is_empty() {
            return None;
        }

        if text.chars().count() > self.description_limit {
            warn!(id, limit = self.description_limit, "description truncated");
            return Some(text.chars().take(self.description_limit).collect());
        }
        Some(text)
    }

    fn affected(&self, id: &str, affects: Node<'_, '_>) -> Result<Vec<Affected>> {
        let mut affected = Vec::new();

        for package in children(affects, "package") {
            let mut ranges = Vec::new();
            let mut versions = Vec::new();

            for range in children(package, "range") {
                let spec = VuxmlRangeParser.parse(&range)?;
                if spec.is_empty() {
                    debug!(id, "skipping unbounded range");
                    continue;
                }

                let mut builder = EventSequenceBuilder::new(RangeType::Ecosystem)
                    .inclusive_upper(InclusiveUpper::LastAffected);
                builder.push(&spec, None)?;
                let normalized = builder.finish();
                ranges.extend(normalized.range);
                versions.extend(normalized.versions);
            }

            for name in children(package, "name") {
                let Some(name) = trimmed_text(name) else {
                    continue;
                };
                if INVALID_PACKAGE_NAME.is_match(name) {
                    error!(id, name, "package with invalid name");
                    continue;
                }

                let mut entry = Affected::new(Package::new(self.ecosystem.as_str(), name));
                entry.ranges = ranges.clone();
                entry.versions = versions.clone();
                affected.push(entry);
            }
        }

        Ok(affected)
    }

    fn convert_entry(&self, id: &str, entry: Node<'_, '_>) -> Result<Vulnerability> {
        let mut vuln = Vulnerability::new(id);

        let dates = child(entry, "dates");
        let entered = date(dates, "entry")?;
        let modified = date(dates, "modified")?;
        let discovery = date(dates, "discovery")?;

        vuln.modified = modified.or_else(|| entered.clone());
        vuln.published = entered;

        vuln.summary = child(entry, "topic").and_then(trimmed_text).map(str::to_string);
        if vuln.summary.is_none() {
            warn!(id, "entry has no topic");
        }

        match child(entry, "description") {
            Some(description) => vuln.details = self.details(id, description),
            None => warn!(id, "entry has no description"),
        }

        if let Some(references) = child(entry, "references") {
            vuln.references = references
                .children()
                .filter(Node::is_element)
                .filter_map(reference)
                .collect();
        }

        if let Some(affects) = child(entry, "affects") {
            vuln.affected = self.affected(id, affects)?;
        }

        if let Some(discovery) = discovery {
            vuln.database_specific = Some(json!({ "discovery": discovery }));
        }

        Ok(vuln)
    }
}

impl super::Converter for VuxmlConverter {
    fn name(&self) -> &'static str {
        "FreeBSD VuXML"
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Vuxml
    }

    fn convert_str(&self, content: &str, ctx: &ConvertContext<'_>) -> Result<Vec<Record>> {
        let mut options = ParsingOptions::default();
        options.allow_dtd = true;
        let doc = Document::parse_with_options(content, options)?;
        let root = doc.root_element();
        if root.tag_name().name() != "vuxml" {
            return Err(ConvertError::Structural(format!(
                "expected a <vuxml> document, got <{}>",
                root.tag_name().name()
            )));
        }

        let mut records = Vec::new();
        for entry in children(root, "vuln") {
            if child(entry, "cancelled").is_some() {
                continue;
            }

            let Some(vid) = entry.attribute("vid") else {
                records.push(Record::failed("<unknown>", ConvertError::MissingField("vid")));
                continue;
            };

            let dates = child(entry, "dates");
            let fingerprint = ["modified", "entry"]
                .iter()
                .find_map(|name| dates.and_then(|d| child(d, name)).and_then(trimmed_text))
                .map(str::to_string);

            records.push(ctx.record(SourceFormat::Vuxml, vid, fingerprint, || {
                self.convert_entry(vid, entry)
            }));
        }

        Ok(records)
    }
}
