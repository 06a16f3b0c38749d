use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ConvertError, Result};
use crate::model::{Affected, Package, Reference, ReferenceType, Severity, Vulnerability};
use crate::normalize::{EcosystemTable, EventSequenceBuilder, GhsaRangeParser, RangeParser, SourceFormat};

use super::{ConvertContext, Record};

/// Converts GitHub Security Advisory nodes, as returned by the GraphQL
/// `securityAdvisories` query.
pub struct GhsaConverter {
    ecosystems: EcosystemTable,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhsaAdvisory {
    ghsa_id: String,
    #[serde(default)]
    identifiers: Vec<Identifier>,
    #[serde(default)]
    references: Vec<UrlReference>,
    description: Option<String>,
    summary: Option<String>,
    cvss: Option<Value>,
    cwes: Option<Nodes<Value>>,
    permalink: Option<String>,
    published_at: Option<String>,
    updated_at: Option<String>,
    withdrawn_at: Option<String>,
    vulnerabilities: Option<Nodes<GhsaVulnerability>>,
}

#[derive(Deserialize)]
struct Identifier {
    value: String,
}

#[derive(Deserialize)]
struct UrlReference {
    url: String,
}

#[derive(Deserialize)]
struct Nodes<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhsaVulnerability {
    package: GhsaPackage,
    first_patched_version: Option<PatchedVersion>,
    vulnerable_version_range: String,
}

#[derive(Deserialize)]
struct GhsaPackage {
    ecosystem: String,
    name: String,
}

#[derive(Deserialize)]
struct PatchedVersion {
    identifier: String,
}

impl GhsaVulnerability {
    fn first_patched(&self) -> Option<&str> {
        self.first_patched_version
            .as_ref()
            .map(|p| p.identifier.as_str())
            .filter(|v| !v.is_empty())
    }
}

fn reference_type(url: &str) -> ReferenceType {
    if url.contains("github.com/advisories/") || url.contains("nvd.nist.gov/vuln/detail/") {
        ReferenceType::Advisory
    } else {
        ReferenceType::Web
    }
}

impl GhsaConverter {
    pub fn new(ecosystems: EcosystemTable) -> Self {
        Self { ecosystems }
    }

    fn convert_value(&self, value: Value, ctx: &ConvertContext<'_>) -> Record {
        let id = value
            .get("ghsaId")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();

        let advisory: GhsaAdvisory = match serde_json::from_value(value) {
            Ok(advisory) => advisory,
            Err(e) => return Record::failed(id, e.into()),
        };

        let fingerprint = advisory.updated_at.clone();
        ctx.record(SourceFormat::Ghsa, id, fingerprint, || {
            self.convert_advisory(&advisory)
        })
    }

    fn convert_advisory(&self, advisory: &GhsaAdvisory) -> Result<Vulnerability> {
        let mut vuln = Vulnerability::new(&advisory.ghsa_id);

        vuln.aliases = advisory
            .identifiers
            .iter()
            .map(|i| i.value.clone())
            .filter(|v| *v != advisory.ghsa_id)
            .collect();
        vuln.published = advisory.published_at.clone();
        vuln.modified = advisory.updated_at.clone();
        vuln.withdrawn = advisory.withdrawn_at.clone().filter(|w| !w.is_empty());
        vuln.summary = advisory.summary.clone();
        vuln.details = advisory.description.clone();
        vuln.references = advisory
            .references
            .iter()
            .map(|r| Reference::new(reference_type(&r.url), &r.url))
            .collect();

        if let Some(severity) = advisory
            .cvss
            .as_ref()
            .and_then(|c| c.get("vectorString"))
            .and_then(Value::as_str)
            .and_then(Severity::from_vector)
        {
            vuln.severity.push(severity);
        }

        vuln.affected = self.affected(advisory)?;
        Ok(vuln)
    }

    /// One `affected` entry per (ecosystem, package), with every vulnerable
    /// range of that package merged into a single OSV range.
    fn affected(&self, advisory: &GhsaAdvisory) -> Result<Vec<Affected>> {
        let nodes = advisory
            .vulnerabilities
            .as_ref()
            .map(|v| v.nodes.as_slice())
            .unwrap_or_default();

        let mut groups: Vec<(String, &str, Vec<&GhsaVulnerability>)> = Vec::new();
        for node in nodes {
            let ecosystem = self.ecosystems.ghsa_ecosystem(&node.package.ecosystem)?;
            let name = node.package.name.as_str();
            match groups
                .iter_mut()
                .find(|(e, n, _)| e == ecosystem && *n == name)
            {
                Some((_, _, members)) => members.push(node),
                None => groups.push((ecosystem.to_string(), name, vec![node])),
            }
        }

        let database_specific = json!({
            "ghsa": advisory.permalink,
            "cvss": advisory.cvss.clone().unwrap_or_else(|| json!({})),
            "cwes": advisory.cwes.as_ref().map(|c| c.nodes.clone()).unwrap_or_default(),
        });

        let mut affected = Vec::with_capacity(groups.len());
        for (ecosystem, name, members) in groups {
            let mut builder = EventSequenceBuilder::new(self.ecosystems.range_type(&ecosystem));
            for member in members {
                let spec = GhsaRangeParser.parse(member.vulnerable_version_range.as_str())?;
                builder.push(&spec, member.first_patched())?;
            }
            let normalized = builder.finish();

            let mut entry = Affected::new(Package::new(ecosystem, name));
            entry.ranges.extend(normalized.range);
            entry.versions = normalized.versions;
            entry.database_specific = Some(database_specific.clone());
            affected.push(entry);
        }

        Ok(affected)
    }
}

impl super::Converter for GhsaConverter {
    fn name(&self) -> &'static str {
        "GitHub Security Advisories"
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Ghsa
    }

    /// Accepts a single advisory node or an array of them.
    fn convert_str(&self, content: &str, ctx: &ConvertContext<'_>) -> Result<Vec<Record>> {
        let document: Value = serde_json::from_str(content)?;
        let values = match document {
            Value::Array(values) => values,
            Value::Object(_) => vec![document],
            _ => {
                return Err(ConvertError::Structural(
                    "expected a GHSA advisory object or array".to_string(),
                ))
            }
        };

        Ok(values
            .into_iter()
            .map(|value| self.convert_value(value, ctx))
            .collect())
    }
}
