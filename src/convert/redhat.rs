//! Red Hat CSAF VEX documents.
//!
//! Only RPM remediations are converted. Container (`pkg:oci`) remediations
//! are skipped because Red Hat container versions are not comparable.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::model::{Affected, Package, RangeType, Reference, ReferenceType, Severity, Vulnerability};
use crate::normalize::{normalize, redhat_ecosystem, Nevra, RangeParser, RpmRangeParser, SourceFormat};

use super::{utc_timestamp, ConvertContext, Record};

const REDHAT_ERRATA_URL: &str = "https://access.redhat.com/errata/";
const PKG_GO_DEV_VULN: &str = "https://pkg.go.dev/vuln/";
const REDHAT_BUGZILLA: &str = "https://bugzilla.redhat.com/show_bug.cgi";

const ADVISORY_URL_PREFIXES: [&str; 5] = [
    PKG_GO_DEV_VULN,
    "https://www.cve.org/CVERecord",
    "https://nvd.nist.gov/vuln/detail/",
    "https://www.kb.cert.org/vuls/id/",
    "https://github.com/advisories/",
];

#[derive(Debug, Default)]
pub struct RedHatConverter;

#[derive(Deserialize)]
struct CsafDocument {
    document: DocumentMeta,
    #[serde(default)]
    product_tree: Value,
    #[serde(default)]
    vulnerabilities: Vec<CsafVulnerability>,
}

#[derive(Deserialize)]
struct DocumentMeta {
    category: String,
    csaf_version: String,
    title: Option<String>,
    #[serde(default)]
    references: Vec<CsafReference>,
    tracking: Option<Tracking>,
}

#[derive(Deserialize)]
struct Tracking {
    id: Option<String>,
    version: Option<String>,
    current_release_date: Option<String>,
    initial_release_date: Option<String>,
}

#[derive(Deserialize)]
struct CsafReference {
    category: Option<String>,
    summary: Option<String>,
    url: String,
}

impl CsafReference {
    fn is_self(&self) -> bool {
        self.category.as_deref() == Some("self")
    }
}

#[derive(Deserialize)]
struct CsafVulnerability {
    cve: Option<String>,
    #[serde(default)]
    scores: Vec<Score>,
    #[serde(default)]
    references: Vec<CsafReference>,
    product_status: Option<ProductStatus>,
}

#[derive(Deserialize)]
struct Score {
    cvss_v3: Option<CvssV3>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssV3 {
    vector_string: String,
    base_score: f64,
}

#[derive(Deserialize)]
struct ProductStatus {
    #[serde(default)]
    fixed: Vec<String>,
}

/// product_id -> CPE and product_id -> purl, gathered from every `product`
/// object anywhere in the product tree.
#[derive(Debug, Default)]
struct ProductMaps {
    cpes: HashMap<String, String>,
    purls: HashMap<String, String>,
}

impl ProductMaps {
    fn build(tree: &Value) -> Self {
        let mut maps = Self::default();
        maps.collect(tree);
        maps
    }

    fn collect(&mut self, value: &Value) {
        match value {
            Value::Object(fields) => {
                for (key, child) in fields {
                    if key == "product" {
                        self.add_product(child);
                    }
                    self.collect(child);
                }
            }
            Value::Array(items) => items.iter().for_each(|item| self.collect(item)),
            _ => {}
        }
    }

    fn add_product(&mut self, product: &Value) {
        let Some(id) = product.get("product_id").and_then(Value::as_str) else {
            return;
        };
        let Some(helper) = product.get("product_identification_helper") else {
            return;
        };

        if let Some(cpe) = helper.get("cpe").and_then(Value::as_str) {
            self.cpes.insert(id.to_string(), cpe.to_string());
        } else if let Some(purl) = helper.get("purl").and_then(Value::as_str) {
            self.purls.insert(id.to_string(), purl.to_string());
        }
    }
}

/// A fixed RPM for one product stream.
struct Remediation {
    ecosystem: String,
    component: String,
    /// The remediation purl as given, including `@version`.
    fixed_purl: String,
    /// The same purl truncated before `@`.
    purl: String,
}

impl RedHatConverter {
    pub fn new() -> Self {
        Self
    }

    fn advisory_id(doc: &CsafDocument) -> Option<String> {
        doc.document
            .references
            .iter()
            .filter(|r| r.is_self())
            .find_map(|r| {
                r.summary
                    .as_deref()
                    .and_then(|s| s.strip_prefix(REDHAT_ERRATA_URL))
                    .or_else(|| r.url.strip_prefix(REDHAT_ERRATA_URL))
                    .map(str::to_string)
            })
            .or_else(|| doc.document.tracking.as_ref().and_then(|t| t.id.clone()))
    }

    fn fingerprint(doc: &CsafDocument) -> Option<String> {
        let tracking = doc.document.tracking.as_ref()?;
        Some(format!(
            "{}@{}",
            tracking.version.as_deref().unwrap_or_default(),
            tracking.current_release_date.as_deref().unwrap_or_default()
        ))
    }

    fn convert_document(
        &self,
        id: &str,
        doc: &CsafDocument,
        ctx: &ConvertContext<'_>,
    ) -> Result<Vulnerability> {
        let maps = ProductMaps::build(&doc.product_tree);
        let mut vuln = Vulnerability::new(id);

        let tracking = doc.document.tracking.as_ref();
        vuln.modified = Some(
            tracking
                .and_then(|t| t.current_release_date.as_deref())
                .and_then(utc_timestamp)
                .unwrap_or_else(|| ctx.now().to_string()),
        );
        vuln.published = tracking
            .and_then(|t| t.initial_release_date.as_deref())
            .and_then(utc_timestamp)
            .or_else(|| vuln.modified.clone());
        vuln.summary = doc.document.title.clone();

        if let Some(cvss) = doc
            .vulnerabilities
            .iter()
            .flat_map(|v| v.scores.iter())
            .filter_map(|s| s.cvss_v3.as_ref())
            .filter(|c| !c.vector_string.is_empty())
            .max_by(|a, b| a.base_score.total_cmp(&b.base_score))
        {
            vuln.severity.extend(Severity::from_vector(&cvss.vector_string));
        }

        // Architecture-specific builds of one component collapse into a
        // single entry per (CPE, component).
        let mut remediations: Vec<(String, Remediation)> = Vec::new();
        for csaf_vuln in &doc.vulnerabilities {
            let cve = csaf_vuln
                .cve
                .as_deref()
                .ok_or(ConvertError::MissingField("vulnerabilities[].cve"))?;
            vuln.upstream.push(cve.to_string());

            let mut found = 0;
            let fixed = csaf_vuln.product_status.as_ref().map(|s| s.fixed.as_slice());
            for product_id in fixed.unwrap_or_default() {
                let Some((cpe, remediation)) = resolve_remediation(product_id, &maps)? else {
                    continue;
                };
                found += 1;
                let key = format!("{}&{}", cpe, remediation.component);
                match remediations.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, existing)) => *existing = remediation,
                    None => remediations.push((key, remediation)),
                }
            }

            if found == 0 {
                return Err(ConvertError::Structural(format!(
                    "no RPM remediations found for {}",
                    cve
                )));
            }
        }

        for (_, remediation) in remediations {
            let spec = RpmRangeParser.parse(remediation.fixed_purl.as_str())?;
            let normalized = normalize(&spec, None, RangeType::Ecosystem)?;

            let package = Package::new(remediation.ecosystem, &remediation.component)
                .with_purl(remediation.purl);
            let mut affected = Affected::new(package);
            affected.ranges.extend(normalized.range);
            vuln.affected.push(affected);
        }

        self.add_references(&mut vuln, doc);
        Ok(vuln)
    }

    /// Document and vulnerability references, deduplicated by URL. A later
    /// occurrence of a URL updates its type but keeps its position.
    fn add_references(&self, vuln: &mut Vulnerability, doc: &CsafDocument) {
        let mut references: Vec<Reference> = Vec::new();
        let mut related: Vec<String> = Vec::new();

        let document_refs = doc.document.references.iter().map(|r| (r, ReferenceType::Advisory));
        let vuln_refs = doc
            .vulnerabilities
            .iter()
            .flat_map(|v| v.references.iter())
            .map(|r| (r, ReferenceType::Report));

        for (reference, self_type) in document_refs.chain(vuln_refs) {
            let url = reference.url.as_str();
            let reference_type = if reference.is_self() {
                self_type
            } else if ADVISORY_URL_PREFIXES.iter().any(|p| url.starts_with(p)) {
                if let Some(go_id) = url.strip_prefix(PKG_GO_DEV_VULN) {
                    if !related.iter().any(|r| r == go_id) {
                        related.push(go_id.to_string());
                    }
                }
                ReferenceType::Advisory
            } else if url.starts_with(REDHAT_BUGZILLA) {
                ReferenceType::Report
            } else {
                ReferenceType::Article
            };

            match references.iter_mut().find(|r| r.url == url) {
                Some(existing) => existing.reference_type = reference_type,
                None => references.push(Reference::new(reference_type, url)),
            }
        }

        vuln.references = references;
        vuln.related = related;
    }
}

/// Resolves one `product_status.fixed` id. `Ok(None)` means the product is
/// not an RPM remediation we can express.
fn resolve_remediation(product_id: &str, maps: &ProductMaps) -> Result<Option<(String, Remediation)>> {
    let nevra = match Nevra::from_product_id(product_id) {
        Ok(nevra) => nevra,
        Err(e) => {
            debug!(product_id, error = %e, "skipping product id");
            return Ok(None);
        }
    };

    let (Some(purl), Some(cpe)) = (maps.purls.get(&nevra.purl_key()), maps.cpes.get(&nevra.product))
    else {
        debug!(product_id, "product id not found in product tree");
        return Ok(None);
    };

    if !purl.starts_with("pkg:rpm/") {
        debug!(product_id, purl = %purl, "skipping non-RPM remediation");
        return Ok(None);
    }

    let rpm = RpmRangeParser.remediation(purl)?;
    let ecosystem = redhat_ecosystem(cpe)?;

    Ok(Some((
        cpe.clone(),
        Remediation {
            ecosystem,
            component: nevra.component,
            fixed_purl: purl.clone(),
            purl: rpm.purl,
        },
    )))
}

impl super::Converter for RedHatConverter {
    fn name(&self) -> &'static str {
        "Red Hat CSAF"
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::RedHat
    }

    fn convert_str(&self, content: &str, ctx: &ConvertContext<'_>) -> Result<Vec<Record>> {
        let doc: CsafDocument = serde_json::from_str(content)?;

        if doc.document.category != "csaf_vex" || doc.document.csaf_version != "2.0" {
            return Err(ConvertError::Structural(format!(
                "can only handle csaf_vex 2.0 documents, got {} {}",
                doc.document.category, doc.document.csaf_version
            )));
        }

        let Some(id) = Self::advisory_id(&doc) else {
            return Ok(vec![Record::failed(
                "<unknown>",
                ConvertError::MissingField("document.tracking.id"),
            )]);
        };

        let fingerprint = Self::fingerprint(&doc);
        let record = ctx.record(SourceFormat::RedHat, id.clone(), fingerprint, || {
            self.convert_document(&id, &doc, ctx)
        });
        Ok(vec![record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{Converter, Outcome};
    use crate::model::{Event, SeverityType};
    use serde_json::json;

    const KERNEL_SRC: &str = "kernel-0:4.18.0-553.16.1.el8_10.src";
    const KERNEL_X86: &str = "kernel-0:4.18.0-553.16.1.el8_10.x86_64";
    const PRODUCT: &str = "BaseOS-8.10.0.Z.MAIN.EUS";

    fn product(id: &str, helper: Value) -> Value {
        json!({"product": {"name": id, "product_id": id, "product_identification_helper": helper}})
    }

    fn csaf(vulnerabilities: Value) -> Value {
        json!({
            "document": {
                "category": "csaf_vex",
                "csaf_version": "2.0",
                "title": "Red Hat Security Advisory: kernel security update",
                "references": [
                    {"category": "self", "summary": "https://access.redhat.com/errata/RHSA-2024:5101",
                     "url": "https://access.redhat.com/errata/RHSA-2024:5101"},
                    {"category": "external", "summary": "2301234",
                     "url": "https://bugzilla.redhat.com/show_bug.cgi?id=2301234"},
                    {"category": "self", "summary": "Canonical URL",
                     "url": "https://security.access.redhat.com/data/csaf/v2/advisories/2024/rhsa-2024_5101.json"}
                ],
                "tracking": {
                    "id": "RHSA-2024:5101",
                    "version": "3",
                    "initial_release_date": "2024-08-13T15:52:12+00:00",
                    "current_release_date": "2024-09-02T14:30:00+00:00"
                }
            },
            "product_tree": {
                "branches": [{
                    "category": "vendor",
                    "name": "Red Hat",
                    "branches": [
                        {"category": "product_family", "branches": [
                            product(PRODUCT, json!({"cpe": "cpe:/o:redhat:rhel_eus:8.10::baseos"}))
                        ]},
                        {"category": "architecture", "name": "src", "branches": [
                            product(KERNEL_SRC, json!({"purl": "pkg:rpm/redhat/kernel@4.18.0-553.16.1.el8_10?arch=src"}))
                        ]},
                        {"category": "architecture", "name": "x86_64", "branches": [
                            product(KERNEL_X86, json!({"purl": "pkg:rpm/redhat/kernel@4.18.0-553.16.1.el8_10?arch=x86_64"})),
                            product("ubi8-minimal-container", json!({"purl": "pkg:oci/ubi8-minimal@sha256%3Aabc"}))
                        ]}
                    ]
                }]
            },
            "vulnerabilities": vulnerabilities
        })
    }

    fn kernel_vulnerability(cve: &str, score: f64, vector: &str) -> Value {
        json!({
            "cve": cve,
            "scores": [{"cvss_v3": {"baseScore": score, "vectorString": vector}}],
            "references": [
                {"category": "self", "url": format!("https://access.redhat.com/security/cve/{}", cve)},
                {"category": "external", "url": format!("https://www.cve.org/CVERecord?id={}", cve)},
                {"category": "external", "url": "https://pkg.go.dev/vuln/GO-2024-2887"}
            ],
            "product_status": {"fixed": [
                format!("{}:{}", PRODUCT, KERNEL_SRC),
                format!("{}:{}", PRODUCT, KERNEL_X86),
                format!("{}:ubi8-minimal-container", PRODUCT),
                "not-a-nevra"
            ]}
        })
    }

    fn convert(document: Value) -> Record {
        let ctx = ConvertContext::new("2030-01-01T00:00:00Z");
        let mut records = RedHatConverter::new()
            .convert_str(&document.to_string(), &ctx)
            .unwrap();
        assert_eq!(records.len(), 1);
        records.remove(0)
    }

    fn convert_ok(document: Value) -> Vulnerability {
        match convert(document).outcome {
            Outcome::Converted(vuln) => *vuln,
            other => panic!("expected a converted record, got {:?}", other),
        }
    }

    #[test]
    fn test_product_maps() {
        let doc = csaf(json!([]));
        let maps = ProductMaps::build(&doc["product_tree"]);
        assert_eq!(maps.cpes[PRODUCT], "cpe:/o:redhat:rhel_eus:8.10::baseos");
        assert_eq!(
            maps.purls[KERNEL_SRC],
            "pkg:rpm/redhat/kernel@4.18.0-553.16.1.el8_10?arch=src"
        );
        assert_eq!(maps.purls.len(), 3);
    }

    #[test]
    fn test_converts_kernel_advisory() {
        let vuln = convert_ok(csaf(json!([kernel_vulnerability(
            "CVE-2024-1111",
            7.8,
            "CVSS:3.1/AV:L/AC:L/PR:L/UI:N/S:U/C:H/I:H/A:H"
        )])));

        assert_eq!(vuln.id, "RHSA-2024:5101");
        assert_eq!(vuln.summary.as_deref(), Some("Red Hat Security Advisory: kernel security update"));
        assert_eq!(vuln.published.as_deref(), Some("2024-08-13T15:52:12Z"));
        assert_eq!(vuln.modified.as_deref(), Some("2024-09-02T14:30:00Z"));
        assert_eq!(vuln.upstream, vec!["CVE-2024-1111".to_string()]);
        assert_eq!(vuln.related, vec!["GO-2024-2887".to_string()]);

        // src and x86_64 builds collapse into one entry.
        assert_eq!(vuln.affected.len(), 1);
        let affected = &vuln.affected[0];
        assert_eq!(affected.package.ecosystem, "Red Hat:rhel_eus:8.10::baseos");
        assert_eq!(affected.package.name, "kernel");
        assert_eq!(affected.package.purl.as_deref(), Some("pkg:rpm/redhat/kernel"));
        assert_eq!(affected.ranges[0].range_type, RangeType::Ecosystem);
        assert_eq!(
            affected.ranges[0].events,
            vec![
                Event::Introduced("0".to_string()),
                Event::Fixed("0:4.18.0-553.16.1.el8_10".to_string())
            ]
        );
    }

    #[test]
    fn test_reference_types() {
        let vuln = convert_ok(csaf(json!([kernel_vulnerability(
            "CVE-2024-1111",
            7.8,
            "CVSS:3.1/AV:L/AC:L/PR:L/UI:N/S:U/C:H/I:H/A:H"
        )])));

        let types: Vec<(ReferenceType, &str)> = vuln
            .references
            .iter()
            .map(|r| (r.reference_type, r.url.as_str()))
            .collect();
        assert_eq!(
            types,
            vec![
                (ReferenceType::Advisory, "https://access.redhat.com/errata/RHSA-2024:5101"),
                (ReferenceType::Report, "https://bugzilla.redhat.com/show_bug.cgi?id=2301234"),
                (
                    ReferenceType::Advisory,
                    "https://security.access.redhat.com/data/csaf/v2/advisories/2024/rhsa-2024_5101.json"
                ),
                (ReferenceType::Report, "https://access.redhat.com/security/cve/CVE-2024-1111"),
                (ReferenceType::Advisory, "https://www.cve.org/CVERecord?id=CVE-2024-1111"),
                (ReferenceType::Advisory, "https://pkg.go.dev/vuln/GO-2024-2887"),
            ]
        );
    }

    #[test]
    fn test_severity_uses_highest_score() {
        let vuln = convert_ok(csaf(json!([
            kernel_vulnerability("CVE-2024-1111", 5.5, "CVSS:3.1/AV:L/AC:L/PR:L/UI:N/S:U/C:N/I:N/A:H"),
            kernel_vulnerability("CVE-2024-2222", 10.0, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:C/C:H/I:H/A:H"),
            kernel_vulnerability("CVE-2024-3333", 7.8, "CVSS:3.1/AV:L/AC:L/PR:L/UI:N/S:U/C:H/I:H/A:H"),
        ])));

        assert_eq!(vuln.severity.len(), 1);
        assert_eq!(vuln.severity[0].severity_type, SeverityType::CvssV3);
        assert_eq!(vuln.severity[0].score, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:C/C:H/I:H/A:H");
        assert_eq!(vuln.upstream.len(), 3);
        assert_eq!(vuln.related, vec!["GO-2024-2887".to_string()]);
        assert_eq!(vuln.affected.len(), 1);
    }

    #[test]
    fn test_module_component_uses_last_name_segment() {
        let module_id = "container-tools:3.0:8040020240104111259:c0c392d5:buildah-0:1.19.9-1.module+el8.4.0+21078+a96cfbf6.src";
        let mut doc = csaf(json!([{
            "cve": "CVE-2024-4444",
            "product_status": {"fixed": [format!("{}:{}", PRODUCT, module_id)]}
        }]));
        doc["product_tree"]["branches"][0]["branches"][1]["branches"]
            .as_array_mut()
            .unwrap()
            .push(product(
                "buildah-0:1.19.9-1.module+el8.4.0+21078+a96cfbf6.src",
                json!({"purl": "pkg:rpm/redhat/buildah@1.19.9-1.module%2Bel8.4.0%2B21078%2Ba96cfbf6?arch=src"}),
            ));

        let vuln = convert_ok(doc);
        assert_eq!(vuln.affected[0].package.name, "buildah");
        assert_eq!(
            vuln.affected[0].ranges[0].events[1],
            Event::Fixed("0:1.19.9-1.module+el8.4.0+21078+a96cfbf6".to_string())
        );
    }

    #[test]
    fn test_no_rpm_remediation_fails_record() {
        let record = convert(csaf(json!([{
            "cve": "CVE-2024-5555",
            "product_status": {"fixed": [format!("{}:ubi8-minimal-container", PRODUCT)]}
        }])));
        assert_eq!(record.id, "RHSA-2024:5101");
        assert!(matches!(record.outcome, Outcome::Failed(ConvertError::Structural(_))));
    }

    #[test]
    fn test_non_redhat_cpe_fails_record() {
        let mut doc = csaf(json!([kernel_vulnerability("CVE-2024-1111", 7.8, "CVSS:3.1/AV:L")]));
        doc["product_tree"]["branches"][0]["branches"][0]["branches"][0]["product"]
            ["product_identification_helper"]["cpe"] = json!("cpe:/o:suse:sles:15");
        let record = convert(doc);
        assert!(matches!(
            record.outcome,
            Outcome::Failed(ConvertError::UnmappedEcosystem { .. })
        ));
    }

    #[test]
    fn test_missing_tracking_dates_use_context_time() {
        let mut doc = csaf(json!([kernel_vulnerability("CVE-2024-1111", 7.8, "CVSS:3.1/AV:L")]));
        doc["document"]["tracking"] = json!({"id": "RHSA-2024:5101"});
        let vuln = convert_ok(doc);
        assert_eq!(vuln.modified.as_deref(), Some("2030-01-01T00:00:00Z"));
        assert_eq!(vuln.published.as_deref(), Some("2030-01-01T00:00:00Z"));
    }

    #[test]
    fn test_rejects_other_document_types() {
        let mut doc = csaf(json!([]));
        doc["document"]["category"] = json!("csaf_security_advisory");
        let ctx = ConvertContext::new("2030-01-01T00:00:00Z");
        let err = RedHatConverter::new()
            .convert_str(&doc.to_string(), &ctx)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Structural(_)));
    }

    #[test]
    fn test_fingerprint_tracks_revision() {
        let record = convert(csaf(json!([kernel_vulnerability("CVE-2024-1111", 7.8, "CVSS:3.1/AV:L")])));
        assert_eq!(record.fingerprint.as_deref(), Some("3@2024-09-02T14:30:00+00:00"));
    }
}
