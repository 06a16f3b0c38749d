//! Debian Security Advisories from the security-tracker `data/DSA/list`.
//!
//! ```text
//! [25 Apr 2022] DSA-5124-1 ffmpeg - security update
//!     {CVE-2022-1234 CVE-2022-5678}
//!     [bullseye] - ffmpeg 7:4.3.4-0+deb11u1
//!     NOTE: free-form notes are skipped
//! ```
//!
//! Details and publication dates come from an optional checkout of the
//! Debian `webwml` repository.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::json;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ConvertError, Result};
use crate::model::{Affected, Package, RangeSpec, RangeType, Vulnerability};
use crate::normalize::{normalize, EcosystemTable, SourceFormat};

use super::{midnight, ConvertContext, Record};

// e.g. [25 Apr 2022] DSA-5124-1 ffmpeg - security update
static DSA_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[.*?\]\s*([\w-]+)\s*(.*)").expect("valid DSA regex"));

// e.g. [buster] - xz-utils 5.2.4-1+deb10u1
static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(.*?)\]\s*-\s*([^\s]+)\s*([^\s]+)").expect("valid version regex")
});

static WML_MOREINFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<define-tag moreinfo>(.*)</define-tag>").expect("valid moreinfo regex")
});

static WML_REPORT_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<define-tag report_date>(.*)</define-tag>").expect("valid report_date regex")
});

static DSA_BASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"dsa-\d+").expect("valid DSA id regex"));

static HTML_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</p>|<br\s*/?>|</li>|</pre>|</h\d>").expect("valid break regex")
});

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));

const WEBWML_SECURITY_PATH: [&str; 2] = ["english", "security"];

/// `{codename: {source package: first version in that release}}`.
pub type FirstVersions = HashMap<String, HashMap<String, String>>;

pub struct DebianConverter {
    ecosystems: EcosystemTable,
    webwml_repo: Option<PathBuf>,
    first_versions: FirstVersions,
}

/// One `[codename] - package version` line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct VersionLine {
    codename: String,
    package: String,
    version: String,
}

/// One advisory block of the DSA list.
#[derive(Debug, Default)]
struct DsaBlock {
    id: String,
    summary: String,
    aliases: Vec<String>,
    versions: Vec<VersionLine>,
    /// Raw block text, used as the cache fingerprint.
    text: String,
    /// First malformed line inside the block.
    invalid_line: Option<String>,
}

/// Text pulled from the webwml files of one advisory.
#[derive(Debug, Default)]
struct WebwmlInfo {
    details: Option<String>,
    published: Option<String>,
}

fn parse_list(content: &str) -> Result<Vec<DsaBlock>> {
    let mut blocks: Vec<DsaBlock> = Vec::new();

    for line in content.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(char::is_whitespace) {
            let Some(block) = blocks.last_mut() else {
                return Err(ConvertError::parse(line, "indented line before any advisory"));
            };
            block.text.push('\n');
            block.text.push_str(line);

            let body = line.trim_start();
            if body.starts_with('{') {
                block.aliases = body
                    .trim_matches(|c| c == '{' || c == '}')
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
            } else if body.starts_with("NOTE:") {
                continue;
            } else if let Some(caps) = VERSION_PATTERN.captures(body) {
                block.versions.push(VersionLine {
                    codename: caps[1].to_string(),
                    package: caps[2].to_string(),
                    version: caps[3].to_string(),
                });
            } else if block.invalid_line.is_none() {
                block.invalid_line = Some(body.to_string());
            }
            continue;
        }

        if line.trim_start().starts_with("NOTE:") {
            continue;
        }

        let caps = DSA_PATTERN
            .captures(line)
            .ok_or_else(|| ConvertError::parse(line, "invalid advisory line"))?;
        blocks.push(DsaBlock {
            id: caps[1].to_string(),
            summary: caps[2].trim().to_string(),
            text: line.to_string(),
            ..Default::default()
        });
    }

    Ok(blocks)
}

/// Strips markup from the webwml `moreinfo` HTML.
fn html_to_text(html: &str) -> String {
    let text = HTML_BREAK.replace_all(html, "\n\n");
    let text = HTML_TAG.replace_all(&text, "");
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    BLANK_LINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

fn parse_report_date(data: &str) -> Option<String> {
    let raw = WML_REPORT_DATE.captures(data)?.get(1)?.as_str();
    // A second date marks a later major revision.
    let first = raw.split(',').next()?.trim();
    NaiveDate::parse_from_str(first, "%Y-%m-%d").ok().map(midnight)
}

impl DebianConverter {
    pub fn new(ecosystems: EcosystemTable) -> Self {
        Self {
            ecosystems,
            webwml_repo: None,
            first_versions: FirstVersions::new(),
        }
    }

    pub fn with_webwml(mut self, repo: impl Into<PathBuf>) -> Self {
        self.webwml_repo = Some(repo.into());
        self
    }

    pub fn with_first_versions(mut self, first_versions: FirstVersions) -> Self {
        self.first_versions = first_versions;
        self
    }

    /// Loads first versions from a JSON file.
    pub fn with_first_versions_file(self, path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let first_versions: FirstVersions = serde_json::from_str(&content)?;
        Ok(self.with_first_versions(first_versions))
    }

    /// Maps every file name under `english/security` to its path.
    fn webwml_index(&self) -> HashMap<String, PathBuf> {
        let Some(repo) = &self.webwml_repo else {
            return HashMap::new();
        };

        let root: PathBuf = WEBWML_SECURITY_PATH.iter().fold(repo.clone(), |p, s| p.join(s));
        WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                (
                    e.file_name().to_string_lossy().to_string(),
                    e.path().to_path_buf(),
                )
            })
            .collect()
    }

    fn webwml_info(index: &HashMap<String, PathBuf>, id: &str) -> Result<WebwmlInfo> {
        let lower = id.to_lowercase();
        let Some(base) = DSA_BASE.find(&lower).map(|m| m.as_str()) else {
            return Ok(WebwmlInfo::default());
        };

        let mut info = WebwmlInfo::default();

        match index.get(&format!("{}.wml", base)) {
            Some(path) => {
                let wml = fs::read_to_string(path)?;
                info.details = WML_MOREINFO
                    .captures(&wml)
                    .and_then(|c| c.get(1))
                    .map(|m| html_to_text(m.as_str()))
                    .filter(|d| !d.is_empty());
            }
            None => {
                debug!(id, "no webwml file yet, writing partial record");
                return Ok(info);
            }
        }

        if let Some(path) = index.get(&format!("{}.data", base)) {
            let data = fs::read_to_string(path)?;
            info.published = parse_report_date(&data);
        }

        Ok(info)
    }

    fn first_version(&self, codename: &str, package: &str) -> &str {
        self.first_versions
            .get(codename)
            .and_then(|packages| packages.get(package))
            .map(String::as_str)
            .unwrap_or("0")
    }

    fn affected(&self, line: &VersionLine) -> Result<Option<Affected>> {
        let ecosystem = self.ecosystems.debian_ecosystem(&line.codename)?;
        let release = self.ecosystems.debian_release(&line.codename)?;

        let fixed = if line.version.starts_with('<') {
            if line.version == "<not-affected>" {
                return Ok(None);
            }
            // <unfixed>, <end-of-life>, <removed>: no fix known.
            None
        } else {
            Some(line.version.as_str())
        };

        let spec = RangeSpec::between(Some(self.first_version(&line.codename, &line.package)), fixed);
        let normalized = normalize(&spec, None, RangeType::Ecosystem)?;

        let mut affected = Affected::new(Package::new(ecosystem, &line.package));
        affected.ranges.extend(normalized.range);
        affected.ecosystem_specific = Some(json!({
            "release": line.codename,
            "version": release,
        }));
        Ok(Some(affected))
    }

    fn convert_block(
        &self,
        block: &DsaBlock,
        index: &HashMap<String, PathBuf>,
        ctx: &ConvertContext<'_>,
    ) -> Result<Vulnerability> {
        if let Some(line) = &block.invalid_line {
            return Err(ConvertError::parse(line.as_str(), "invalid version line"));
        }

        let mut vuln = Vulnerability::new(&block.id);
        vuln.summary = Some(block.summary.clone()).filter(|s| !s.is_empty());
        vuln.aliases = block.aliases.clone();

        for line in &block.versions {
            vuln.affected.extend(self.affected(line)?);
        }

        let info = Self::webwml_info(index, &block.id)?;
        vuln.details = info.details;
        vuln.published = info.published;
        vuln.modified = Some(ctx.now().to_string());

        Ok(vuln)
    }
}

impl super::Converter for DebianConverter {
    fn name(&self) -> &'static str {
        "Debian Security Advisories"
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Debian
    }

    fn convert_str(&self, content: &str, ctx: &ConvertContext<'_>) -> Result<Vec<Record>> {
        let blocks = parse_list(content)?;
        let index = self.webwml_index();

        Ok(blocks
            .iter()
            .map(|block| {
                ctx.record(
                    SourceFormat::Debian,
                    block.id.clone(),
                    Some(block.text.clone()),
                    || self.convert_block(block, &index, ctx),
                )
            })
            .collect())
    }
}
