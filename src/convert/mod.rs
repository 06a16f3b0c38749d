//! Advisory feed converters.
//!
//! This module provides the [`Converter`] trait and one implementation per
//! [`SourceFormat`]. A converter reads one source document and yields a
//! [`Record`] per advisory in it. Failures inside one advisory are captured
//! in that record so the rest of the batch still converts.
//!
//! # Available Converters
//!
//! | Converter | Format | Input |
//! |-----------|--------|-------|
//! | [`GhsaConverter`] | GHSA | GraphQL advisory JSON |
//! | [`RedHatConverter`] | Red Hat | CSAF 2.0 VEX JSON |
//! | [`DebianConverter`] | Debian | security-tracker `data/DSA/list` |
//! | [`VuxmlConverter`] | VuXML | FreeBSD `vuln.xml` |
//!
//! # Example
//!
//! ```no_run
//! use osvconvert::convert::{get_converter, ConvertContext, Converter};
//! use osvconvert::{Config, SourceFormat};
//! use std::path::Path;
//!
//! let config = Config::default();
//! let converter = get_converter(SourceFormat::Vuxml, &config).unwrap();
//! let ctx = ConvertContext::new("2024-01-01T00:00:00Z");
//!
//! for record in converter.convert_file(Path::new("vuln.xml"), &ctx).unwrap() {
//!     println!("{}: {}", record.id, record.status());
//! }
//! ```

mod debian;
mod ghsa;
mod redhat;
mod vuxml;

pub use debian::DebianConverter;
pub use ghsa::GhsaConverter;
pub use redhat::RedHatConverter;
pub use vuxml::VuxmlConverter;

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::config::{Config, IgnoreConfig};
use crate::error::{ConvertError, Result};
use crate::model::Vulnerability;
use crate::normalize::SourceFormat;

/// OSV timestamps are RFC 3339 in UTC with second precision.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Formats `time` as an OSV timestamp.
pub fn timestamp(time: DateTime<Utc>) -> String {
    time.format(DATE_FORMAT).to_string()
}

/// Midnight UTC of a calendar date, as an OSV timestamp.
pub(crate) fn midnight(date: NaiveDate) -> String {
    date.format("%Y-%m-%dT00:00:00Z").to_string()
}

/// Re-renders an RFC 3339 timestamp with any offset in UTC.
pub(crate) fn utc_timestamp(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|time| timestamp(time.with_timezone(&Utc)))
}

/// Checks that `id` can name an output file: non-empty, with no path
/// separators and no `..`.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains(['/', '\\', '\0']) || id.contains("..") {
        return Err(ConvertError::parse(id, "advisory id is not a safe file name"));
    }
    Ok(())
}

/// The result of converting one advisory.
#[derive(Debug)]
pub struct Record {
    pub id: String,
    /// Summary of the source data, stored in the cache once the record is
    /// written.
    pub fingerprint: Option<String>,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub enum Outcome {
    Converted(Box<Vulnerability>),
    /// The cached fingerprint matched; nothing was converted.
    Unchanged,
    /// Listed in the `[ignore]` config section.
    Ignored,
    Failed(ConvertError),
}

impl Record {
    /// A failed record for an advisory whose id is known but whose data
    /// could not be read.
    pub(crate) fn failed(id: impl Into<String>, error: ConvertError) -> Self {
        let id = id.into();
        warn!(id = %id, error = %error, "conversion failed");
        Self {
            id,
            fingerprint: None,
            outcome: Outcome::Failed(error),
        }
    }

    pub fn vulnerability(&self) -> Option<&Vulnerability> {
        match &self.outcome {
            Outcome::Converted(vuln) => Some(vuln.as_ref()),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    pub fn status(&self) -> &'static str {
        match self.outcome {
            Outcome::Converted(_) => "converted",
            Outcome::Unchanged => "unchanged",
            Outcome::Ignored => "ignored",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// Per-run settings shared by every converter.
#[derive(Debug, Clone)]
pub struct ConvertContext<'a> {
    cache: Option<&'a Cache>,
    ignore: Option<&'a IgnoreConfig>,
    /// Fallback for records whose source carries no modification time.
    now: String,
}

impl<'a> ConvertContext<'a> {
    pub fn new(now: impl Into<String>) -> Self {
        Self {
            cache: None,
            ignore: None,
            now: now.into(),
        }
    }

    pub fn with_cache(mut self, cache: &'a Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_ignore(mut self, ignore: &'a IgnoreConfig) -> Self {
        self.ignore = Some(ignore);
        self
    }

    pub fn now(&self) -> &str {
        &self.now
    }

    /// Runs `convert` for one advisory unless it is ignored or unchanged
    /// since the last run.
    pub(crate) fn record(
        &self,
        format: SourceFormat,
        id: impl Into<String>,
        fingerprint: Option<String>,
        convert: impl FnOnce() -> Result<Vulnerability>,
    ) -> Record {
        let id = id.into();

        if let Err(error) = validate_id(&id) {
            return Record::failed(id, error);
        }

        if self.ignore.is_some_and(|ignore| ignore.should_ignore(&id)) {
            debug!(id = %id, "ignored by configuration");
            return Record {
                id,
                fingerprint,
                outcome: Outcome::Ignored,
            };
        }

        if let (Some(cache), Some(fp)) = (self.cache, fingerprint.as_deref()) {
            if cache.is_unchanged(&Cache::key(format, &id), fp) {
                debug!(id = %id, "source unchanged since last run");
                return Record {
                    id,
                    fingerprint,
                    outcome: Outcome::Unchanged,
                };
            }
        }

        match convert() {
            Ok(vuln) => {
                debug!(id = %id, affected = vuln.affected.len(), "converted");
                Record {
                    id,
                    fingerprint,
                    outcome: Outcome::Converted(Box::new(vuln)),
                }
            }
            Err(error) => {
                warn!(id = %id, error = %error, "conversion failed");
                Record {
                    id,
                    fingerprint,
                    outcome: Outcome::Failed(error),
                }
            }
        }
    }
}

/// Converts one source document into OSV records.
pub trait Converter {
    /// Returns the human-readable name of this converter.
    fn name(&self) -> &'static str;

    fn format(&self) -> SourceFormat;

    /// Converts a document already read into memory.
    ///
    /// # Errors
    ///
    /// Returns an error only when the document as a whole is unreadable
    /// (malformed JSON or XML, wrong document type). Problems inside one
    /// advisory become a failed [`Record`].
    fn convert_str(&self, content: &str, ctx: &ConvertContext<'_>) -> Result<Vec<Record>>;

    /// Reads and converts the document at `path`.
    fn convert_file(&self, path: &Path, ctx: &ConvertContext<'_>) -> Result<Vec<Record>> {
        let content = fs::read_to_string(path)?;
        self.convert_str(&content, ctx)
    }
}

/// Returns the converter for `format`, configured from `config`.
///
/// # Errors
///
/// Fails when a configured side file (the Debian first-versions JSON) cannot
/// be loaded.
pub fn get_converter(format: SourceFormat, config: &Config) -> Result<Box<dyn Converter>> {
    let converter: Box<dyn Converter> = match format {
        SourceFormat::Ghsa => Box::new(GhsaConverter::new(config.ecosystems.clone())),
        SourceFormat::RedHat => Box::new(RedHatConverter::new()),
        SourceFormat::Debian => {
            let mut converter = DebianConverter::new(config.ecosystems.clone());
            if let Some(repo) = &config.debian.webwml_repo {
                converter = converter.with_webwml(repo);
            }
            if let Some(path) = &config.debian.first_versions {
                converter = converter.with_first_versions_file(path)?;
            }
            Box::new(converter)
        }
        SourceFormat::Vuxml => Box::new(VuxmlConverter::new(
            config.vuxml.ecosystem.clone(),
            config.vuxml.description_limit,
        )),
    };
    Ok(converter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> Result<Vulnerability> {
        Ok(Vulnerability::new(id))
    }

    #[test]
    fn test_get_converter_matches_format() {
        let config = Config::default();
        for format in SourceFormat::ALL {
            let converter = get_converter(format, &config).unwrap();
            assert_eq!(converter.format(), format);
        }
    }

    #[test]
    fn test_missing_first_versions_file_fails() {
        let mut config = Config::default();
        config.debian.first_versions = Some("/nonexistent/first_versions.json".into());
        assert!(get_converter(SourceFormat::Debian, &config).is_err());
    }

    #[test]
    fn test_record_converted() {
        let ctx = ConvertContext::new("2024-01-01T00:00:00Z");
        let record = ctx.record(SourceFormat::Ghsa, "GHSA-1", None, || sample("GHSA-1"));
        assert_eq!(record.status(), "converted");
        assert_eq!(record.vulnerability().unwrap().id, "GHSA-1");
    }

    #[test]
    fn test_record_failed() {
        let ctx = ConvertContext::new("2024-01-01T00:00:00Z");
        let record = ctx.record(SourceFormat::Ghsa, "GHSA-1", None, || {
            Err(ConvertError::MissingField("ghsaId"))
        });
        assert!(record.is_failed());
        assert!(record.vulnerability().is_none());
    }

    #[test]
    fn test_record_unchanged_skips_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::with_dir(dir.path());
        cache
            .set(&Cache::key(SourceFormat::Vuxml, "abc"), &"v1".to_string())
            .unwrap();
        let ctx = ConvertContext::new("2024-01-01T00:00:00Z").with_cache(&cache);

        let record = ctx.record(SourceFormat::Vuxml, "abc", Some("v1".to_string()), || {
            panic!("should not convert an unchanged record")
        });
        assert_eq!(record.status(), "unchanged");

        let record = ctx.record(SourceFormat::Vuxml, "abc", Some("v2".to_string()), || {
            sample("abc")
        });
        assert_eq!(record.status(), "converted");
    }

    #[test]
    fn test_record_with_path_like_id_fails() {
        let ctx = ConvertContext::new("2024-01-01T00:00:00Z");
        for id in ["../escaped", "a/b", "a\\b", ""] {
            let record = ctx.record(SourceFormat::Vuxml, id, None, || {
                panic!("should not convert an unsafe id")
            });
            assert!(matches!(
                record.outcome,
                Outcome::Failed(ConvertError::Parse { .. })
            ));
        }
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("GHSA-abcd-efgh-ijkl").is_ok());
        assert!(validate_id("RHSA-2024:5101").is_ok());
        assert!(validate_id("..").is_err());
        assert!(validate_id("x/../y").is_err());
    }

    #[test]
    fn test_record_ignored() {
        let ignore = IgnoreConfig {
            advisories: vec!["DSA-1*".to_string()],
        };
        let ctx = ConvertContext::new("2024-01-01T00:00:00Z").with_ignore(&ignore);
        let record = ctx.record(SourceFormat::Debian, "DSA-1000-1", None, || {
            panic!("should not convert an ignored record")
        });
        assert_eq!(record.status(), "ignored");
    }

    #[test]
    fn test_timestamps() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(midnight(date), "2024-03-09T00:00:00Z");

        let time = date.and_hms_opt(14, 30, 5).unwrap().and_utc();
        assert_eq!(timestamp(time), "2024-03-09T14:30:05Z");

        assert_eq!(
            utc_timestamp("2024-08-13T17:52:12+02:00").as_deref(),
            Some("2024-08-13T15:52:12Z")
        );
        assert_eq!(utc_timestamp("yesterday"), None);
    }
}
