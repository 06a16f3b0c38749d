//! Source ecosystem identifiers to OSV ecosystem names.
//!
//! The [`EcosystemTable`] is plain data: it is built once from the defaults
//! (optionally overridden by the `[ecosystems]` config section) and handed to
//! each converter.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::model::RangeType;

use super::SourceFormat;

const REDHAT_CPE_PREFIXES: [&str; 2] = ["cpe:/a:redhat", "cpe:/o:redhat"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcosystemTable {
    /// GHSA ecosystem enum value -> OSV ecosystem.
    pub ghsa: BTreeMap<String, String>,

    /// OSV ecosystems whose versions are SemVer.
    pub semver: BTreeSet<String>,

    /// Debian release codename -> release version.
    pub debian_releases: BTreeMap<String, String>,
}

impl Default for EcosystemTable {
    fn default() -> Self {
        let ghsa = [
            ("NPM", "npm"),
            ("GO", "Go"),
            ("MAVEN", "Maven"),
            ("PIP", "PyPI"),
            ("RUBYGEMS", "RubyGems"),
            ("NUGET", "NuGet"),
            ("COMPOSER", "Packagist"),
            ("RUST", "crates.io"),
            ("PUB", "Pub"),
            ("ERLANG", "Hex"),
            ("ACTIONS", "GitHub Actions"),
            ("SWIFT", "SwiftURL"),
        ];

        let debian_releases = [
            ("buzz", "1.1"),
            ("rex", "1.2"),
            ("bo", "1.3"),
            ("hamm", "2.0"),
            ("slink", "2.1"),
            ("potato", "2.2"),
            ("woody", "3.0"),
            ("sarge", "3.1"),
            ("etch", "4.0"),
            ("lenny", "5.0"),
            ("squeeze", "6.0"),
            ("wheezy", "7"),
            ("jessie", "8"),
            ("stretch", "9"),
            ("buster", "10"),
            ("bullseye", "11"),
            ("bookworm", "12"),
            ("trixie", "13"),
            ("forky", "14"),
            ("sid", "unstable"),
        ];

        Self {
            ghsa: to_map(&ghsa),
            semver: ["npm", "Go"].iter().map(|s| s.to_string()).collect(),
            debian_releases: to_map(&debian_releases),
        }
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl EcosystemTable {
    /// Maps a GHSA ecosystem (e.g. `PIP`) to its OSV name (`PyPI`).
    pub fn ghsa_ecosystem(&self, value: &str) -> Result<&str> {
        self.ghsa
            .get(value)
            .map(String::as_str)
            .ok_or_else(|| ConvertError::UnmappedEcosystem {
                format: SourceFormat::Ghsa,
                value: value.to_string(),
            })
    }

    /// Maps a Debian codename (e.g. `buster`) to `Debian:10`.
    pub fn debian_ecosystem(&self, codename: &str) -> Result<String> {
        self.debian_release(codename)
            .map(|version| format!("Debian:{}", version))
    }

    pub fn debian_release(&self, codename: &str) -> Result<&str> {
        self.debian_releases
            .get(codename)
            .map(String::as_str)
            .ok_or_else(|| ConvertError::UnmappedEcosystem {
                format: SourceFormat::Debian,
                value: codename.to_string(),
            })
    }

    pub fn range_type(&self, ecosystem: &str) -> RangeType {
        if self.semver.contains(ecosystem) {
            RangeType::Semver
        } else {
            RangeType::Ecosystem
        }
    }
}

/// Rewrites a Red Hat CPE into an OSV ecosystem.
///
/// `cpe:/o:redhat:rhel_eus:8.10::baseos` becomes
/// `Red Hat:rhel_eus:8.10::baseos`.
pub fn redhat_ecosystem(cpe: &str) -> Result<String> {
    REDHAT_CPE_PREFIXES
        .iter()
        .find_map(|prefix| cpe.strip_prefix(prefix))
        .map(|rest| format!("Red Hat{}", rest))
        .ok_or_else(|| ConvertError::UnmappedEcosystem {
            format: SourceFormat::RedHat,
            value: cpe.to_string(),
        })
}

/// Normalizes a package name for its ecosystem.
///
/// Only PyPI needs it (PEP 503): lowercase, and every run of `-`, `_`, `.`
/// collapses to a single `-`.
pub fn normalize_name(ecosystem: &str, name: &str) -> String {
    if ecosystem != "PyPI" {
        return name.to_string();
    }

    let mut normalized = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                normalized.push('-');
            }
            in_separator = true;
        } else {
            normalized.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ghsa_ecosystems() {
        let table = EcosystemTable::default();
        assert_eq!(table.ghsa_ecosystem("NPM").unwrap(), "npm");
        assert_eq!(table.ghsa_ecosystem("PIP").unwrap(), "PyPI");
        assert_eq!(table.ghsa_ecosystem("COMPOSER").unwrap(), "Packagist");
        assert_eq!(table.ghsa_ecosystem("RUST").unwrap(), "crates.io");
    }

    #[test]
    fn test_unknown_ghsa_ecosystem_fails() {
        let table = EcosystemTable::default();
        let err = table.ghsa_ecosystem("npm").unwrap_err();
        assert!(matches!(
            err,
            ConvertError::UnmappedEcosystem { format: SourceFormat::Ghsa, ref value } if value == "npm"
        ));
    }

    #[test]
    fn test_range_type() {
        let table = EcosystemTable::default();
        assert_eq!(table.range_type("npm"), RangeType::Semver);
        assert_eq!(table.range_type("Go"), RangeType::Semver);
        assert_eq!(table.range_type("PyPI"), RangeType::Ecosystem);
        assert_eq!(table.range_type("Maven"), RangeType::Ecosystem);
    }

    #[test]
    fn test_debian_ecosystem() {
        let table = EcosystemTable::default();
        assert_eq!(table.debian_ecosystem("buster").unwrap(), "Debian:10");
        assert_eq!(table.debian_ecosystem("sid").unwrap(), "Debian:unstable");
        assert!(table.debian_ecosystem("hurd").is_err());
    }

    #[test]
    fn test_redhat_ecosystem() {
        assert_eq!(
            redhat_ecosystem("cpe:/o:redhat:rhel_eus:8.10::baseos").unwrap(),
            "Red Hat:rhel_eus:8.10::baseos"
        );
        assert_eq!(
            redhat_ecosystem("cpe:/a:redhat:enterprise_linux:8::crb").unwrap(),
            "Red Hat:enterprise_linux:8::crb"
        );
        assert!(matches!(
            redhat_ecosystem("cpe:/a:suse:sles:15").unwrap_err(),
            ConvertError::UnmappedEcosystem { format: SourceFormat::RedHat, .. }
        ));
    }

    #[test]
    fn test_normalize_pypi_names() {
        assert_eq!(normalize_name("PyPI", "Django_REST"), "django-rest");
        assert_eq!(normalize_name("PyPI", "zope.interface"), "zope-interface");
        assert_eq!(normalize_name("PyPI", "Foo.-_Bar"), "foo-bar");
        assert_eq!(normalize_name("PyPI", "requests"), "requests");
    }

    #[test]
    fn test_other_ecosystems_pass_names_through() {
        assert_eq!(normalize_name("Maven", "org.Apache_Foo"), "org.Apache_Foo");
        assert_eq!(normalize_name("npm", "@Scope/Pkg"), "@Scope/Pkg");
    }
}
