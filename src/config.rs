//! Configuration file handling.
//!
//! The configuration is read once at startup and passed down explicitly;
//! converters never consult global state.
//!
//! # Configuration Location
//!
//! - Linux: `~/.config/osvconvert/config.toml`
//! - macOS: `~/Library/Application Support/osvconvert/config.toml`
//! - Windows: `%APPDATA%\osvconvert\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! use_cache = true
//! default_format = "table"
//! output_dir = "osv"
//!
//! [ecosystems.ghsa]
//! HEX = "Hex"
//!
//! [vuxml]
//! ecosystem = "FreeBSD:ports"
//! description_limit = 5000
//!
//! [debian]
//! webwml_repo = "/srv/webwml"
//! first_versions = "/srv/first_versions.json"
//!
//! [ignore]
//! advisories = ["DSA-1*", "GHSA-xxxx-yyyy-zzzz"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::normalize::EcosystemTable;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Skip advisories whose source data has not changed since the last run.
    ///
    /// Default: true
    pub use_cache: bool,

    /// Where converted records are written when `--output-dir` is absent.
    /// Records are printed to stdout when neither is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Summary format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    /// Default: "table"
    pub default_format: String,

    /// Ecosystem mapping tables. Entries here extend or replace the
    /// built-in defaults.
    pub ecosystems: EcosystemTable,

    pub vuxml: VuxmlConfig,

    pub debian: DebianConfig,

    pub ignore: IgnoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VuxmlConfig {
    /// OSV ecosystem for every VuXML package.
    pub ecosystem: String,

    /// Descriptions longer than this many characters are truncated.
    pub description_limit: usize,
}

impl Default for VuxmlConfig {
    fn default() -> Self {
        Self {
            ecosystem: "FreeBSD:ports".to_string(),
            description_limit: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebianConfig {
    /// Checkout of the Debian webwml repository, for advisory details and
    /// publication dates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webwml_repo: Option<PathBuf>,

    /// JSON file of `{codename: {package: first version}}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_versions: Option<PathBuf>,
}

/// Advisories to leave out of conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Advisory IDs; `*` matches any run of characters.
    pub advisories: Vec<String>,
}

impl IgnoreConfig {
    pub fn should_ignore(&self, advisory_id: &str) -> bool {
        self.advisories
            .iter()
            .any(|pattern| glob_match(pattern, advisory_id))
    }
}

/// Wildcard match where `*` stands for any (possibly empty) substring.
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut pieces = pattern.split('*');
    let Some(head) = pieces.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(head) else {
        return false;
    };

    let tail: Vec<&str> = pieces.collect();
    let Some((last, middle)) = tail.split_last() else {
        // No `*` at all.
        return rest.is_empty();
    };

    for piece in middle.iter().filter(|p| !p.is_empty()) {
        match rest.find(piece) {
            Some(pos) => rest = &rest[pos + piece.len()..],
            None => return false,
        }
    }

    rest.ends_with(last)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_cache: true,
            output_dir: None,
            default_format: "table".to_string(),
            ecosystems: EcosystemTable::default(),
            vuxml: VuxmlConfig::default(),
            debian: DebianConfig::default(),
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from the default location, falling back to
    /// defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Loads the configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.merge_default_tables();
        Ok(config)
    }

    /// Layers the configured ecosystem entries on top of the built-in ones so
    /// a config file only has to list additions.
    fn merge_default_tables(&mut self) {
        let mut table = EcosystemTable::default();
        table.ghsa.append(&mut self.ecosystems.ghsa);
        table.semver.append(&mut self.ecosystems.semver);
        table
            .debian_releases
            .append(&mut self.ecosystems.debian_releases);
        self.ecosystems = table;
    }

    /// Saves the configuration, creating the parent directory if needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("osvconvert")
            .join("config.toml")
    }

    /// The default configuration rendered as TOML.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match_exact() {
        assert!(glob_match("DSA-5124-1", "DSA-5124-1"));
        assert!(!glob_match("DSA-5124-1", "DSA-5124-2"));
    }

    #[test]
    fn test_glob_match_prefix() {
        assert!(glob_match("DSA-51*", "DSA-5124-1"));
        assert!(glob_match("DSA-51*", "DSA-51"));
        assert!(!glob_match("DSA-51*", "DSA-4124-1"));
    }

    #[test]
    fn test_glob_match_suffix_and_contains() {
        assert!(glob_match("*-1", "DSA-5124-1"));
        assert!(!glob_match("*-1", "DSA-5124-2"));
        assert!(glob_match("*5124*", "DSA-5124-1"));
        assert!(glob_match("GHSA-*-*-zzzz", "GHSA-xxxx-yyyy-zzzz"));
        assert!(!glob_match("GHSA-*-*-zzzz", "GHSA-xxxx-yyyy-wwww"));
    }

    #[test]
    fn test_ignore_config() {
        let ignore = IgnoreConfig {
            advisories: vec!["DSA-1*".to_string(), "GHSA-abcd-efgh-ijkl".to_string()],
        };
        assert!(ignore.should_ignore("DSA-1234-1"));
        assert!(ignore.should_ignore("GHSA-abcd-efgh-ijkl"));
        assert!(!ignore.should_ignore("DSA-2234-1"));
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.use_cache);
        assert_eq!(config.default_format, "table");
        assert_eq!(config.vuxml.ecosystem, "FreeBSD:ports");
        assert_eq!(config.vuxml.description_limit, 5000);
        assert!(config.output_dir.is_none());
        assert_eq!(config.ecosystems, EcosystemTable::default());
    }

    #[test]
    fn test_load_merges_ecosystem_additions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
use_cache = false

[ecosystems.ghsa]
HEX = "Hex"

[ecosystems.debian_releases]
duke = "15"

[vuxml]
ecosystem = "FreeBSD:kernel"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.use_cache);
        assert_eq!(config.ecosystems.ghsa_ecosystem("HEX").unwrap(), "Hex");
        assert_eq!(config.ecosystems.ghsa_ecosystem("NPM").unwrap(), "npm");
        assert_eq!(config.ecosystems.debian_ecosystem("duke").unwrap(), "Debian:15");
        assert_eq!(config.vuxml.ecosystem, "FreeBSD:kernel");
        assert_eq!(config.vuxml.description_limit, 5000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.default_format = "json".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.default_format, "json");
        assert_eq!(loaded.ecosystems, EcosystemTable::default());
    }

    #[test]
    fn test_default_config_renders() {
        let rendered = Config::generate_default_config();
        assert!(rendered.contains("use_cache = true"));
        assert!(rendered.contains("FreeBSD:ports"));
    }
}
