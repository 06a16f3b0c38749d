//! Version range normalization.
//!
//! Each source format has a [`RangeParser`] that turns its range syntax into
//! a [`RangeSpec`]. The [`EventSequenceBuilder`] then applies the shared
//! policy that maps a `RangeSpec` onto OSV events, and [`EcosystemTable`]
//! maps source ecosystem identifiers onto OSV ecosystem names.
//!
//! | Parser | Input | Example |
//! |--------|-------|---------|
//! | [`GhsaRangeParser`] | operator text | `>= 4.3.0, < 4.3.5` |
//! | [`VuxmlRangeParser`] | `<range>` element | `<ge>1.0</ge><lt>2.0</lt>` |
//! | [`RpmRangeParser`] | remediation purl | `pkg:rpm/redhat/kernel@4.18.0-553.el8` |
//!
//! # Example
//!
//! ```
//! use osvconvert::model::{Event, RangeType};
//! use osvconvert::normalize::{normalize, GhsaRangeParser, RangeParser};
//!
//! let spec = GhsaRangeParser.parse(">= 4.3.0, < 4.3.5").unwrap();
//! let normalized = normalize(&spec, None, RangeType::Semver).unwrap();
//! let range = normalized.range.unwrap();
//! assert_eq!(
//!     range.events,
//!     vec![Event::Introduced("4.3.0".into()), Event::Fixed("4.3.5".into())]
//! );
//! ```

pub mod ecosystem;
mod events;
mod ghsa;
mod rpm;
mod vuxml;

pub use ecosystem::{normalize_name, redhat_ecosystem, EcosystemTable};
pub use events::{normalize, EventSequenceBuilder, InclusiveUpper, Normalized};
pub use ghsa::GhsaRangeParser;
pub use rpm::{Nevra, RpmRangeParser, RpmRemediation};
pub use vuxml::VuxmlRangeParser;

use crate::error::Result;
use crate::model::RangeSpec;
use serde::{Deserialize, Serialize};

/// The advisory feeds this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Ghsa,
    RedHat,
    Debian,
    Vuxml,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 4] = [
        SourceFormat::Ghsa,
        SourceFormat::RedHat,
        SourceFormat::Debian,
        SourceFormat::Vuxml,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Ghsa => "ghsa",
            SourceFormat::RedHat => "redhat",
            SourceFormat::Debian => "debian",
            SourceFormat::Vuxml => "vuxml",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SourceFormat::Ghsa => "GHSA",
            SourceFormat::RedHat => "Red Hat",
            SourceFormat::Debian => "Debian",
            SourceFormat::Vuxml => "VuXML",
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ghsa" | "github" => Ok(SourceFormat::Ghsa),
            "redhat" | "rhsa" | "csaf" => Ok(SourceFormat::RedHat),
            "debian" | "dsa" => Ok(SourceFormat::Debian),
            "vuxml" | "freebsd" => Ok(SourceFormat::Vuxml),
            _ => Err(format!(
                "Unknown format: {}. Use: ghsa, redhat, debian, vuxml",
                s
            )),
        }
    }
}

/// Parses one source-format range expression into a [`RangeSpec`].
///
/// `I` is whatever the source hands us for a single range: text for GHSA and
/// RPM purls, an XML element for VuXML.
pub trait RangeParser<I: ?Sized> {
    /// The source format this parser understands.
    fn format(&self) -> SourceFormat;

    /// Parses `input`.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed input and a structural error when
    /// mutually exclusive bounds are combined.
    fn parse(&self, input: &I) -> Result<RangeSpec>;
}
