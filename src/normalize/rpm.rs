use std::str::FromStr;

use packageurl::PackageUrl;

use crate::error::{ConvertError, Result};
use crate::model::RangeSpec;

use super::{RangeParser, SourceFormat};

/// Parses Red Hat remediation purls (`pkg:rpm/...`) into a fixed-version
/// range.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpmRangeParser;

/// Component and fixed version pulled out of a remediation purl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmRemediation {
    pub name: String,
    /// `epoch:version-release`; the epoch defaults to `0`.
    pub version: String,
    /// The purl truncated before `@`.
    pub purl: String,
}

impl RpmRangeParser {
    pub fn remediation(&self, purl: &str) -> Result<RpmRemediation> {
        let parsed = PackageUrl::from_str(purl)
            .map_err(|e| ConvertError::parse(purl, format!("invalid package URL: {}", e)))?;

        if parsed.ty() != "rpm" {
            return Err(ConvertError::parse(
                purl,
                format!("expected an rpm package URL, got `{}`", parsed.ty()),
            ));
        }

        let name = parsed.name();
        if name.is_empty() {
            return Err(ConvertError::parse(purl, "package URL has no name"));
        }

        let version = parsed
            .version()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConvertError::parse(purl, "package URL has no version"))?;

        let version = if version.contains(':') {
            version.to_string()
        } else {
            let epoch = parsed
                .qualifiers()
                .get("epoch")
                .map(|e| e.to_string())
                .unwrap_or_else(|| "0".to_string());
            format!("{}:{}", epoch, version)
        };

        let unversioned = purl.split_once('@').map_or(purl, |(head, _)| head);

        Ok(RpmRemediation {
            name: name.to_string(),
            version,
            purl: unversioned.to_string(),
        })
    }
}

impl RangeParser<str> for RpmRangeParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::RedHat
    }

    /// Red Hat advisories assume every earlier build is affected, so the
    /// result is just `< fixed`.
    fn parse(&self, input: &str) -> Result<RangeSpec> {
        let remediation = self.remediation(input)?;
        Ok(RangeSpec::fixed_at(remediation.version))
    }
}

/// A CSAF product id split into product and NEVRA parts.
///
/// `BaseOS-8.10.0.Z.MAIN.EUS:kernel-0:4.18.0-553.16.1.el8_10.src` has product
/// `BaseOS-8.10.0.Z.MAIN.EUS`, component `kernel`, version `0:4.18.0` and
/// release `553.16.1.el8_10.src`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nevra {
    pub product: String,
    pub component: String,
    pub version: String,
    pub release: String,
}

impl Nevra {
    pub fn from_product_id(product_id: &str) -> Result<Self> {
        let (product, nevra) = product_id
            .split_once(':')
            .ok_or_else(|| ConvertError::parse(product_id, "no `:` in product id"))?;

        let mut parts = nevra.rsplitn(3, '-');
        let (Some(release), Some(version), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ConvertError::parse(
                product_id,
                format!("cannot split `{}` into a NEVRA", nevra),
            ));
        };

        // Modular RPMs carry `module:stream:version:context:` before the name.
        let component = if name.matches(':').count() == 4 {
            name.rsplit(':').next().unwrap_or(name)
        } else {
            name
        };

        Ok(Self {
            product: product.to_string(),
            component: component.to_string(),
            version: version.to_string(),
            release: release.to_string(),
        })
    }

    /// The key the CSAF product tree uses for this package's purl.
    pub fn purl_key(&self) -> String {
        format!("{}-{}-{}", self.component, self.version, self.release)
    }
}
