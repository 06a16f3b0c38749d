use crate::error::{ConvertError, Result};
use crate::model::{Operator, RangeSpec, VersionSpec};

use super::{RangeParser, SourceFormat};

/// Parses GHSA `vulnerableVersionRange` strings.
///
/// The documented forms are `= 0.2.0`, `<= 1.0.8`, `< 0.1.11`,
/// `>= 4.3.0, < 4.3.5` and `>= 0.0.1`. `>` also shows up in practice.
#[derive(Debug, Clone, Copy, Default)]
pub struct GhsaRangeParser;

impl RangeParser<str> for GhsaRangeParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::Ghsa
    }

    fn parse(&self, input: &str) -> Result<RangeSpec> {
        let specs = input
            .split(',')
            .map(str::trim)
            .map(|part| parse_part(part, input))
            .collect::<Result<Vec<_>>>()?;

        RangeSpec::from_specs(specs, input)
    }
}

fn parse_part(part: &str, input: &str) -> Result<VersionSpec> {
    let mut tokens = part.split_whitespace();
    let (Some(operator), Some(version), None) = (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(ConvertError::parse(
            input,
            format!("expected `<operator> <version>`, got `{}`", part),
        ));
    };

    let operator = operator
        .parse::<Operator>()
        .map_err(|operator| ConvertError::UnknownOperator {
            operator,
            input: input.to_string(),
        })?;

    Ok(VersionSpec::new(operator, version))
}
