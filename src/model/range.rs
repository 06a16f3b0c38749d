use std::str::FromStr;

use crate::error::{ConvertError, Result};

/// Comparison operator of a source range bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ge => ">=",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Lt => "<",
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(Operator::Eq),
            ">=" => Ok(Operator::Ge),
            ">" => Ok(Operator::Gt),
            "<=" => Ok(Operator::Le),
            "<" => Ok(Operator::Lt),
            _ => Err(s.to_string()),
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operator/version pair, e.g. `>= 4.3.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpec {
    pub operator: Operator,
    pub version: String,
}

impl VersionSpec {
    pub fn new(operator: Operator, version: impl Into<String>) -> Self {
        Self {
            operator,
            version: version.into(),
        }
    }
}

impl std::fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.operator, self.version)
    }
}

/// A parsed source range: either an exact version or lower/upper bounds.
///
/// Only the validating constructors can build one, so `exact` never
/// coexists with `lower` or `upper`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSpec {
    lower: Option<VersionSpec>,
    upper: Option<VersionSpec>,
    exact: Option<VersionSpec>,
}

impl RangeSpec {
    /// Sorts each spec into its slot by operator.
    ///
    /// `source` is the original text, used in error messages.
    pub fn from_specs(specs: impl IntoIterator<Item = VersionSpec>, source: &str) -> Result<Self> {
        let mut range = RangeSpec::default();

        for spec in specs {
            let slot = match spec.operator {
                Operator::Eq => &mut range.exact,
                Operator::Ge | Operator::Gt => &mut range.lower,
                Operator::Le | Operator::Lt => &mut range.upper,
            };
            if let Some(existing) = slot {
                return Err(ConvertError::Structural(format!(
                    "conflicting bounds `{}` and `{}` in range `{}`",
                    existing, spec, source
                )));
            }
            *slot = Some(spec);
        }

        if range.exact.is_some() && (range.lower.is_some() || range.upper.is_some()) {
            return Err(ConvertError::Structural(format!(
                "range with both exact and lower/upper bounds: `{}`",
                source
            )));
        }

        Ok(range)
    }

    /// A range bounded only above by `< version`.
    pub fn fixed_at(version: impl Into<String>) -> Self {
        Self {
            upper: Some(VersionSpec::new(Operator::Lt, version)),
            ..Default::default()
        }
    }

    /// `[lower, fixed)`, with `lower` omitted when it is `None` or `"0"`.
    pub fn between(lower: Option<&str>, fixed: Option<&str>) -> Self {
        Self {
            lower: lower
                .filter(|v| *v != "0")
                .map(|v| VersionSpec::new(Operator::Ge, v)),
            upper: fixed.map(|v| VersionSpec::new(Operator::Lt, v)),
            exact: None,
        }
    }

    pub fn lower(&self) -> Option<&VersionSpec> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Option<&VersionSpec> {
        self.upper.as_ref()
    }

    pub fn exact(&self) -> Option<&VersionSpec> {
        self.exact.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_none() && self.upper.is_none() && self.exact.is_none()
    }
}
