use thiserror::Error;

use crate::model::Operator;
use crate::normalize::SourceFormat;

/// Errors raised while converting a single advisory record.
///
/// Every variant is scoped to one record: the batch driver reports it and
/// moves on to the next record.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Malformed source text: a range expression, purl, NEVRA or list line.
    #[error("failed to parse `{input}`: {reason}")]
    Parse { input: String, reason: String },

    #[error("unknown operator `{operator}` in range `{input}`")]
    UnknownOperator { operator: String, input: String },

    /// Mutually exclusive fields were both present in the source data.
    #[error("structural inconsistency: {0}")]
    Structural(String),

    #[error("unmapped {format} ecosystem: {value}")]
    UnmappedEcosystem { format: SourceFormat, value: String },

    /// OSV lower bounds are always inclusive, so `>` has no faithful mapping.
    #[error("unsupported operator `{}` for version {version}", .operator.as_str())]
    UnsupportedOperator { operator: Operator, version: String },

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub(crate) fn parse(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// True for the parse family: malformed text, unknown operators.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::UnknownOperator { .. })
    }
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
