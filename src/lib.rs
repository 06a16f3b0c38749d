pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod lint;
pub mod model;
pub mod normalize;
pub mod output;

pub use cache::Cache;
pub use config::Config;
pub use convert::{get_converter, ConvertContext, Converter, Outcome, Record};
pub use error::ConvertError;
pub use model::{Range, RangeSpec, Vulnerability};
pub use normalize::SourceFormat;
