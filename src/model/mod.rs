//! Core data types for source ranges and OSV records.
//!
//! - [`RangeSpec`] / [`VersionSpec`] - a parsed source-side range
//! - [`Event`] / [`Range`] - a normalized OSV range
//! - [`Vulnerability`] - a complete OSV record
//!
//! # Example
//!
//! ```
//! use osvconvert::model::{Event, Range, RangeType};
//!
//! let range = Range::from_events(
//!     RangeType::Ecosystem,
//!     vec![Event::Introduced("0".into()), Event::Fixed("1.2".into())],
//! );
//! assert!(range.is_some());
//! ```

mod osv;
mod range;

pub use osv::*;
pub use range::*;
