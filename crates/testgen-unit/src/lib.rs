//! TestGen Unit - Unit model and source analysis
//!
//! A *unit* is an independently testable code element extracted from
//! source: a function, method, or class. This crate provides:
//! - [`Unit`] and friends, the data model shared across the engine
//! - [`Fingerprint`], the Blake3 content hash of normalized unit source
//! - [`UnitExtractor`], tree-sitter backed extraction from Python files
//! - [`normalize_source`], the whitespace/comment normalization step that
//!   keeps fingerprints stable across formatting-only edits
//!
//! # Example
//!
//! ```rust,ignore
//! use testgen_unit::UnitExtractor;
//!
//! let mut extractor = UnitExtractor::new()?;
//! let units = extractor.extract("src/calc.py", source)?;
//! for unit in &units {
//!     println!("{} {}", unit.id, unit.fingerprint.short());
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod extract;
pub mod hash;
pub mod normalize;
pub mod unit;

pub use error::ExtractError;
pub use extract::UnitExtractor;
pub use hash::{Fingerprint, FingerprintError};
pub use normalize::normalize_source;
pub use unit::{Param, Signature, Unit, UnitId, UnitKind};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
