//! The unit data model
//!
//! A [`Unit`] is an independently testable code element (function, method,
//! or class) with a stable identity and a content fingerprint. Units are
//! created per analysis pass and superseded when the source changes; a
//! changed fingerprint produces a new revision, never an in-place edit.

use crate::hash::Fingerprint;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::ops::Range;

/// Stable identity of a unit: source path plus qualified name
///
/// Identity survives formatting-only edits; only renames or moves change it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId {
    /// Source file path (as given to the extractor)
    pub path: String,
    /// Qualified name within the file (`func`, `Class`, `Class.method`)
    pub qualified_name: String,
}

impl UnitId {
    /// Create a new unit identity
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            qualified_name: qualified_name.into(),
        }
    }

    /// Canonical rendering used for hashing and store file naming
    #[inline]
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}::{}", self.path, self.qualified_name)
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.path, self.qualified_name)
    }
}

/// Kind of testable element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    /// Module-level function
    Function,
    /// Method on a class
    Method,
    /// Class definition
    Class,
}

/// A single parameter in a unit's signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Type annotation, if present in source
    pub annotation: Option<String>,
}

impl Param {
    /// Create an unannotated parameter
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: None,
        }
    }

    /// Create an annotated parameter
    #[inline]
    #[must_use]
    pub fn annotated(name: impl Into<String>, annotation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: Some(annotation.into()),
        }
    }
}

/// Ordered parameter list with optional return annotation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Parameters in declaration order (`self`/`cls` excluded for methods)
    pub params: Vec<Param>,
    /// Return type annotation, if present
    pub returns: Option<String>,
}

impl Signature {
    /// Render the signature for prompts and canonical hashing
    #[must_use]
    pub fn render(&self, name: &str) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| match &p.annotation {
                Some(a) => format!("{}: {}", p.name, a),
                None => p.name.clone(),
            })
            .collect();
        match &self.returns {
            Some(r) => format!("{}({}) -> {}", name, params.join(", "), r),
            None => format!("{}({})", name, params.join(", ")),
        }
    }
}

/// An independently testable code element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Stable identity
    pub id: UnitId,
    /// Element kind
    pub kind: UnitKind,
    /// Signature (empty for classes)
    pub signature: Signature,
    /// Docstring text, if present
    pub docstring: Option<String>,
    /// Byte range of the definition in the original source
    pub byte_range: Range<usize>,
    /// Fingerprint of the unit's normalized source text
    pub fingerprint: Fingerprint,
    /// Referenced names that are not builtins, parameters, or locals
    pub dependencies: Vec<String>,
    /// Full source text of the definition, snapshotted at extraction
    pub source: String,
}

impl Unit {
    /// Rendered signature (`name(params) -> ret`)
    #[inline]
    #[must_use]
    pub fn rendered_signature(&self) -> String {
        self.signature.render(&self.id.qualified_name)
    }
}
