//! Error types for the fingerprint store

use std::path::PathBuf;

/// Errors raised by the fingerprint store
///
/// Store faults are infrastructure-level: they abort the whole pass
/// rather than a single unit.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem I/O failure
    #[error("store io error at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Entry serialization failed
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted entry could not be decoded
    #[error("corrupt store entry at {path}: {message}")]
    Corrupt {
        /// Offending file
        path: PathBuf,
        /// Decode diagnostic
        message: String,
    },

    /// Lookup target does not exist
    #[error("unknown unit: {0}")]
    UnknownUnit(String),
}

impl StoreError {
    /// Wrap an I/O error with the path it concerned
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::io("store/x.json", std::io::Error::other("disk full"));
        assert!(err.to_string().contains("store/x.json"));

        let err = StoreError::UnknownUnit("a.py::f".to_string());
        assert!(err.to_string().contains("a.py::f"));
    }
}
