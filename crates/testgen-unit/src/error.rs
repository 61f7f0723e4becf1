//! Error types for unit extraction

/// Errors raised while extracting units from source text
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Source text failed to parse; extraction for the file is aborted
    /// and no partial unit list is returned.
    #[error("parse error in {path}: {message}")]
    Parse {
        /// Source file path
        path: String,
        /// Parser diagnostic
        message: String,
    },

    /// The grammar failed to load into the parser
    #[error("language error: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    /// Source contained byte sequences the parser could not decode
    #[error("invalid utf-8 in {path}")]
    InvalidUtf8 {
        /// Source file path
        path: String,
    },
}
