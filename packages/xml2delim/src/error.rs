//! Error types for the transcoder.
//!
//! A single `TranscodeError` covers every fatal condition. Missing data
//! (no match, absent attribute, empty text) is never an error.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the transcoder library.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// Template file could not be read.
    #[error("Cannot read template {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Template file is not valid JSON/YAML or has the wrong shape.
    #[error("Invalid template {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Template parsed but cannot drive a conversion.
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// Runtime option rejected before processing.
    #[error("Invalid option {name}='{value}': {reason}")]
    InvalidOption {
        name: String,
        value: String,
        reason: String,
    },

    /// Source XML file does not exist.
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    /// Directory of the output file does not exist.
    #[error("Output directory does not exist: {0}")]
    OutputDirMissing(PathBuf),

    /// Malformed selection expression evaluated against a node.
    #[error("Selection error for path '{expression}' in node <{tag}>: {reason}")]
    Selection {
        expression: String,
        tag: String,
        reason: String,
    },

    /// The streaming reader hit malformed XML.
    #[error("XML read error at byte {position}: {message}")]
    XmlRead { position: u64, message: String },

    /// A captured subtree could not be re-parsed.
    #[error("XML parsing failed: {0}")]
    XmlParse(#[from] roxmltree::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Worker pool could not be started.
    #[error("Cannot start worker pool: {0}")]
    WorkerPool(String),
}

impl TranscodeError {
    /// Build a selection error for `expression` evaluated on a node tagged `tag`.
    pub fn selection(
        expression: impl Into<String>,
        tag: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Selection {
            expression: expression.into(),
            tag: tag.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before any record is processed.
    #[must_use]
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigRead { .. }
                | Self::ConfigParse { .. }
                | Self::InvalidTemplate(_)
                | Self::InvalidOption { .. }
                | Self::InputNotFound(_)
                | Self::OutputDirMissing(_)
        )
    }
}

/// Result type alias for transcoder operations.
pub type Result<T> = std::result::Result<T, TranscodeError>;
