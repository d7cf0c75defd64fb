//! Error types for vidseek
//!
//! Per-modality failures (`EncodingError`, `ExtractionError`) are recoverable:
//! the fusion engine and the index builder record them and carry on.
//! Everything else surfaces through `SeekError`.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::search::Modality;

/// Result type alias for vidseek operations
pub type Result<T> = std::result::Result<T, SeekError>;

/// Why an encoder could not produce a vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncodingFailure {
    EmptyInput,
    UnsupportedFormat,
    NetworkUnavailable,
    Timeout,
    Unreachable,
    Backend,
}

impl EncodingFailure {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyInput => "EMPTY_INPUT",
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            Self::NetworkUnavailable => "NETWORK_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::Unreachable => "UNREACHABLE",
            Self::Backend => "BACKEND",
        }
    }
}

impl fmt::Display for EncodingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single modality failed to encode
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{modality} encoding failed ({kind}): {detail}")]
pub struct EncodingError {
    pub modality: Modality,
    pub kind: EncodingFailure,
    pub detail: String,
}

impl EncodingError {
    pub fn new(modality: Modality, kind: EncodingFailure, detail: impl Into<String>) -> Self {
        Self {
            modality,
            kind,
            detail: detail.into(),
        }
    }

    pub fn empty_input(modality: Modality) -> Self {
        Self::new(modality, EncodingFailure::EmptyInput, "input is empty after trimming")
    }

    /// Re-label the error with the query modality it was raised for.
    ///
    /// Document text goes through the text encoder, so its failures are
    /// reported against `Modality::Document`.
    #[must_use]
    pub fn with_modality(mut self, modality: Modality) -> Self {
        self.modality = modality;
        self
    }
}

/// Why the document collaborator could not produce text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractionFailure {
    UnreadableFile,
    UnsupportedFormat,
    EmptyContent,
}

impl ExtractionFailure {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnreadableFile => "UNREADABLE_FILE",
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            Self::EmptyContent => "EMPTY_CONTENT",
        }
    }
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("extraction failed for {} ({kind}): {detail}", path.display())]
pub struct ExtractionError {
    pub path: PathBuf,
    pub kind: ExtractionFailure,
    pub detail: String,
}

impl ExtractionError {
    pub fn new(path: impl Into<PathBuf>, kind: ExtractionFailure, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            detail: detail.into(),
        }
    }
}

/// A modality that was present in the query but contributed nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedModality {
    pub modality: Modality,
    /// Stable failure code (`EMPTY_INPUT`, `UNREADABLE_FILE`, ...)
    pub code: String,
    pub reason: String,
}

impl From<EncodingError> for DroppedModality {
    fn from(err: EncodingError) -> Self {
        Self {
            modality: err.modality,
            code: err.kind.as_str().to_string(),
            reason: err.to_string(),
        }
    }
}

impl DroppedModality {
    pub fn from_extraction(err: &ExtractionError) -> Self {
        Self {
            modality: Modality::Document,
            code: err.kind.as_str().to_string(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FusionError {
    #[error("no usable signal: {}", describe_dropped(dropped))]
    NoUsableSignal { dropped: Vec<DroppedModality> },
}

fn describe_dropped(dropped: &[DroppedModality]) -> String {
    if dropped.is_empty() {
        return "no modalities were supplied".to_string();
    }
    dropped
        .iter()
        .map(|d| format!("{} dropped ({})", d.modality, d.code))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Main error type for vidseek
#[derive(Error, Debug)]
pub enum SeekError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Fusion(#[from] FusionError),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid top_k {requested}: must be between 1 and {max}")]
    InvalidTopK { requested: usize, max: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing configuration: {0}")]
    MissingConfig(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SeekError {
    /// Stable machine-readable code used for robot output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Encoding(_) => "encoding_error",
            Self::Extraction(_) => "extraction_error",
            Self::Fusion(FusionError::NoUsableSignal { .. }) => "no_usable_signal",
            Self::InvalidDimension { .. } => "invalid_dimension",
            Self::InvalidQuery(_) => "invalid_query",
            Self::InvalidTopK { .. } => "invalid_top_k",
            Self::Config(_) | Self::MissingConfig(_) => "config_error",
            Self::NotFound(_) => "not_found",
            Self::Serialization(_) => "serialization_error",
            Self::Database(_) => "database_error",
            Self::Io(_) => "io_error",
        }
    }

    /// True for setup defects rather than bad user input.
    pub const fn is_configuration_defect(&self) -> bool {
        matches!(
            self,
            Self::InvalidDimension { .. } | Self::InvalidTopK { .. } | Self::Config(_)
        )
    }
}

impl From<serde_json::Error> for SeekError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_error_names_modality_and_kind() {
        let err = EncodingError::empty_input(Modality::Text);
        let msg = err.to_string();
        assert!(msg.contains("text"));
        assert!(msg.contains("EMPTY_INPUT"));
    }

    #[test]
    fn test_relabel_document() {
        let err = EncodingError::empty_input(Modality::Text).with_modality(Modality::Document);
        assert_eq!(err.modality, Modality::Document);
        let dropped = DroppedModality::from(err);
        assert_eq!(dropped.code, "EMPTY_INPUT");
        assert_eq!(dropped.modality, Modality::Document);
    }

    #[test]
    fn test_fusion_error_lists_dropped() {
        let err = FusionError::NoUsableSignal {
            dropped: vec![DroppedModality::from_extraction(&ExtractionError::new(
                "doc.pdf",
                ExtractionFailure::UnreadableFile,
                "no such file",
            ))],
        };
        let msg = err.to_string();
        assert!(msg.contains("document dropped (UNREADABLE_FILE)"));
    }

    #[test]
    fn test_configuration_defects() {
        assert!(SeekError::InvalidDimension { expected: 4, actual: 3 }.is_configuration_defect());
        assert!(SeekError::InvalidTopK { requested: 0, max: 10 }.is_configuration_defect());
        assert!(!SeekError::InvalidQuery("empty".into()).is_configuration_defect());
        assert_eq!(SeekError::InvalidQuery("x".into()).code(), "invalid_query");
    }
}
