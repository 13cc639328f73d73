//! Error types for the chroma_shift engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for chroma_shift operations
pub type Result<T> = std::result::Result<T, RecolorError>;

/// Stable, serializable classification of a [`RecolorError`].
///
/// This is what travels inside a `VariationFailure`, so callers can branch on
/// the failure cause without matching on the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Decode,
    Encode,
    Clustering,
    PaletteValidation,
    Masking,
    Timeout,
    AggregateFailure,
    Storage,
    Config,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Decode => "decode",
            ErrorKind::Encode => "encode",
            ErrorKind::Clustering => "clustering",
            ErrorKind::PaletteValidation => "palette_validation",
            ErrorKind::Masking => "masking",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AggregateFailure => "aggregate_failure",
            ErrorKind::Storage => "storage",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// One failed variation inside an [`RecolorError::AggregateFailure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    pub palette_name: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Every way the recoloring engine can fail.
#[derive(Error, Debug)]
pub enum RecolorError {
    /// Input bytes are not a supported raster image, or are truncated/corrupt
    #[error("Failed to decode image: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<image::ImageError>,
    },

    /// A buffer could not be written in the requested format
    #[error("Failed to encode image: {message}")]
    Encode {
        message: String,
        #[source]
        source: Option<image::ImageError>,
    },

    /// K-means was asked to cluster nothing
    #[error("Clustering failed: {reason}")]
    Clustering { reason: String },

    /// Palette is empty or contains an entry that is not `#RRGGBB`
    #[error("Invalid palette: {reason}")]
    PaletteValidation { reason: String },

    /// Color-space masking hit a malformed buffer
    #[error("Masking failed: {reason}")]
    Masking { reason: String },

    /// A variation task exceeded its time budget
    #[error("Variation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Every variation in the batch failed
    #[error("All {} variations failed: {}", .failures.len(), summarize(.failures))]
    AggregateFailure { failures: Vec<FailureReason> },

    /// The storage collaborator rejected a finished variation
    #[error("Storage failed: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration could not be loaded or is out of range
    #[error("Invalid configuration: {parameter} = {value}")]
    Config { parameter: String, value: String },

    /// A worker task panicked or was dropped before reporting
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn summarize(failures: &[FailureReason]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({}): {}", f.palette_name, f.kind, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl RecolorError {
    /// Create a decode error wrapping an `image` crate error
    pub fn decode(message: impl Into<String>, source: image::ImageError) -> Self {
        Self::Decode {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an encode error wrapping an `image` crate error
    pub fn encode(message: impl Into<String>, source: image::ImageError) -> Self {
        Self::Encode {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn palette(reason: impl Into<String>) -> Self {
        Self::PaletteValidation {
            reason: reason.into(),
        }
    }

    /// Create a storage error with context
    pub fn storage<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config(parameter: impl Into<String>, value: impl ToString) -> Self {
        Self::Config {
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RecolorError::Decode { .. } => ErrorKind::Decode,
            RecolorError::Encode { .. } => ErrorKind::Encode,
            RecolorError::Clustering { .. } => ErrorKind::Clustering,
            RecolorError::PaletteValidation { .. } => ErrorKind::PaletteValidation,
            RecolorError::Masking { .. } => ErrorKind::Masking,
            RecolorError::Timeout { .. } => ErrorKind::Timeout,
            RecolorError::AggregateFailure { .. } => ErrorKind::AggregateFailure,
            RecolorError::Storage { .. } => ErrorKind::Storage,
            RecolorError::Config { .. } => ErrorKind::Config,
            RecolorError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// True when the caller sent something malformed (maps to a 4xx class).
    ///
    /// Everything else is a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RecolorError::Decode { .. }
                | RecolorError::PaletteValidation { .. }
                | RecolorError::Config { .. }
        )
    }

    /// Get user-friendly error description for application display
    pub fn user_message(&self) -> String {
        match self {
            RecolorError::Decode { .. } => {
                "Could not read the image. Please upload a PNG, JPEG or WEBP file.".to_string()
            }
            RecolorError::PaletteValidation { reason } => {
                format!("The color palette is invalid: {reason}.")
            }
            RecolorError::Timeout { .. } => {
                "Generating this color variation took too long. Please try again.".to_string()
            }
            RecolorError::AggregateFailure { failures } => format!(
                "None of the {} color variations could be generated.",
                failures.len()
            ),
            _ => "Recoloring failed. Please try again with a different image.".to_string(),
        }
    }
}
