//! Error types for the Optipack batch pipeline.
//!
//! Errors are organized by where they stop work: validation errors reject a
//! request before anything runs, transform errors are captured per item, and
//! sink errors end a streaming download.

use thiserror::Error;

/// Top-level error type for Optipack operations.
#[derive(Error, Debug)]
pub enum OptipackError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Request rejected at the boundary
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A single image failed to transform
    #[error("Processing error: {0}")]
    Item(#[from] ItemError),

    /// The archive output stream broke
    #[error("Output stream error: {0}")]
    Sink(#[from] SinkError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Bad or missing input, detected before the pipeline is invoked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Batch request carried no images
    #[error("No images were uploaded")]
    EmptyBatch,

    /// Single-image request carried no image field
    #[error("No image was uploaded")]
    MissingImage,

    /// Batch exceeds the configured item count
    #[error("Too many images: {count} > {max}")]
    TooManyItems { count: usize, max: usize },

    /// Item exceeds the per-item byte ceiling
    #[error("Image too large: {name} ({size_bytes} bytes > {max_bytes} bytes)")]
    ItemTooLarge {
        name: String,
        size_bytes: u64,
        max_bytes: u64,
    },

    /// Requested target dimension exceeds the configured maximum
    #[error("Requested {field} {value} exceeds the maximum of {max}")]
    DimensionTooLarge {
        field: &'static str,
        value: u32,
        max: u32,
    },

    /// Option field could not be interpreted
    #[error("Invalid value for {field}: {message}")]
    InvalidOption { field: String, message: String },
}

/// Failure transforming one image. Captured per item, never fatal to a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Input bytes are not a recognizable image
    #[error("Decode failed: {message}")]
    Decode { message: String },

    /// Output could not be produced for the resolved format
    #[error("Encode to {format} failed: {message}")]
    Encode { format: String, message: String },

    /// Resolved format cannot be written and no pass-through is possible
    #[error("Unsupported output format: {format}")]
    UnsupportedFormat { format: String },

    /// Requested output would exceed the configured image limits
    #[error("Output {width}x{height} exceeds limits: {reason}")]
    OutputTooLarge {
        width: u32,
        height: u32,
        reason: String,
    },

    /// Item exceeded the per-item processing timeout
    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Batch was cancelled before the item finished
    #[error("Cancelled")]
    Cancelled,

    /// The worker running the item failed (panic or join error)
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl TransformError {
    /// Stable machine-readable tag for this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Encode { .. } => "encode",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::OutputTooLarge { .. } => "too_large",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Worker(_) => "worker",
        }
    }
}

/// A transform error tagged with the name of the item that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}: {error}")]
pub struct ItemError {
    /// Original file name of the failed item
    pub name: String,
    /// What went wrong
    #[source]
    pub error: TransformError,
}

impl ItemError {
    pub fn new(name: impl Into<String>, error: TransformError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }
}

/// The archive output stream could not be written.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Underlying writer failed
    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Archive container rejected an operation
    #[error("Archive error: {0}")]
    Archive(String),

    /// Consumer went away before the archive was complete
    #[error("Consumer disconnected")]
    Disconnected,
}

/// Convenience type alias for Optipack results.
pub type Result<T> = std::result::Result<T, OptipackError>;

/// Convenience type alias for per-item transform results.
pub type TransformResult<T> = std::result::Result<T, TransformError>;
