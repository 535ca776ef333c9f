//! Image transformation pipeline components.
//!
//! This module contains the stages of the transform pipeline:
//! - **spec**: Transform options shared by every item in a request
//! - **decode**: Load and decode images with size limits
//! - **resize**: Target geometry and resampling
//! - **encode**: Output format resolution and encoding
//! - **transform**: One image in, re-encoded bytes out
//! - **coordinator**: Bounded, order-preserving batch fan-out
//! - **discovery**: Find image files in directories

pub mod coordinator;
pub mod decode;
pub mod discovery;
pub mod encode;
pub mod resize;
pub mod spec;
pub mod transform;

// Re-exports for convenient access
pub use coordinator::{BatchCoordinator, BatchRun, CoordinatorOptions};
pub use decode::{DecodedImage, ImageDecoder};
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use encode::OutputEncoding;
pub use spec::{TargetFormat, TransformForm, TransformSpec, DEFAULT_QUALITY};
pub use transform::{ImageTransform, ImageTransformer};
