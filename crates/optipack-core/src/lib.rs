//! Optipack Core - Embeddable batch image optimization library.
//!
//! Optipack takes uploaded images plus one set of options, re-encodes each
//! image (resize, format conversion, quality) and packs the results into a
//! ZIP archive that is streamed while it is being built.
//!
//! # Architecture
//!
//! ```text
//! Items → Validate → Coordinator (bounded workers) → Transform → ArchiveStreamer → Sink
//! ```
//!
//! Failed items are left out of the archive; the rest of the batch continues.
//!
//! # Usage
//!
//! ```rust,ignore
//! use optipack_core::{BatchService, Config, InputItem, TransformForm};
//!
//! #[tokio::main]
//! async fn main() -> optipack_core::Result<()> {
//!     let service = BatchService::new(Config::load()?);
//!
//!     let mut form = TransformForm::default();
//!     form.set("width", "800");
//!     form.set("format", "webp");
//!     let spec = service.spec_from_form(form)?;
//!
//!     let items = vec![InputItem::new("cat.png", std::fs::read("cat.png")?)];
//!     let mut file = tokio::fs::File::create("out.zip").await?;
//!     let summary = service.process_batch(items, spec)?.write_to(&mut file).await?;
//!     println!("{} entries", summary.entries.len());
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod archive;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod service;
pub mod types;

// Re-exports for convenient access
pub use archive::{ArchiveOptions, ArchiveStreamer, ArchiveSummary};
pub use config::Config;
pub use error::{
    ConfigError, ItemError, OptipackError, Result, SinkError, TransformError, TransformResult,
    ValidationError,
};
pub use output::{OutputWriter, ReportFormat};
pub use pipeline::{
    BatchCoordinator, ImageTransform, ImageTransformer, TargetFormat, TransformForm, TransformSpec,
};
pub use service::{BatchDownload, BatchService};
pub use types::{BatchProgress, BatchResult, InputItem, OutputItem, Preset};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
