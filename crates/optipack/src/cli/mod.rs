//! Command implementations.

pub mod batch;
pub mod config;
pub mod presets;
pub mod process;
pub mod serve;

use clap::Args;
use optipack_core::TransformForm;

/// Transform options shared by `process` and `batch`.
#[derive(Args, Debug, Clone, Default)]
pub struct TransformArgs {
    /// Target width in pixels
    #[arg(short = 'W', long)]
    pub width: Option<u32>,

    /// Target height in pixels
    #[arg(short = 'H', long)]
    pub height: Option<u32>,

    /// Output quality (1-100), applies to JPEG and WebP
    #[arg(short, long)]
    pub quality: Option<u32>,

    /// Output format: original, jpeg, png, webp
    #[arg(short, long, default_value = "original")]
    pub format: String,

    /// Fit inside the target box instead of stretching to it
    #[arg(short = 'k', long)]
    pub keep_aspect: bool,
}

impl TransformArgs {
    /// Options in the same shape the HTTP form uses.
    pub fn to_form(&self) -> TransformForm {
        TransformForm {
            width: self.width.map(|w| w.to_string()),
            height: self.height.map(|h| h.to_string()),
            quality: self.quality.map(|q| q.to_string()),
            format: Some(self.format.clone()),
            maintain_aspect_ratio: Some(self.keep_aspect.to_string()),
        }
    }
}

/// Expand `~` in a user-supplied path.
pub(crate) fn expand_path(path: &std::path::Path) -> std::path::PathBuf {
    let raw = path.to_string_lossy();
    std::path::PathBuf::from(shellexpand::tilde(&raw).into_owned())
}
