//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};

use crate::types::Preset;

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Directory of static files served as the router fallback (supports ~)
    pub static_dir: Option<String>,

    /// Allow cross-origin requests from any origin
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3002,
            static_dir: None,
            cors: true,
        }
    }
}

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of images transformed concurrently within one batch
    pub parallel_workers: usize,

    /// Resize filter: nearest, triangle, catmullrom, gaussian, lanczos3
    pub resize_filter: String,

    /// Quality used when a request omits it or gives an out-of-range value
    pub default_quality: u8,

    /// Extensions picked up by directory discovery in the CLI
    pub supported_formats: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
            resize_filter: "lanczos3".to_string(),
            default_quality: 80,
            supported_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "webp".to_string(),
                "gif".to_string(),
                "bmp".to_string(),
                "tif".to_string(),
                "tiff".to_string(),
            ],
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Per-item upload ceiling in megabytes
    pub max_file_size_mb: u64,

    /// Maximum number of images in one batch request
    pub max_batch_items: usize,

    /// Maximum image dimension (input width/height and requested target)
    pub max_image_dimension: u32,

    /// Maximum memory the decoder may allocate for one image, in megabytes
    pub max_decode_alloc_mb: u64,

    /// Per-item processing timeout in milliseconds
    pub item_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 10,
            max_batch_items: 50,
            max_image_dimension: 10000,
            max_decode_alloc_mb: 512,
            item_timeout_ms: 30000,
        }
    }
}

impl LimitsConfig {
    /// Per-item ceiling in bytes.
    pub fn max_item_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Largest request body a full batch can need, plus room for form fields.
    pub fn max_request_bytes(&self) -> usize {
        let items = self.max_item_bytes() as usize * self.max_batch_items;
        items.saturating_add(1024 * 1024)
    }
}

/// Archive output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Attachment file name of batch downloads
    pub file_name: String,

    /// Entry compression: "deflate" or "stored"
    pub compression: String,

    /// Size of the in-memory pipe between the archive writer and the consumer
    pub stream_buffer_kb: usize,

    /// Rename entries whose output names collide (a.jpeg, a-1.jpeg, ...)
    pub dedupe_names: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            file_name: "imagens_otimizadas.zip".to_string(),
            compression: "deflate".to_string(),
            stream_buffer_kb: 64,
            dedupe_names: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Size presets offered to clients.
pub fn default_presets() -> Vec<Preset> {
    vec![
        Preset::new("Thumbnail", 150, 150),
        Preset::new("Small", 400, 400),
        Preset::new("Medium", 800, 800),
        Preset::new("Large", 1200, 1200),
    ]
}
