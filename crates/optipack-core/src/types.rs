//! Core data types flowing through the batch pipeline.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ItemError;

/// One uploaded image. Owned by the request and never mutated.
#[derive(Debug, Clone)]
pub struct InputItem {
    /// Original file name as supplied by the client
    pub name: String,

    /// Raw encoded image bytes
    pub bytes: Bytes,
}

impl InputItem {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Size of the uploaded buffer in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Final path component of the name, without directories.
    pub fn file_name(&self) -> &str {
        file_name_of(&self.name)
    }

    /// File name without its extension, falling back to "image".
    pub fn stem(&self) -> &str {
        let file_name = self.file_name();
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        if stem.is_empty() {
            "image"
        } else {
            stem
        }
    }

    /// Lower-cased extension of the name, if it has one.
    pub fn extension(&self) -> Option<String> {
        Path::new(self.file_name())
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(|e| e.to_ascii_lowercase())
    }
}

/// Strip any directory components a client put in a file name.
fn file_name_of(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// A successfully transformed image.
#[derive(Debug, Clone)]
pub struct OutputItem {
    /// Output file name: base name plus resolved extension
    pub name: String,

    /// Encoded output bytes
    pub bytes: Bytes,

    /// Size of the input in bytes
    pub original_size: u64,

    /// Size of the output in bytes
    pub optimized_size: u64,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// MIME type of the output
    pub content_type: &'static str,
}

impl OutputItem {
    /// Size change relative to the input, in percent. Negative when the output grew.
    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.original_size, self.optimized_size)
    }

    /// Reduction rounded to one decimal place, as shown to clients.
    pub fn reduction_label(&self) -> String {
        format!("{:.1}", self.reduction_percent())
    }
}

/// `(original - optimized) / original * 100`, zero for an empty original.
pub fn reduction_percent(original: u64, optimized: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original as f64 - optimized as f64) / original as f64 * 100.0
}

/// Ordered outcome of a batch: one slot per input item, in input order.
#[derive(Debug, Default)]
pub struct BatchResult {
    slots: Vec<Result<OutputItem, ItemError>>,
}

impl BatchResult {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Append the outcome for the next input index.
    pub fn push(&mut self, outcome: Result<OutputItem, ItemError>) {
        self.slots.push(outcome);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.slots.iter().filter(|s| s.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.slots.iter().filter(|s| s.is_err()).count()
    }

    pub fn slots(&self) -> &[Result<OutputItem, ItemError>] {
        &self.slots
    }

    /// Successful outputs, in input order.
    pub fn outputs(&self) -> impl Iterator<Item = &OutputItem> {
        self.slots.iter().filter_map(|s| s.as_ref().ok())
    }

    /// Failures, in input order.
    pub fn failures(&self) -> impl Iterator<Item = &ItemError> {
        self.slots.iter().filter_map(|s| s.as_ref().err())
    }
}

impl IntoIterator for BatchResult {
    type Item = Result<OutputItem, ItemError>;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

impl Extend<Result<OutputItem, ItemError>> for BatchResult {
    fn extend<I: IntoIterator<Item = Result<OutputItem, ItemError>>>(&mut self, iter: I) {
        self.slots.extend(iter);
    }
}

impl FromIterator<Result<OutputItem, ItemError>> for BatchResult {
    fn from_iter<I: IntoIterator<Item = Result<OutputItem, ItemError>>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}

/// Live progress of a batch run, published as items complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Items in the batch
    pub total: usize,

    /// Items resolved (succeeded + failed)
    pub completed: usize,

    /// Items transformed successfully
    pub succeeded: usize,

    /// Items that failed
    pub failed: usize,

    /// Transforms currently holding a worker slot
    pub in_flight: usize,

    /// Highest `in_flight` observed during the run
    pub peak_in_flight: usize,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

/// A named size preset offered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl Preset {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }
}
