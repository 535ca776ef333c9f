//! Streaming ZIP output.
//!
//! Entries are written to the sink as soon as they are appended; nothing but
//! the summary is kept after an entry is written. The sink never needs to
//! seek, so it can be a socket, a pipe or a file.

use async_zip::base::write::ZipFileWriter;
use async_zip::error::ZipError;
use async_zip::{Compression, DeflateOption, ZipEntryBuilder};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::config::ArchiveConfig;
use crate::error::{ItemError, SinkError};
use crate::types::OutputItem;

/// Entry compression method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArchiveCompression {
    /// Deflate at maximum level
    #[default]
    Deflate,
    /// No compression
    Stored,
}

impl ArchiveCompression {
    /// Parse a compression name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "deflate" => Some(Self::Deflate),
            "stored" | "store" | "none" => Some(Self::Stored),
            _ => None,
        }
    }
}

/// Options for an archive stream.
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    pub compression: ArchiveCompression,
}

impl ArchiveOptions {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            compression: ArchiveCompression::parse(&config.compression).unwrap_or_default(),
        }
    }
}

/// One entry written to the archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryRecord {
    pub name: String,
    pub original_size: u64,
    pub optimized_size: u64,
    pub width: u32,
    pub height: u32,
    pub reduction_percent: f64,
}

impl From<&OutputItem> for EntryRecord {
    fn from(item: &OutputItem) -> Self {
        Self {
            name: item.name.clone(),
            original_size: item.original_size,
            optimized_size: item.optimized_size,
            width: item.width,
            height: item.height,
            reduction_percent: item.reduction_percent(),
        }
    }
}

/// One item left out of the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub name: String,
    pub kind: &'static str,
    pub error: String,
}

impl From<&ItemError> for FailedItem {
    fn from(err: &ItemError) -> Self {
        Self {
            name: err.name.clone(),
            kind: err.error.kind(),
            error: err.error.to_string(),
        }
    }
}

/// What ended up in an archive. Metadata only, never image bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArchiveSummary {
    pub entries: Vec<EntryRecord>,
    pub failures: Vec<FailedItem>,
}

impl ArchiveSummary {
    /// Sum of input sizes of the archived entries.
    pub fn original_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.original_size).sum()
    }

    /// Sum of output sizes of the archived entries.
    pub fn optimized_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.optimized_size).sum()
    }
}

/// Writes output items into a ZIP stream.
///
/// `finish` consumes the streamer, so the central directory is written
/// exactly once and nothing can be appended afterwards.
pub struct ArchiveStreamer<W: AsyncWrite + Unpin> {
    writer: ZipFileWriter<Compat<W>>,
    options: ArchiveOptions,
    summary: ArchiveSummary,
}

impl<W: AsyncWrite + Unpin> ArchiveStreamer<W> {
    pub fn new(sink: W, options: ArchiveOptions) -> Self {
        Self {
            writer: ZipFileWriter::new(sink.compat_write()),
            options,
            summary: ArchiveSummary::default(),
        }
    }

    /// Write one entry named after the item.
    pub async fn append(&mut self, item: &OutputItem) -> Result<(), SinkError> {
        let builder = match self.options.compression {
            ArchiveCompression::Deflate => {
                ZipEntryBuilder::new(item.name.clone().into(), Compression::Deflate)
                    .deflate_option(DeflateOption::Maximum)
            }
            ArchiveCompression::Stored => {
                ZipEntryBuilder::new(item.name.clone().into(), Compression::Stored)
            }
        };

        self.writer
            .write_entry_whole(builder, &item.bytes)
            .await
            .map_err(sink_error)?;

        tracing::trace!("Archived {} ({} bytes)", item.name, item.optimized_size);
        self.summary.entries.push(EntryRecord::from(item));
        Ok(())
    }

    /// Note an item that is left out of the archive.
    pub fn record_failure(&mut self, err: &ItemError) {
        self.summary.failures.push(FailedItem::from(err));
    }

    /// Write the central directory and shut the sink down.
    pub async fn finish(self) -> Result<ArchiveSummary, SinkError> {
        let mut sink = self.writer.close().await.map_err(sink_error)?.into_inner();
        sink.shutdown().await?;
        Ok(self.summary)
    }

    /// Consume outcomes in order: successes become entries, failures are skipped.
    ///
    /// The first sink error stops the stream and is returned; the archive is
    /// left unfinished.
    pub async fn stream_batch<S>(mut self, outcomes: S) -> Result<ArchiveSummary, SinkError>
    where
        S: Stream<Item = Result<OutputItem, ItemError>>,
    {
        futures_util::pin_mut!(outcomes);
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Ok(item) => self.append(&item).await?,
                Err(err) => self.record_failure(&err),
            }
        }
        self.finish().await
    }
}

fn sink_error(err: ZipError) -> SinkError {
    match err {
        ZipError::UpstreamReadError(e) => SinkError::Io(e),
        other => SinkError::Archive(other.to_string()),
    }
}
