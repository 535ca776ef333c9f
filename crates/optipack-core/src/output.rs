//! Batch report output in JSON and JSONL.
//!
//! JSON writes the whole [`ArchiveSummary`] as one document. JSONL writes one
//! line per input item, archived or failed, tagged with a `status` field.

use serde::Serialize;
use std::io::{self, Write};

use crate::archive::{ArchiveSummary, EntryRecord, FailedItem};

/// Report format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Single JSON document
    Json,
    /// One JSON object per line (newline-delimited JSON)
    JsonLines,
}

impl ReportFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// One JSONL report line.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum ReportLine<'a> {
    Archived(&'a EntryRecord),
    Failed(&'a FailedItem),
}

/// A writer that serializes batch reports.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: ReportFormat,
    pretty: bool,
    lines_written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// Create a new output writer.
    ///
    /// `pretty` only affects the JSON format.
    pub fn new(writer: W, format: ReportFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            lines_written: 0,
        }
    }

    /// Write the report for one batch.
    pub fn write_summary(&mut self, summary: &ArchiveSummary) -> io::Result<()> {
        match self.format {
            ReportFormat::Json => self.write_json(summary),
            ReportFormat::JsonLines => {
                for entry in &summary.entries {
                    self.write_line(&ReportLine::Archived(entry))?;
                }
                for failure in &summary.failures {
                    self.write_line(&ReportLine::Failed(failure))?;
                }
                Ok(())
            }
        }
    }

    fn write_json<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, item).map_err(io::Error::other)?;
        } else {
            serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        }
        writeln!(self.writer)?;
        self.lines_written += 1;
        Ok(())
    }

    fn write_line<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        // JSONL is never pretty-printed (one object per line)
        serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        writeln!(self.writer)?;
        self.lines_written += 1;
        Ok(())
    }

    /// Number of JSON documents or lines written.
    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Consume the writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
