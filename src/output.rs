//! Output sinks: where emitted documents go.
//!
//! Sinks write documents in the order `emit` is called. Any write failure is
//! returned to the caller, which aborts the run.
//!
//! `emit` is synchronous and runs on the scheduler loop. Stream sinks buffer
//! [`OUTPUT_BUFFER_SIZE`] bytes, so the loop only waits on the disk or a pipe
//! once per buffer rather than once per document.

use crate::document::Document;
use crate::error::Result;
use crate::format::Format;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufWriter, Stdout, Write};
use std::path::Path;

/// Bytes buffered in front of a file or stdout
pub const OUTPUT_BUFFER_SIZE: usize = 256 * 1024;

/// Destination for emitted documents
pub trait OutputSink: Send {
    /// Append one document
    fn emit(&mut self, doc: &Document) -> Result<()>;

    /// Flush buffered output; called once after the last document
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

enum Destination {
    Stdout(BufWriter<Stdout>),
    File(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Writer(Box<dyn Write + Send>),
}

impl Destination {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Destination::Stdout(w) => w,
            Destination::File(w) => w,
            Destination::Gzip(w) => w,
            Destination::Writer(w) => w,
        }
    }
}

/// Serializes documents in one [`Format`] to a byte stream
pub struct StreamSink {
    format: Format,
    destination: Destination,
}

impl StreamSink {
    /// Write to standard output
    pub fn stdout(format: Format) -> Self {
        Self {
            format,
            destination: Destination::Stdout(BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, std::io::stdout())),
        }
    }

    /// Create (or truncate) a file; a `.gz` name is gzip-compressed
    pub fn create(path: &Path, format: Format) -> Result<Self> {
        let file = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, File::create(path)?);
        let gzip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
        let destination = if gzip {
            Destination::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            Destination::File(file)
        };
        Ok(Self {
            format,
            destination,
        })
    }

    /// Write to any stream
    pub fn from_writer(writer: Box<dyn Write + Send>, format: Format) -> Self {
        Self {
            format,
            destination: Destination::Writer(writer),
        }
    }

    /// Format in use
    pub fn format(&self) -> Format {
        self.format
    }
}

impl OutputSink for StreamSink {
    fn emit(&mut self, doc: &Document) -> Result<()> {
        self.format.write(doc, self.destination.writer())?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match &mut self.destination {
            Destination::Gzip(encoder) => {
                encoder.try_finish()?;
                encoder.get_mut().flush()?;
            }
            other => other.writer().flush()?,
        }
        Ok(())
    }
}

/// Open the sink for an optional output path
///
/// Without a path output goes to stdout. The format is `format` when given,
/// otherwise detected from the file name, otherwise N-Quads.
pub fn open_output(path: Option<&Path>, format: Option<Format>) -> Result<StreamSink> {
    match path {
        None => Ok(StreamSink::stdout(format.unwrap_or_default())),
        Some(path) => {
            let detected = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(Format::from_file_name);
            StreamSink::create(path, format.or(detected).unwrap_or_default())
        }
    }
}

/// Keeps emitted documents in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Documents in emission order
    pub documents: Vec<Document>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// URIs of the collected documents
    pub fn uris(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.uri.as_str()).collect()
    }
}

impl OutputSink for MemorySink {
    fn emit(&mut self, doc: &Document) -> Result<()> {
        self.documents.push(doc.clone());
        Ok(())
    }
}
