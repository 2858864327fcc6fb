//! Destinations for similarity records.

use super::record::{RecordLayout, SimilarityRecord};
use crate::error::Result;
use parking_lot::Mutex;
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A writable store for similarity records.
///
/// Called concurrently by every worker, so implementations synchronize
/// internally.
pub trait Sink: Send + Sync {
    /// Make sure the store accepts records shaped like `layout`.
    ///
    /// Called once before any record is written. An error here aborts the run.
    fn ensure_schema(&self, _layout: &RecordLayout) -> Result<()> {
        Ok(())
    }

    /// Persist one record.
    fn write(&self, record: &SimilarityRecord, layout: &RecordLayout) -> Result<()>;

    /// Push buffered records to durable storage.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SimilarityRecord>>,
    mapping: Mutex<Option<Value>>,
    writes: AtomicUsize,
    flushes: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record written so far, in arrival order.
    pub fn records(&self) -> Vec<SimilarityRecord> {
        self.records.lock().clone()
    }

    /// Number of `write` calls received.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Acquire)
    }

    /// Mapping received through [`Sink::ensure_schema`].
    pub fn mapping(&self) -> Option<Value> {
        self.mapping.lock().clone()
    }
}

impl Sink for MemorySink {
    fn ensure_schema(&self, layout: &RecordLayout) -> Result<()> {
        *self.mapping.lock() = Some(layout.mapping());
        Ok(())
    }

    fn write(&self, record: &SimilarityRecord, _layout: &RecordLayout) -> Result<()> {
        self.writes.fetch_add(1, Ordering::AcqRel);
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Writes each record as one line of JSON.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<BufWriter<W>>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(BufWriter::new(out)),
        }
    }
}

impl JsonLinesSink<File> {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write + Send> Sink for JsonLinesSink<W> {
    fn write(&self, record: &SimilarityRecord, layout: &RecordLayout) -> Result<()> {
        let doc = record.to_json(layout);
        let mut out = self.out.lock();
        serde_json::to_writer(&mut *out, &doc)?;
        out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.out.lock().flush()?;
        Ok(())
    }
}
