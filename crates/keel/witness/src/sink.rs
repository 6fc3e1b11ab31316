//! Destinations that mirror witness records as they are appended.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use keel_canon::canonical_json;

use crate::error::WitnessError;
use crate::record::WitnessRecord;

/// Receives every witness record the kernel emits.
///
/// A failing sink is a fault; callers propagate it rather than dropping
/// evidence.
pub trait TraceSink: Send + Sync {
    fn record(&self, record: &WitnessRecord) -> Result<(), WitnessError>;

    /// Record a whole run. Sinks that can should land all records or none.
    fn record_all(&self, records: &[WitnessRecord]) -> Result<(), WitnessError> {
        records.iter().try_for_each(|r| self.record(r))
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record(&self, _record: &WitnessRecord) -> Result<(), WitnessError> {
        Ok(())
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<WitnessRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<WitnessRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TraceSink for MemorySink {
    fn record(&self, record: &WitnessRecord) -> Result<(), WitnessError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| WitnessError::SinkUnavailable("memory sink lock poisoned".into()))?;
        guard.push(record.clone());
        Ok(())
    }

    fn record_all(&self, records: &[WitnessRecord]) -> Result<(), WitnessError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| WitnessError::SinkUnavailable("memory sink lock poisoned".into()))?;
        guard.extend_from_slice(records);
        Ok(())
    }
}

/// Appends one canonical JSON witness per line.
#[derive(Debug)]
pub struct JsonlFileSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JsonlFileSink {
    /// Append pre-encoded lines with a single write.
    fn append(&self, text: &str) -> Result<(), WitnessError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| WitnessError::SinkUnavailable(self.path.display().to_string()))?;

        let write_err = |source| WitnessError::SinkWrite {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(text.as_bytes()).map_err(write_err)?;
        Ok(())
    }
}

impl TraceSink for JsonlFileSink {
    fn record(&self, record: &WitnessRecord) -> Result<(), WitnessError> {
        self.record_all(std::slice::from_ref(record))
    }

    /// Every record is encoded before anything is written, so an encoding
    /// failure leaves the file untouched.
    fn record_all(&self, records: &[WitnessRecord]) -> Result<(), WitnessError> {
        let mut text = String::new();
        for record in records {
            text.push_str(&canonical_json(record)?);
            text.push('\n');
        }
        if text.is_empty() {
            return Ok(());
        }
        self.append(&text)
    }
}
