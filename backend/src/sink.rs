//! Destinations for assembled records
//!
//! `write` overwrites an existing record with the same identifier. Writes of
//! different identifiers may happen from several threads at once.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::assembler::SegmentRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write record '{identifier}': {source}")]
    Io {
        identifier: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize record '{identifier}': {source}")]
    Serialize {
        identifier: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid record identifier: '{0}'")]
    InvalidIdentifier(String),
}

pub trait SegmentSink: Send + Sync {
    fn write(&self, identifier: &str, record: &SegmentRecord) -> Result<(), SinkError>;
}

/// Writes each record as `<dir>/<identifier>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    dir: PathBuf,
}

impl JsonDirSink {
    pub fn new(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(JsonDirSink { dir: dir.to_path_buf() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("{}.json", identifier))
    }
}

impl SegmentSink for JsonDirSink {
    fn write(&self, identifier: &str, record: &SegmentRecord) -> Result<(), SinkError> {
        if identifier.is_empty() || identifier.contains(['/', '\\']) || identifier == "." || identifier == ".." {
            return Err(SinkError::InvalidIdentifier(identifier.to_string()));
        }

        let json = serde_json::to_string_pretty(record)
            .map_err(|source| SinkError::Serialize { identifier: identifier.to_string(), source })?;

        fs::write(self.record_path(identifier), json)
            .map_err(|source| SinkError::Io { identifier: identifier.to_string(), source })
    }
}

/// Keeps records in memory, ordered by identifier.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<BTreeMap<String, SegmentRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn get(&self, identifier: &str) -> Option<SegmentRecord> {
        self.records.lock().get(identifier).cloned()
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.records.lock().keys().cloned().collect()
    }

    pub fn records(&self) -> Vec<(String, SegmentRecord)> {
        self.records.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl SegmentSink for MemorySink {
    fn write(&self, identifier: &str, record: &SegmentRecord) -> Result<(), SinkError> {
        self.records.lock().insert(identifier.to_string(), record.clone());
        Ok(())
    }
}
