use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::batch::Batch;
use crate::domain::HybridSample;
use crate::error::HybridError;

/// Accumulated discovery progress: hybrid verdicts so far and the input
/// identifiers whose batches completed.
///
/// Only successfully fetched batches are recorded as processed, so a lost
/// batch is attempted again when a run resumes from this checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressCheckpoint {
    #[serde(default)]
    pub hybrids: BTreeMap<String, HybridSample>,
    #[serde(default)]
    pub processed: BTreeSet<String>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl ProgressCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hybrids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hybrids.is_empty()
    }

    pub fn record_batch(&mut self, batch: &Batch, hybrids: Vec<HybridSample>) {
        self.record_hybrids(hybrids);
        self.processed.extend(batch.items.iter().cloned());
    }

    pub fn record_hybrids(&mut self, hybrids: Vec<HybridSample>) {
        for sample in hybrids {
            match self.hybrids.get_mut(&sample.biosample) {
                Some(existing) => existing.absorb(sample),
                None => {
                    self.hybrids.insert(sample.biosample.clone(), sample);
                }
            }
        }
    }

    /// Folds a previously saved checkpoint into this one.
    pub fn merge(&mut self, other: ProgressCheckpoint) {
        self.record_hybrids(other.hybrids.into_values().collect());
        self.processed.extend(other.processed);
        self.saved_at = match (self.saved_at, other.saved_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn is_processed(&self, batch: &Batch) -> bool {
        batch.items.iter().all(|item| self.processed.contains(item))
    }

    /// Batches not yet covered by this checkpoint, in their original order.
    pub fn pending(&self, batches: &[Batch]) -> Vec<Batch> {
        batches
            .iter()
            .filter(|batch| !self.is_processed(batch))
            .cloned()
            .collect()
    }

    /// Hybrid samples ordered by sample id.
    pub fn hybrids(&self) -> Vec<HybridSample> {
        self.hybrids.values().cloned().collect()
    }
}

/// Durable destination for checkpoint snapshots.
pub trait CheckpointSink: Send + Sync {
    fn persist(&self, checkpoint: &ProgressCheckpoint) -> Result<(), HybridError>;
}

/// A JSON checkpoint file replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct JsonCheckpointFile {
    path: Utf8PathBuf,
}

impl JsonCheckpointFile {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<ProgressCheckpoint>, HybridError> {
        if !self.path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(self.path.as_std_path())
            .map_err(|err| HybridError::Filesystem(format!("read {}: {err}", self.path)))?;
        let checkpoint = serde_json::from_str(&content)
            .map_err(|err| HybridError::Filesystem(format!("parse {}: {err}", self.path)))?;
        Ok(Some(checkpoint))
    }
}

impl CheckpointSink for JsonCheckpointFile {
    fn persist(&self, checkpoint: &ProgressCheckpoint) -> Result<(), HybridError> {
        let mut snapshot = checkpoint.clone();
        snapshot.saved_at = Some(Utc::now());
        write_json_atomic(&self.path, &snapshot)
    }
}

/// Keeps every persisted snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryCheckpoint {
    snapshots: Mutex<Vec<ProgressCheckpoint>>,
}

impl MemoryCheckpoint {
    pub fn snapshots(&self) -> Vec<ProgressCheckpoint> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<ProgressCheckpoint> {
        self.snapshots().pop()
    }
}

impl CheckpointSink for MemoryCheckpoint {
    fn persist(&self, checkpoint: &ProgressCheckpoint) -> Result<(), HybridError> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(checkpoint.clone());
        Ok(())
    }
}

/// Writes pretty JSON to a temporary file beside `path`, then renames it
/// over `path`. A crash mid-write leaves the previous file intact.
pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), HybridError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| HybridError::Filesystem(err.to_string()))?;
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| HybridError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".hybrid-finder")
        .suffix(".tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HybridError::Filesystem(err.to_string()))?;
    temp.write_all(&content)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|err| HybridError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| HybridError::Filesystem(err.to_string()))?;
    Ok(())
}
