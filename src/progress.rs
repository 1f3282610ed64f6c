use std::sync::Mutex;

use tracing::{debug, error, info};

/// Structured progress notifications from the discovery pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    BatchDone {
        index: usize,
        completed: usize,
        total: usize,
        hybrids: usize,
    },
    BatchFailed {
        index: usize,
        leading: Vec<String>,
        message: String,
    },
    BatchInterrupted {
        index: usize,
    },
    CheckpointWritten {
        hybrids: usize,
    },
    CheckpointFailed {
        message: String,
    },
    PageFetched {
        offset: usize,
        candidates: usize,
        total: usize,
    },
    SampleChecked {
        sample: String,
        hybrid: bool,
    },
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards events to `tracing`.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::BatchDone {
                index,
                completed,
                total,
                hybrids,
            } => info!(
                batch = index,
                "processed {completed}/{total} batches, {hybrids} hybrid samples so far"
            ),
            ProgressEvent::BatchFailed {
                index,
                leading,
                message,
            } => error!(
                batch = index,
                "failed to process batch {leading:?}...: {message}"
            ),
            ProgressEvent::BatchInterrupted { index } => {
                info!(batch = index, "batch interrupted; left for a resumed run")
            }
            ProgressEvent::CheckpointWritten { hybrids } => {
                debug!("checkpoint saved with {hybrids} hybrid samples")
            }
            ProgressEvent::CheckpointFailed { message } => {
                error!("error saving checkpoint: {message}")
            }
            ProgressEvent::PageFetched {
                offset,
                candidates,
                total,
            } => info!("search page at {offset}: {candidates} candidates of {total}"),
            ProgressEvent::SampleChecked { sample, hybrid } => {
                if hybrid {
                    info!("sample {sample}: hybrid");
                } else {
                    info!("sample {sample}: not hybrid");
                }
            }
        }
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
