//! Bulk discovery: fans batches out to a pool of worker threads and folds
//! their verdicts into a single checkpoint owned by the calling thread.
//!
//! Workers pull from a shared queue, fetch and group their batch, and send
//! the outcome over a channel. Only the calling thread touches the
//! checkpoint, so merges never interleave and checkpoint writes are
//! serialized without stalling the workers.

use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::batch::Batch;
use crate::cancel::CancelFlag;
use crate::checkpoint::{CheckpointSink, ProgressCheckpoint};
use crate::domain::HybridSample;
use crate::error::FetchError;
use crate::fetcher::ResilientFetcher;
use crate::grouping::hybrid_samples;
use crate::progress::{ProgressEvent, ProgressSink, TracingSink};
use crate::sra::SraClient;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_CHECKPOINT_EVERY: usize = 5;
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub workers: usize,
    pub checkpoint_every: usize,
    pub grace_period: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub checkpoint: ProgressCheckpoint,
    pub batches_total: usize,
    pub batches_completed: usize,
    pub batches_skipped: usize,
    pub failures: Vec<FetchError>,
    /// Batches whose retries were cut short by cancellation. They are left
    /// out of the checkpoint so a resumed run fetches them again.
    pub batches_interrupted: usize,
    pub cancelled: bool,
}

impl RunReport {
    pub fn hybrids(&self) -> Vec<HybridSample> {
        self.checkpoint.hybrids()
    }

    pub fn batches_failed(&self) -> usize {
        self.failures.len()
    }
}

enum BatchOutcome {
    Done {
        batch: Batch,
        hybrids: Vec<HybridSample>,
    },
    Lost {
        error: FetchError,
    },
    Interrupted {
        batch: Batch,
    },
}

pub struct Orchestrator<C: SraClient + 'static> {
    fetcher: Arc<ResilientFetcher<C>>,
    config: OrchestratorConfig,
    checkpoint_sink: Option<Arc<dyn CheckpointSink>>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
}

impl<C: SraClient + 'static> Orchestrator<C> {
    pub fn new(fetcher: Arc<ResilientFetcher<C>>, config: OrchestratorConfig) -> Self {
        Self {
            fetcher,
            config,
            checkpoint_sink: None,
            progress: Arc::new(TracingSink),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_checkpoint_sink(mut self, sink: Arc<dyn CheckpointSink>) -> Self {
        self.checkpoint_sink = Some(sink);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn run(&self, batches: &[Batch]) -> RunReport {
        self.resume(batches, ProgressCheckpoint::new())
    }

    /// Processes the batches `checkpoint` does not already cover and merges
    /// the new verdicts into it.
    pub fn resume(&self, batches: &[Batch], mut checkpoint: ProgressCheckpoint) -> RunReport {
        let pending = checkpoint.pending(batches);
        let batches_total = batches.len();
        let batches_skipped = batches_total - pending.len();
        if batches_skipped > 0 {
            info!("resuming: {batches_skipped} of {batches_total} batches already processed");
        }

        let worker_count = self.config.workers.max(1).min(pending.len().max(1));
        let checkpoint_every = self.config.checkpoint_every.max(1);
        info!(
            "processing {} batches using {worker_count} workers",
            pending.len()
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(pending)));
        let (tx, rx) = mpsc::channel::<BatchOutcome>();
        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let fetcher = Arc::clone(&self.fetcher);
            let cancel = self.cancel.clone();
            let tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("hybrid-worker-{id}"))
                .spawn(move || work(&fetcher, &queue, &tx, &cancel));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => error!("failed to spawn worker {id}: {err}"),
            }
        }
        drop(tx);

        let mut batches_completed = batches_skipped;
        let mut failures = Vec::new();
        let mut batches_interrupted = 0usize;
        let mut since_checkpoint = 0usize;
        let mut deadline: Option<Instant> = None;
        let mut abandoned = false;

        loop {
            if deadline.is_none() && self.cancel.is_cancelled() {
                warn!(
                    "interrupt requested; waiting up to {:?} for in-flight batches",
                    self.config.grace_period
                );
                deadline = Some(Instant::now() + self.config.grace_period);
            }
            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        warn!("grace period elapsed; abandoning in-flight batches");
                        abandoned = true;
                        break;
                    }
                    remaining.min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };

            let outcome = match rx.recv_timeout(wait) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match outcome {
                BatchOutcome::Done { batch, hybrids } => {
                    checkpoint.record_batch(&batch, hybrids);
                    batches_completed += 1;
                    self.progress.event(ProgressEvent::BatchDone {
                        index: batch.index,
                        completed: batches_completed + failures.len(),
                        total: batches_total,
                        hybrids: checkpoint.len(),
                    });
                }
                BatchOutcome::Lost { error } => {
                    self.progress.event(ProgressEvent::BatchFailed {
                        index: error.batch_index,
                        leading: error.leading.clone(),
                        message: error.message.clone(),
                    });
                    failures.push(error);
                }
                BatchOutcome::Interrupted { batch } => {
                    batches_interrupted += 1;
                    self.progress
                        .event(ProgressEvent::BatchInterrupted { index: batch.index });
                    continue;
                }
            }

            since_checkpoint += 1;
            if since_checkpoint >= checkpoint_every {
                self.write_checkpoint(&checkpoint);
                since_checkpoint = 0;
            }
        }

        if abandoned {
            // Stragglers finish on their own; their sends fail once `rx` drops.
            drop(handles);
        } else {
            for handle in handles {
                if handle.join().is_err() {
                    error!("worker thread panicked");
                }
            }
        }

        self.write_checkpoint(&checkpoint);

        let cancelled = self.cancel.is_cancelled();
        let finished = batches_completed - batches_skipped + failures.len();
        if finished > 0 && failures.len() == finished {
            warn!("all {finished} batches failed; an empty result reflects remote failure");
        }
        info!(
            "finished: {} hybrid samples, {} batches failed",
            checkpoint.len(),
            failures.len()
        );

        RunReport {
            checkpoint,
            batches_total,
            batches_completed,
            batches_skipped,
            failures,
            batches_interrupted,
            cancelled,
        }
    }

    fn write_checkpoint(&self, checkpoint: &ProgressCheckpoint) {
        let Some(sink) = &self.checkpoint_sink else {
            return;
        };
        match sink.persist(checkpoint) {
            Ok(()) => self.progress.event(ProgressEvent::CheckpointWritten {
                hybrids: checkpoint.len(),
            }),
            Err(err) => self.progress.event(ProgressEvent::CheckpointFailed {
                message: err.to_string(),
            }),
        }
    }
}

fn work<C: SraClient>(
    fetcher: &ResilientFetcher<C>,
    queue: &Mutex<VecDeque<Batch>>,
    tx: &Sender<BatchOutcome>,
    cancel: &CancelFlag,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let next = queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        let Some(batch) = next else {
            break;
        };

        let fetched = fetcher.fetch_until(&batch, cancel);
        let outcome = if fetched.is_interrupted() {
            BatchOutcome::Interrupted { batch }
        } else {
            match fetched.error {
                Some(error) => BatchOutcome::Lost { error },
                None => BatchOutcome::Done {
                    hybrids: hybrid_samples(fetched.records),
                    batch,
                },
            }
        };
        if tx.send(outcome).is_err() {
            break;
        }
    }
}
