use std::sync::Arc;

use tracing::{debug, warn};

use crate::batch::Batch;
use crate::cancel::CancelFlag;
use crate::domain::RunRecord;
use crate::error::{FetchError, HybridError};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::sra::{SearchPage, SraClient};

const LEADING_IDS: usize = 3;

/// Records fetched for one batch, plus the failure that emptied it, if any.
///
/// A batch whose retries were cut short by cancellation is `interrupted`:
/// it has no records and no error, and stays pending for a resumed run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchFetch {
    pub records: Vec<RunRecord>,
    pub error: Option<FetchError>,
    pub interrupted: bool,
}

impl BatchFetch {
    fn found(records: Vec<RunRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    fn lost(error: FetchError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    fn interrupted() -> Self {
        Self {
            interrupted: true,
            ..Self::default()
        }
    }

    pub fn is_lost(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }
}

enum Attempt<T> {
    Succeeded(T),
    Unusable(String),
    Interrupted { attempts: u32 },
    Exhausted { attempts: u32, error: HybridError },
}

/// Wraps an [`SraClient`] with retry and linear backoff.
pub struct ResilientFetcher<C: SraClient> {
    client: C,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<C: SraClient> ResilientFetcher<C> {
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        Self::with_sleeper(client, policy, Arc::new(ThreadSleeper))
    }

    pub fn with_sleeper(client: C, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            client,
            policy,
            sleeper,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn fetch(&self, batch: &Batch) -> BatchFetch {
        self.fetch_until(batch, &CancelFlag::new())
    }

    /// Like [`fetch`](Self::fetch), but stops retrying once `cancel` is
    /// raised. A batch cut short that way is interrupted, not lost.
    pub fn fetch_until(&self, batch: &Batch, cancel: &CancelFlag) -> BatchFetch {
        let label = format!("batch {}", batch.index);
        match self.attempt(&label, cancel, || self.client.fetch_runs(&batch.items)) {
            Attempt::Succeeded(records) => {
                debug!(batch = batch.index, records = records.len(), "batch fetched");
                BatchFetch::found(records)
            }
            Attempt::Unusable(message) => {
                warn!(
                    batch = batch.index,
                    "skipping batch {:?}...: {message}",
                    batch.leading(LEADING_IDS)
                );
                BatchFetch::found(Vec::new())
            }
            Attempt::Interrupted { attempts } => {
                debug!(batch = batch.index, attempts, "batch interrupted by cancel");
                BatchFetch::interrupted()
            }
            Attempt::Exhausted { attempts, error } => BatchFetch::lost(FetchError {
                batch_index: batch.index,
                leading: batch.leading(LEADING_IDS),
                attempts,
                message: error.to_string(),
            }),
        }
    }

    /// One page of a remote search, retried like a batch.
    pub fn search_page(
        &self,
        query: &str,
        page_size: usize,
        offset: usize,
        cancel: &CancelFlag,
    ) -> Result<SearchPage, HybridError> {
        let label = format!("search page at {offset}");
        match self.attempt(&label, cancel, || {
            self.client.search(query, page_size, offset)
        }) {
            Attempt::Succeeded(page) => Ok(page),
            Attempt::Unusable(message) => Err(HybridError::Schema(message)),
            Attempt::Interrupted { .. } => Err(HybridError::Interrupted),
            Attempt::Exhausted { error, .. } => Err(error),
        }
    }

    fn attempt<T, F>(&self, label: &str, cancel: &CancelFlag, mut call: F) -> Attempt<T>
    where
        F: FnMut() -> Result<T, HybridError>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let error = match call() {
                Ok(value) => return Attempt::Succeeded(value),
                Err(HybridError::Schema(message)) => return Attempt::Unusable(message),
                Err(error) => error,
            };
            if !error.is_transient() {
                return Attempt::Exhausted {
                    attempts: attempt,
                    error,
                };
            }
            if cancel.is_cancelled() {
                return Attempt::Interrupted { attempts: attempt };
            }
            let Some(delay) = self.policy.delay_after(attempt) else {
                return Attempt::Exhausted {
                    attempts: attempt,
                    error,
                };
            };
            warn!(
                "{label}: attempt {attempt} failed: {error}; retrying in {}s",
                delay.as_secs()
            );
            self.sleeper.sleep(delay);
            if cancel.is_cancelled() {
                return Attempt::Interrupted { attempts: attempt };
            }
        }
    }
}
