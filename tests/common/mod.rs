#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hybrid_finder::domain::RunRecord;
use hybrid_finder::error::HybridError;
use hybrid_finder::retry::Sleeper;
use hybrid_finder::sra::{SearchPage, SraClient};

pub fn run(run: &str, sample: &str, model: &str) -> RunRecord {
    RunRecord {
        run_accession: run.to_string(),
        sample_accession: Some(sample.to_string()),
        study_accession: Some(format!("SRP-{sample}")),
        instrument_model: Some(model.to_string()),
        platform: None,
        organism: Some("Homo sapiens".to_string()),
        environment: Some("hospital wastewater".to_string()),
    }
}

/// Scripted metadata service keyed by request id.
#[derive(Default)]
pub struct MockSra {
    runs: HashMap<String, Vec<RunRecord>>,
    transient: Mutex<HashMap<String, u32>>,
    always_fail: HashSet<String>,
    schema_errors: HashSet<String>,
    rejected: HashSet<String>,
    search_ids: Vec<String>,
    search_fails: bool,
    fetch_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

impl MockSra {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runs(mut self, id: &str, runs: Vec<RunRecord>) -> Self {
        self.runs.entry(id.to_string()).or_default().extend(runs);
        self
    }

    /// `id` fails with a transport error `times` times, then answers.
    pub fn failing(self, id: &str, times: u32) -> Self {
        self.transient
            .lock()
            .unwrap()
            .insert(id.to_string(), times);
        self
    }

    pub fn always_failing(mut self, id: &str) -> Self {
        self.always_fail.insert(id.to_string());
        self
    }

    /// `id` is refused with a non-retryable client error.
    pub fn rejecting(mut self, id: &str) -> Self {
        self.rejected.insert(id.to_string());
        self
    }

    pub fn with_schema_error(mut self, id: &str) -> Self {
        self.schema_errors.insert(id.to_string());
        self
    }

    pub fn with_search_results(mut self, ids: Vec<String>) -> Self {
        self.search_ids = ids;
        self
    }

    pub fn with_failing_search(mut self) -> Self {
        self.search_fails = true;
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }
}

impl SraClient for MockSra {
    fn fetch_runs(&self, ids: &[String]) -> Result<Vec<RunRecord>, HybridError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        for id in ids {
            if self.always_fail.contains(id) {
                return Err(HybridError::NcbiHttp(format!("connection reset for {id}")));
            }
            if self.rejected.contains(id) {
                return Err(HybridError::NcbiStatus {
                    status: 400,
                    message: format!("bad request for {id}"),
                });
            }
            if self.schema_errors.contains(id) {
                return Err(HybridError::Schema(format!("document {id} has no runs")));
            }
            let mut transient = self.transient.lock().unwrap();
            if let Some(remaining) = transient.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(HybridError::NcbiStatus {
                        status: 503,
                        message: "busy".to_string(),
                    });
                }
            }
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.runs.get(id))
            .flatten()
            .cloned()
            .collect())
    }

    fn search(
        &self,
        _query: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<SearchPage, HybridError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.search_fails {
            return Err(HybridError::NcbiHttp("timed out".to_string()));
        }
        let ids = self
            .search_ids
            .iter()
            .skip(offset)
            .take(page_size)
            .cloned()
            .collect();
        Ok(SearchPage {
            ids,
            total: self.search_ids.len(),
        })
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}
