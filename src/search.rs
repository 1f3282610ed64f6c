use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::batch::Batch;
use crate::cancel::CancelFlag;
use crate::checkpoint::{CheckpointSink, ProgressCheckpoint};
use crate::domain::{HybridSample, RunRecord};
use crate::error::HybridError;
use crate::fetcher::ResilientFetcher;
use crate::grouping::group;
use crate::progress::{ProgressEvent, ProgressSink, TracingSink};
use crate::sra::SraClient;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_SAFETY_BOUND: usize = 1000;
pub const DEFAULT_TARGET: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub query: String,
    pub target: usize,
    pub page_size: usize,
    pub safety_bound: usize,
}

impl SearchConfig {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            target: DEFAULT_TARGET,
            page_size: DEFAULT_PAGE_SIZE,
            safety_bound: DEFAULT_SAFETY_BOUND,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    Exhausted,
    SafetyBound,
    SearchFailed,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::TargetReached => "target reached",
            StopReason::Exhausted => "search results exhausted",
            StopReason::SafetyBound => "safety bound reached",
            StopReason::SearchFailed => "search request failed",
            StopReason::Cancelled => "interrupted",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchState {
    Searching,
    Checking { page: Vec<RunRecord>, total: usize },
    Done(StopReason),
}

/// Best-effort result of an incremental search; may under-report when the
/// safety bound stops the search first.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub records: Vec<RunRecord>,
    pub hybrids: Vec<HybridSample>,
    pub candidates_checked: usize,
    pub hybrids_confirmed: usize,
    pub pages_fetched: usize,
    pub stop: StopReason,
}

/// Pages through a remote search, checking each newly seen sample until
/// enough hybrids are confirmed or a bound is hit.
///
/// Single-threaded: the next page is requested only after every candidate
/// on the current page has been checked.
pub struct SearchDriver<C: SraClient> {
    fetcher: Arc<ResilientFetcher<C>>,
    checkpoint_sink: Option<Arc<dyn CheckpointSink>>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
}

struct Session {
    offset: usize,
    pages_fetched: usize,
    checked: HashSet<String>,
    confirmed: BTreeMap<String, HybridSample>,
    records: Vec<RunRecord>,
}

impl<C: SraClient> SearchDriver<C> {
    pub fn new(fetcher: Arc<ResilientFetcher<C>>) -> Self {
        Self {
            fetcher,
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

    pub fn run(&self, config: &SearchConfig) -> SearchReport {
        let page_size = config.page_size.max(1);
        info!("searching: {}", config.query);

        let mut session = Session {
            offset: 0,
            pages_fetched: 0,
            checked: HashSet::new(),
            confirmed: BTreeMap::new(),
            records: Vec::new(),
        };
        let mut state = SearchState::Searching;

        let stop = loop {
            state = match state {
                SearchState::Searching => self.search(config, page_size, &mut session),
                SearchState::Checking { page, total } => {
                    self.check_page(config, page, &mut session);
                    session.offset += page_size;
                    self.next_after_page(config, total, &session)
                }
                SearchState::Done(reason) => break reason,
            };
        };

        self.persist(&session);
        info!(
            "found {} hybrid samples after checking {} candidates ({stop})",
            session.confirmed.len(),
            session.checked.len()
        );

        SearchReport {
            hybrids_confirmed: session.confirmed.len(),
            candidates_checked: session.checked.len(),
            pages_fetched: session.pages_fetched,
            hybrids: session.confirmed.into_values().collect(),
            records: session.records,
            stop,
        }
    }

    fn search(
        &self,
        config: &SearchConfig,
        page_size: usize,
        session: &mut Session,
    ) -> SearchState {
        if session.confirmed.len() >= config.target {
            return SearchState::Done(StopReason::TargetReached);
        }
        if session.offset >= config.safety_bound {
            return SearchState::Done(StopReason::SafetyBound);
        }
        if self.cancel.is_cancelled() {
            return SearchState::Done(StopReason::Cancelled);
        }

        let page = match self.fetcher.search_page(
            &config.query,
            page_size,
            session.offset,
            &self.cancel,
        ) {
            Ok(page) => page,
            Err(HybridError::Interrupted) => {
                info!("search at offset {} interrupted", session.offset);
                return SearchState::Done(StopReason::Cancelled);
            }
            Err(err) => {
                error!("search at offset {} failed: {err}", session.offset);
                return SearchState::Done(StopReason::SearchFailed);
            }
        };
        session.pages_fetched += 1;
        self.progress.event(ProgressEvent::PageFetched {
            offset: session.offset,
            candidates: page.ids.len(),
            total: page.total,
        });
        if page.ids.is_empty() {
            return SearchState::Done(StopReason::Exhausted);
        }

        let batch = Batch::new(session.pages_fetched - 1, page.ids);
        let fetched = self.fetcher.fetch_until(&batch, &self.cancel);
        if fetched.is_interrupted() {
            return SearchState::Done(StopReason::Cancelled);
        }
        if let Some(err) = &fetched.error {
            warn!("dropping candidates of search page at {}: {err}", session.offset);
        }
        SearchState::Checking {
            page: fetched.records,
            total: page.total,
        }
    }

    fn check_page(&self, config: &SearchConfig, page: Vec<RunRecord>, session: &mut Session) {
        for record in page {
            if session.confirmed.len() >= config.target || self.cancel.is_cancelled() {
                break;
            }
            let Some(sample) = record.sample_key().map(str::to_string) else {
                continue;
            };
            if session.checked.contains(&sample) {
                if session.confirmed.contains_key(&sample) {
                    session.records.push(record);
                }
                continue;
            }

            info!("checking sample {sample}...");
            let Ok(verdict) = self.check_sample(&sample, session.checked.len() + 1) else {
                info!("check of sample {sample} interrupted");
                break;
            };
            session.checked.insert(sample.clone());
            self.progress.event(ProgressEvent::SampleChecked {
                sample: sample.clone(),
                hybrid: verdict.is_some(),
            });
            if let Some(hybrid) = verdict {
                session.confirmed.insert(sample, hybrid);
                session.records.push(record);
            }
            self.persist(session);
        }
    }

    /// The hybrid verdict for one sample, or `Interrupted` when cancellation
    /// cut its fetch short and the sample must stay unchecked.
    fn check_sample(
        &self,
        sample: &str,
        index: usize,
    ) -> Result<Option<HybridSample>, HybridError> {
        let batch = Batch::new(index, vec![sample.to_string()]);
        let fetched = self.fetcher.fetch_until(&batch, &self.cancel);
        if fetched.is_interrupted() {
            return Err(HybridError::Interrupted);
        }
        if let Some(err) = &fetched.error {
            warn!("could not check sample {sample}: {err}");
            return Ok(None);
        }
        Ok(group(fetched.records)
            .remove(sample)
            .and_then(|group| group.to_hybrid()))
    }

    fn next_after_page(
        &self,
        config: &SearchConfig,
        total: usize,
        session: &Session,
    ) -> SearchState {
        if session.confirmed.len() >= config.target {
            SearchState::Done(StopReason::TargetReached)
        } else if self.cancel.is_cancelled() {
            SearchState::Done(StopReason::Cancelled)
        } else if session.offset >= total {
            SearchState::Done(StopReason::Exhausted)
        } else if session.offset >= config.safety_bound {
            SearchState::Done(StopReason::SafetyBound)
        } else {
            SearchState::Searching
        }
    }

    fn persist(&self, session: &Session) {
        let Some(sink) = &self.checkpoint_sink else {
            return;
        };
        let checkpoint = ProgressCheckpoint {
            hybrids: session.confirmed.clone(),
            processed: session.checked.iter().cloned().collect(),
            saved_at: None,
        };
        match sink.persist(&checkpoint) {
            Ok(()) => self.progress.event(ProgressEvent::CheckpointWritten {
                hybrids: checkpoint.len(),
            }),
            Err(err) => self.progress.event(ProgressEvent::CheckpointFailed {
                message: err.to_string(),
            }),
        }
    }
}
