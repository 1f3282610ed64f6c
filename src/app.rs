use std::sync::Arc;

use tracing::{info, warn};

use crate::batch::plan;
use crate::cancel::CancelFlag;
use crate::checkpoint::{JsonCheckpointFile, ProgressCheckpoint};
use crate::config::ResolvedConfig;
use crate::domain::{Accession, HybridSample};
use crate::error::HybridError;
use crate::fetcher::ResilientFetcher;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::output::JsonOutput;
use crate::progress::{ProgressSink, TracingSink};
use crate::query::build_search_query;
use crate::search::{SearchConfig, SearchDriver, SearchReport};
use crate::sra::SraClient;
use crate::summary::{SummaryRow, summarize};

#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
    pub limit: Option<usize>,
    pub resume: bool,
}

/// Wires configuration, the remote client, and the two discovery pipelines.
pub struct App<C: SraClient + 'static> {
    fetcher: Arc<ResilientFetcher<C>>,
    config: ResolvedConfig,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
}

impl<C: SraClient + 'static> App<C> {
    pub fn new(client: C, config: ResolvedConfig) -> Self {
        let fetcher = Arc::new(ResilientFetcher::new(client, config.retry));
        Self::with_fetcher(fetcher, config)
    }

    pub fn with_fetcher(fetcher: Arc<ResilientFetcher<C>>, config: ResolvedConfig) -> Self {
        Self {
            fetcher,
            config,
            progress: Arc::new(TracingSink),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Runs the bulk pipeline over `accessions` and writes the hybrid set to
    /// the configured output path.
    pub fn discover(
        &self,
        accessions: &[Accession],
        options: &DiscoverOptions,
    ) -> Result<RunReport, HybridError> {
        let mut ids: Vec<String> = accessions.iter().map(|acc| acc.to_string()).collect();
        if let Some(limit) = options.limit {
            info!("limiting to first {limit} accessions");
            ids.truncate(limit);
        }
        let batches = plan(&ids, self.config.batch_size);

        let checkpoint_file = JsonCheckpointFile::new(self.config.checkpoint_path.clone());
        let initial = if options.resume {
            checkpoint_file.load()?.unwrap_or_default()
        } else {
            ProgressCheckpoint::new()
        };

        let report = Orchestrator::new(Arc::clone(&self.fetcher), self.config.orchestrator)
            .with_checkpoint_sink(Arc::new(checkpoint_file))
            .with_progress(Arc::clone(&self.progress))
            .with_cancel(self.cancel.clone())
            .resume(&batches, initial);

        JsonOutput::write_hybrids(&self.config.output_path, &report.hybrids())?;
        info!("results saved to {}", self.config.output_path);
        Ok(report)
    }

    /// Runs the incremental search and writes the qualifying run records to
    /// the configured output path.
    pub fn search(&self) -> Result<SearchReport, HybridError> {
        let search = SearchConfig {
            query: build_search_query(&self.config.filters),
            target: self.config.target,
            page_size: self.config.page_size,
            safety_bound: self.config.safety_bound,
        };
        let checkpoint_file = JsonCheckpointFile::new(self.config.search_checkpoint_path.clone());
        let report = SearchDriver::new(Arc::clone(&self.fetcher))
            .with_checkpoint_sink(Arc::new(checkpoint_file))
            .with_progress(Arc::clone(&self.progress))
            .with_cancel(self.cancel.clone())
            .run(&search);

        JsonOutput::write_records(&self.config.output_path, &report.records)?;
        info!("results saved to {}", self.config.output_path);
        Ok(report)
    }

    /// Re-fetches the runs of every hybrid sample and condenses them into
    /// one summary row per sample. Lost batches are logged and skipped.
    pub fn summarize(&self, hybrids: &[HybridSample]) -> Vec<SummaryRow> {
        let mut samples: Vec<&str> = hybrids.iter().map(|h| h.biosample.as_str()).collect();
        samples.sort_unstable();
        samples.dedup();
        info!("found {} unique biosamples", samples.len());

        let batches = plan(&samples, self.config.batch_size);
        let mut records = Vec::new();
        for batch in &batches {
            if self.cancel.is_cancelled() {
                warn!("interrupted; summarizing what was fetched");
                break;
            }
            info!(
                "processing batch {}/{} ({} samples)",
                batch.index + 1,
                batches.len(),
                batch.len()
            );
            let fetched = self.fetcher.fetch_until(batch, &self.cancel);
            if fetched.is_interrupted() {
                warn!("interrupted; summarizing what was fetched");
                break;
            }
            if let Some(err) = fetched.error {
                warn!("{err}; skipping");
                continue;
            }
            records.extend(fetched.records);
        }
        summarize(hybrids, &records)
    }
}
