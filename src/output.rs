use std::fs;
use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::checkpoint::write_json_atomic;
use crate::domain::{HybridSample, RunRecord};
use crate::error::HybridError;
use crate::orchestrator::RunReport;
use crate::search::SearchReport;
use crate::summary::{SummaryRow, write_tsv};

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverSummary {
    pub hybrid_samples: usize,
    pub batches_total: usize,
    pub batches_completed: usize,
    pub batches_skipped: usize,
    pub batches_failed: usize,
    pub batches_interrupted: usize,
    pub cancelled: bool,
}

impl From<&RunReport> for DiscoverSummary {
    fn from(report: &RunReport) -> Self {
        Self {
            hybrid_samples: report.checkpoint.len(),
            batches_total: report.batches_total,
            batches_completed: report.batches_completed,
            batches_skipped: report.batches_skipped,
            batches_failed: report.batches_failed(),
            batches_interrupted: report.batches_interrupted,
            cancelled: report.cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchSummary {
    pub candidates_checked: usize,
    pub hybrids_confirmed: usize,
    pub pages_fetched: usize,
    pub stop: String,
}

impl From<&SearchReport> for SearchSummary {
    fn from(report: &SearchReport) -> Self {
        Self {
            candidates_checked: report.candidates_checked,
            hybrids_confirmed: report.hybrids_confirmed,
            pages_fetched: report.pages_fetched,
            stop: report.stop.to_string(),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_discover(report: &RunReport) -> io::Result<()> {
        Self::print_json(&DiscoverSummary::from(report))
    }

    pub fn print_search(report: &SearchReport) -> io::Result<()> {
        Self::print_json(&SearchSummary::from(report))
    }

    pub fn write_hybrids(path: &Utf8Path, hybrids: &[HybridSample]) -> Result<(), HybridError> {
        write_json_atomic(path, &hybrids)
    }

    pub fn write_records(path: &Utf8Path, records: &[RunRecord]) -> Result<(), HybridError> {
        write_json_atomic(path, &records)
    }

    pub fn read_hybrids(path: &Utf8Path) -> Result<Vec<HybridSample>, HybridError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| HybridError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content)
            .map_err(|err| HybridError::Filesystem(format!("parse {path}: {err}")))
    }

    pub fn write_summary(path: Option<&Utf8Path>, rows: &[SummaryRow]) -> Result<(), HybridError> {
        let mut buffer = Vec::new();
        write_tsv(rows, &mut buffer).map_err(|err| HybridError::Filesystem(err.to_string()))?;
        match path {
            Some(path) => fs::write(path.as_std_path(), &buffer)
                .map_err(|err| HybridError::Filesystem(format!("write {path}: {err}"))),
            None => io::stdout()
                .write_all(&buffer)
                .map_err(|err| HybridError::Filesystem(err.to_string())),
        }
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
