use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use serde::Serialize;

use crate::domain::{HybridSample, RunRecord, is_placeholder};

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub biosample: String,
    pub sample_type: String,
    pub environment: String,
    pub instruments: String,
    pub studies: String,
}

/// One row per distinct hybrid sample, enriched from the run records
/// fetched for it. Sample type and environment take the first value that
/// is not a placeholder. Instruments come from the records when any were
/// fetched, otherwise from the verdict's own run summaries.
pub fn summarize(hybrids: &[HybridSample], records: &[RunRecord]) -> Vec<SummaryRow> {
    let mut by_sample: BTreeMap<&str, Vec<&RunRecord>> = BTreeMap::new();
    for record in records {
        if let Some(key) = record.sample_key() {
            by_sample.entry(key).or_default().push(record);
        }
    }

    let mut seen = BTreeSet::new();
    let mut rows = Vec::new();
    for hybrid in hybrids {
        if !seen.insert(hybrid.biosample.as_str()) {
            continue;
        }
        let runs = by_sample
            .get(hybrid.biosample.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let sample_type = first_value(runs, |run| run.organism.as_deref());
        let environment = first_value(runs, |run| run.environment.as_deref());

        let mut instruments: BTreeSet<String> = runs
            .iter()
            .filter_map(|run| run.instrument_model.clone())
            .collect();
        if instruments.is_empty() {
            instruments = hybrid
                .short_reads
                .iter()
                .chain(&hybrid.long_reads)
                .filter_map(|run| run.instrument_model.clone())
                .collect();
        }

        rows.push(SummaryRow {
            biosample: hybrid.biosample.clone(),
            sample_type,
            environment,
            instruments: join_or_na(instruments),
            studies: join_or_na(hybrid.study_accessions.iter().cloned().collect()),
        });
    }
    rows
}

fn first_value(runs: &[&RunRecord], field: impl Fn(&RunRecord) -> Option<&str>) -> String {
    runs.iter()
        .filter_map(|run| field(run))
        .find(|value| !is_placeholder(value))
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn join_or_na(values: BTreeSet<String>) -> String {
    if values.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        values.into_iter().collect::<Vec<_>>().join(", ")
    }
}

pub fn write_tsv<W: Write>(rows: &[SummaryRow], mut out: W) -> io::Result<()> {
    writeln!(
        out,
        "BioSample ID\tSample Type\tEnvironment\tInstruments\tStudies"
    )?;
    for row in rows {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            clean(&row.biosample),
            clean(&row.sample_type),
            clean(&row.environment),
            clean(&row.instruments),
            clean(&row.studies)
        )?;
    }
    Ok(())
}

fn clean(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}
