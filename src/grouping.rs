use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{HybridSample, PlatformCategory, RunRecord};
use crate::platform::classify;

/// All runs sharing one sample identifier, split by platform category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGroup {
    pub sample: String,
    pub short: Vec<RunRecord>,
    pub long: Vec<RunRecord>,
    pub other: Vec<RunRecord>,
}

impl SampleGroup {
    pub fn new(sample: &str) -> Self {
        Self {
            sample: sample.to_string(),
            short: Vec::new(),
            long: Vec::new(),
            other: Vec::new(),
        }
    }

    pub fn push(&mut self, record: RunRecord) {
        match classify(record.instrument_model.as_deref()) {
            PlatformCategory::Short => self.short.push(record),
            PlatformCategory::Long => self.long.push(record),
            PlatformCategory::Other => self.other.push(record),
        }
    }

    pub fn is_hybrid(&self) -> bool {
        !self.short.is_empty() && !self.long.is_empty()
    }

    pub fn len(&self) -> usize {
        self.short.len() + self.long.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn runs(&self) -> impl Iterator<Item = &RunRecord> {
        self.short.iter().chain(&self.long).chain(&self.other)
    }

    /// Studies referencing this sample through a short- or long-read run.
    pub fn study_accessions(&self) -> BTreeSet<String> {
        self.short
            .iter()
            .chain(&self.long)
            .filter_map(|run| run.study_accession.clone())
            .collect()
    }

    pub fn to_hybrid(&self) -> Option<HybridSample> {
        if !self.is_hybrid() {
            return None;
        }
        let mut short_reads: Vec<_> = self.short.iter().map(RunRecord::summary).collect();
        let mut long_reads: Vec<_> = self.long.iter().map(RunRecord::summary).collect();
        short_reads.sort();
        short_reads.dedup_by(|a, b| a.run_accession == b.run_accession);
        long_reads.sort();
        long_reads.dedup_by(|a, b| a.run_accession == b.run_accession);
        Some(HybridSample {
            biosample: self.sample.clone(),
            short_reads,
            long_reads,
            study_accessions: self.study_accessions(),
        })
    }
}

/// Groups records by sample; records without a usable sample id are dropped.
pub fn group<I>(records: I) -> BTreeMap<String, SampleGroup>
where
    I: IntoIterator<Item = RunRecord>,
{
    let mut groups: BTreeMap<String, SampleGroup> = BTreeMap::new();
    for record in records {
        let Some(key) = record.sample_key().map(str::to_string) else {
            continue;
        };
        groups
            .entry(key)
            .or_insert_with_key(|key| SampleGroup::new(key))
            .push(record);
    }
    groups
}

pub fn hybrid_samples<I>(records: I) -> Vec<HybridSample>
where
    I: IntoIterator<Item = RunRecord>,
{
    group(records)
        .values()
        .filter_map(SampleGroup::to_hybrid)
        .collect()
}
