use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HybridError;

const ACCESSION_PREFIXES: &[(&str, AccessionKind)] = &[
    ("PRJNA", AccessionKind::BioProject),
    ("PRJEB", AccessionKind::BioProject),
    ("PRJDB", AccessionKind::BioProject),
    ("SAMN", AccessionKind::BioSample),
    ("SAME", AccessionKind::BioSample),
    ("SAMD", AccessionKind::BioSample),
    ("SRR", AccessionKind::Run),
    ("ERR", AccessionKind::Run),
    ("DRR", AccessionKind::Run),
    ("SRX", AccessionKind::Experiment),
    ("ERX", AccessionKind::Experiment),
    ("DRX", AccessionKind::Experiment),
    ("SRS", AccessionKind::Sample),
    ("ERS", AccessionKind::Sample),
    ("DRS", AccessionKind::Sample),
    ("SRP", AccessionKind::Study),
    ("ERP", AccessionKind::Study),
    ("DRP", AccessionKind::Study),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessionKind {
    Run,
    Experiment,
    Sample,
    BioSample,
    Study,
    BioProject,
}

impl fmt::Display for AccessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessionKind::Run => "run",
            AccessionKind::Experiment => "experiment",
            AccessionKind::Sample => "sample",
            AccessionKind::BioSample => "biosample",
            AccessionKind::Study => "study",
            AccessionKind::BioProject => "bioproject",
        };
        f.write_str(name)
    }
}

/// An SRA, BioSample or BioProject accession, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> AccessionKind {
        ACCESSION_PREFIXES
            .iter()
            .find(|(prefix, _)| self.0.starts_with(prefix))
            .map(|(_, kind)| *kind)
            .unwrap_or(AccessionKind::Study)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = HybridError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let digits = ACCESSION_PREFIXES
            .iter()
            .find_map(|(prefix, _)| normalized.strip_prefix(prefix));
        let is_valid = digits
            .map(|rest| !rest.is_empty() && rest.chars().all(|ch| ch.is_ascii_digit()))
            .unwrap_or(false);
        if !is_valid {
            return Err(HybridError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlatformCategory {
    Short,
    Long,
    Other,
}

impl fmt::Display for PlatformCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformCategory::Short => write!(f, "SHORT"),
            PlatformCategory::Long => write!(f, "LONG"),
            PlatformCategory::Other => write!(f, "OTHER"),
        }
    }
}

/// One sequencing run as reported by the metadata service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_accession: String,
    pub sample_accession: Option<String>,
    pub study_accession: Option<String>,
    pub instrument_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organism: Option<String>,
    /// Free-text sampling context: sample name, study name or experiment title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// Values submitters use in place of real metadata.
const PLACEHOLDERS: &[&str] = &["", "nan", "none", "missing", "not applicable", "n/a"];

/// Whether a metadata value is empty or a known filler such as `missing`.
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    PLACEHOLDERS.contains(&value.as_str())
}

impl RunRecord {
    /// The grouping key, or `None` for absent and `N/A` placeholders.
    pub fn sample_key(&self) -> Option<&str> {
        self.sample_accession
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("N/A"))
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_accession: self.run_accession.clone(),
            instrument_model: self.instrument_model.clone(),
            study_accession: self.study_accession.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_accession: String,
    pub instrument_model: Option<String>,
    pub study_accession: Option<String>,
}

/// A sample with at least one short-read run and one long-read run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridSample {
    pub biosample: String,
    pub short_reads: Vec<RunSummary>,
    pub long_reads: Vec<RunSummary>,
    pub study_accessions: BTreeSet<String>,
}

impl HybridSample {
    /// Folds another verdict for the same sample into this one.
    ///
    /// Runs are unioned by accession and kept sorted, so absorbing the
    /// same verdict twice leaves the sample unchanged.
    pub fn absorb(&mut self, other: HybridSample) {
        union_runs(&mut self.short_reads, other.short_reads);
        union_runs(&mut self.long_reads, other.long_reads);
        self.study_accessions.extend(other.study_accessions);
    }
}

fn union_runs(target: &mut Vec<RunSummary>, incoming: Vec<RunSummary>) {
    for run in incoming {
        if !target
            .iter()
            .any(|existing| existing.run_accession == run.run_accession)
        {
            target.push(run);
        }
    }
    target.sort();
}
