use crate::domain::PlatformCategory;

pub const LONG_READ_KEYWORDS: &[&str] = &[
    "NANOPORE",
    "MINION",
    "GRIDION",
    "PROMETHION",
    "PACBIO",
    "SEQUEL",
];

pub const SHORT_READ_KEYWORDS: &[&str] = &[
    "ILLUMINA",
    "HISEQ",
    "MISEQ",
    "NEXTSEQ",
    "NOVASEQ",
    "ION TORRENT",
    "BGISEQ",
    "DNBSEQ",
    "SOLID",
    "454",
    "AB 5500",
    "HELIOS",
];

/// Maps free-text instrument model names onto a platform category.
///
/// Matching is a case-insensitive substring test. Long-read keywords are
/// tested first, so a model naming both families is `Long`.
pub fn classify(instrument_model: Option<&str>) -> PlatformCategory {
    let Some(model) = instrument_model else {
        return PlatformCategory::Other;
    };
    let model = model.trim();
    if model.is_empty() {
        return PlatformCategory::Other;
    }
    let model = model.to_uppercase();

    if LONG_READ_KEYWORDS.iter().any(|kw| model.contains(kw)) {
        return PlatformCategory::Long;
    }
    if SHORT_READ_KEYWORDS.iter().any(|kw| model.contains(kw)) {
        return PlatformCategory::Short;
    }
    PlatformCategory::Other
}
