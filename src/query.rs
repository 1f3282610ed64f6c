use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

const SHORT_PLATFORMS: &str = r#"("ILLUMINA"[Platform] OR "BGISEQ"[Platform])"#;
const LONG_PLATFORMS: &str = r#"("OXFORD_NANOPORE"[Platform] OR "PACBIO_SMRT"[Platform])"#;

/// Which platform families the search term asks the remote index for.
///
/// A single SRA run carries one platform, so no term can require both;
/// the bias only shapes which candidates come back first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformBias {
    #[default]
    Balanced,
    LongRead,
    ShortRead,
    None,
}

impl fmt::Display for PlatformBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformBias::Balanced => write!(f, "balanced"),
            PlatformBias::LongRead => write!(f, "long-read"),
            PlatformBias::ShortRead => write!(f, "short-read"),
            PlatformBias::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub pathogens: Vec<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub bias: PlatformBias,
}

pub fn build_search_query(filters: &SearchFilters) -> String {
    let mut parts = vec!["metagenome[All Fields]".to_string()];

    if let Some(environment) = non_blank(filters.environment.as_deref()) {
        parts.push(format!(
            r#"("{environment}"[Source] OR "{environment}"[All Fields])"#
        ));
    }

    let pathogens: Vec<String> = filters
        .pathogens
        .iter()
        .filter_map(|p| non_blank(Some(p)))
        .map(|p| format!(r#""{p}"[All Fields]"#))
        .collect();
    if !pathogens.is_empty() {
        parts.push(format!("({})", pathogens.join(" OR ")));
    }

    if let Some(host) = non_blank(filters.host.as_deref()) {
        parts.push(format!(r#""{host}"[Organism]"#));
    }

    match filters.bias {
        PlatformBias::Balanced => parts.push(format!("({SHORT_PLATFORMS} OR {LONG_PLATFORMS})")),
        PlatformBias::LongRead => parts.push(LONG_PLATFORMS.to_string()),
        PlatformBias::ShortRead => parts.push(SHORT_PLATFORMS.to_string()),
        PlatformBias::None => {}
    }

    parts.join(" AND ")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
