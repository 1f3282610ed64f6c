use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::Accession;
use crate::error::HybridError;

/// Reads the accessions to scan from `path`.
///
/// Accepts a JSON array (optionally gzipped) of objects carrying
/// `study_accession`, a JSON array of strings, or plain text with one
/// accession per line. Duplicates are dropped keeping first-seen order.
pub fn load_accessions(path: &Path) -> Result<Vec<Accession>, HybridError> {
    info!("loading accessions from {}", path.display());
    let text = read_text(path)?;
    let trimmed = text.trim_start();
    let raw = if trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed).map_err(|err| HybridError::InputRead {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        json_accessions(&value)
    } else {
        text_accessions(&text)
    };

    let mut seen = HashSet::new();
    let mut accessions = Vec::new();
    for item in raw {
        match item.parse::<Accession>() {
            Ok(acc) => {
                if seen.insert(acc.clone()) {
                    accessions.push(acc);
                }
            }
            Err(err) => warn!("skipping input entry: {err}"),
        }
    }
    info!("found {} unique accessions", accessions.len());
    Ok(accessions)
}

fn read_text(path: &Path) -> Result<String, HybridError> {
    let to_error = |err: std::io::Error| HybridError::InputRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    };
    let file = File::open(path).map_err(to_error)?;
    let gzipped = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    let mut text = String::new();
    if gzipped {
        GzDecoder::new(file).read_to_string(&mut text).map_err(to_error)?;
    } else {
        let mut file = file;
        file.read_to_string(&mut text).map_err(to_error)?;
    }
    Ok(text)
}

fn json_accessions(value: &Value) -> Vec<String> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(acc) => Some(acc.clone()),
            Value::Object(_) => entry["study_accession"].as_str().map(str::to_string),
            _ => None,
        })
        .collect()
}

fn text_accessions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
