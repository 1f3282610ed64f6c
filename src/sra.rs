use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{RunRecord, is_placeholder};
use crate::error::HybridError;
use crate::retry::RateLimiter;

pub const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const INTERVAL_WITHOUT_KEY: Duration = Duration::from_millis(340);
pub const INTERVAL_WITH_KEY: Duration = Duration::from_millis(100);

const SUMMARY_CHUNK: usize = 200;
const ESEARCH_PAGE: usize = 10_000;

static PLATFORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<Platform\s+instrument_model="([^"]*)"\s*>([^<]*)</Platform>"#).unwrap()
});
static PLATFORM_SIMPLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<Platform>([^<]+)</Platform>").unwrap());
static STUDY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<Study\s+acc="([^"]+)""#).unwrap());
static SAMPLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<Sample\s+acc="([^"]+)""#).unwrap());
static BIOSAMPLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Biosample>\s*([^<\s]+)\s*</Biosample>").unwrap());
static ORGANISM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<Organism\b[^>]*\bScientificName="([^"]*)""#).unwrap());
static SAMPLE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<Sample\b[^>]*\bname="([^"]*)""#).unwrap());
static STUDY_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<Study\b[^>]*\bname="([^"]*)""#).unwrap());
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Title>([^<]*)</Title>").unwrap());
static RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"<Run\s+acc="([^"]+)""#).unwrap());

/// One page of a remote search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPage {
    pub ids: Vec<String>,
    pub total: usize,
}

/// The remote SRA metadata service.
pub trait SraClient: Send + Sync {
    /// Run-level metadata for every run reachable from `ids` (accessions of
    /// any level, or numeric SRA UIDs), fetched as one logical request.
    fn fetch_runs(&self, ids: &[String]) -> Result<Vec<RunRecord>, HybridError>;

    fn search(
        &self,
        query: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<SearchPage, HybridError>;
}

#[derive(Clone)]
pub struct EntrezHttpClient {
    client: Client,
    base_url: String,
    email: String,
    api_key: Option<String>,
    limiter: RateLimiter,
}

impl EntrezHttpClient {
    pub fn new(email: &str, api_key: Option<&str>) -> Result<Self, HybridError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);
        let interval = if api_key.is_some() {
            INTERVAL_WITH_KEY
        } else {
            INTERVAL_WITHOUT_KEY
        };
        Self::with_limiter(email, api_key, RateLimiter::new(interval))
    }

    pub fn with_limiter(
        email: &str,
        api_key: Option<String>,
        limiter: RateLimiter,
    ) -> Result<Self, HybridError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("hybrid-finder/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| HybridError::NcbiHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| HybridError::NcbiHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: EUTILS_BASE.to_string(),
            email: email.to_string(),
            api_key,
            limiter,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn call(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, HybridError> {
        let mut form: Vec<(&str, String)> = params.to_vec();
        form.push(("tool", "hybrid-finder".to_string()));
        form.push(("email", self.email.clone()));
        if let Some(key) = &self.api_key {
            form.push(("api_key", key.clone()));
        }
        let url = format!("{}/{endpoint}", self.base_url);

        self.limiter.acquire();
        debug!(endpoint, "entrez request");
        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .map_err(|err| HybridError::NcbiHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCBI request failed".to_string());
            return Err(HybridError::NcbiStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| HybridError::NcbiHttp(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| HybridError::MalformedResponse(err.to_string()))
    }

    fn esearch(
        &self,
        term: &str,
        retmax: usize,
        retstart: usize,
    ) -> Result<SearchPage, HybridError> {
        let payload = self.call(
            "esearch.fcgi",
            &[
                ("db", "sra".to_string()),
                ("term", term.to_string()),
                ("retmax", retmax.to_string()),
                ("retstart", retstart.to_string()),
                ("retmode", "json".to_string()),
            ],
        )?;
        parse_search_page(&payload)
    }

    fn resolve_uids(&self, accessions: &[String]) -> Result<Vec<String>, HybridError> {
        let term = accessions.join(" OR ");
        let mut uids = Vec::new();
        let mut offset = 0usize;
        loop {
            let page = self.esearch(&term, ESEARCH_PAGE, offset)?;
            let received = page.ids.len();
            uids.extend(page.ids);
            offset += received;
            if received == 0 || offset >= page.total {
                break;
            }
        }
        Ok(uids)
    }

    fn esummary(&self, uids: &[String]) -> Result<Vec<RunRecord>, HybridError> {
        let payload = self.call(
            "esummary.fcgi",
            &[
                ("db", "sra".to_string()),
                ("id", uids.join(",")),
                ("retmode", "json".to_string()),
            ],
        )?;
        parse_summary(&payload)
    }
}

impl SraClient for EntrezHttpClient {
    fn fetch_runs(&self, ids: &[String]) -> Result<Vec<RunRecord>, HybridError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let uids = if ids.iter().all(|id| is_uid(id)) {
            ids.to_vec()
        } else {
            self.resolve_uids(ids)?
        };
        let mut records = Vec::new();
        let mut unusable = None;
        let mut usable_chunks = 0usize;
        for chunk in uids.chunks(SUMMARY_CHUNK) {
            match self.esummary(chunk) {
                Ok(chunk_records) => {
                    usable_chunks += 1;
                    records.extend(chunk_records);
                }
                Err(HybridError::Schema(message)) => {
                    warn!("skipping summary chunk of {} uids: {message}", chunk.len());
                    unusable = Some(message);
                }
                Err(err) => return Err(err),
            }
        }
        match unusable {
            Some(message) if usable_chunks == 0 => Err(HybridError::Schema(message)),
            _ => Ok(records),
        }
    }

    fn search(
        &self,
        query: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<SearchPage, HybridError> {
        self.esearch(query, page_size, offset)
    }
}

fn is_uid(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|ch| ch.is_ascii_digit())
}

pub fn parse_search_page(payload: &Value) -> Result<SearchPage, HybridError> {
    let result = payload
        .get("esearchresult")
        .ok_or_else(|| HybridError::MalformedResponse("missing esearchresult".to_string()))?;
    if let Some(message) = result.get("ERROR").and_then(Value::as_str) {
        return Err(HybridError::MalformedResponse(message.to_string()));
    }
    let ids = result["idlist"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    let total = match &result["count"] {
        Value::String(count) => count
            .parse()
            .map_err(|_| HybridError::MalformedResponse(format!("invalid count {count}")))?,
        Value::Number(count) => count.as_u64().unwrap_or(0) as usize,
        _ => 0,
    };
    Ok(SearchPage { ids, total })
}

/// Extracts run records from an SRA `esummary` JSON payload.
///
/// Documents without `expxml` or `runs` (suppressed or withdrawn UIDs) are
/// skipped. The payload is a schema error only when no document is usable.
pub fn parse_summary(payload: &Value) -> Result<Vec<RunRecord>, HybridError> {
    if let Some(message) = payload.get("error").and_then(Value::as_str) {
        return Err(HybridError::MalformedResponse(message.to_string()));
    }
    let result = payload
        .get("result")
        .ok_or_else(|| HybridError::MalformedResponse("missing result".to_string()))?;
    let Some(uids) = result["uids"].as_array() else {
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    let mut usable = 0usize;
    let mut last_problem = None;
    for uid in uids.iter().filter_map(Value::as_str) {
        let document = &result[uid];
        let fields = document["expxml"].as_str().zip(document["runs"].as_str());
        let Some((expxml, runs)) = fields else {
            let reason = document["error"].as_str().unwrap_or("missing expxml or runs");
            warn!(uid, "skipping summary document: {reason}");
            last_problem = Some(format!("document {uid}: {reason}"));
            continue;
        };
        usable += 1;
        records.extend(parse_experiment(expxml, runs));
    }
    match last_problem {
        Some(problem) if usable == 0 => Err(HybridError::Schema(problem)),
        _ => Ok(records),
    }
}

fn parse_experiment(expxml: &str, runs: &str) -> Vec<RunRecord> {
    let (instrument_model, platform) = match PLATFORM_RE.captures(expxml) {
        Some(caps) => (non_empty(&caps[1]), non_empty(&caps[2])),
        None => (
            None,
            PLATFORM_SIMPLE_RE
                .captures(expxml)
                .and_then(|caps| non_empty(&caps[1])),
        ),
    };
    let instrument_model = instrument_model.or_else(|| platform.clone());
    let study_accession = first_capture(&STUDY_RE, expxml);
    let sample_accession =
        first_capture(&BIOSAMPLE_RE, expxml).or_else(|| first_capture(&SAMPLE_RE, expxml));
    let organism = first_capture(&ORGANISM_RE, expxml).filter(|value| !is_placeholder(value));
    let environment = [&*SAMPLE_NAME_RE, &*STUDY_NAME_RE, &*TITLE_RE]
        .into_iter()
        .filter_map(|re| first_capture(re, expxml))
        .find(|value| !is_placeholder(value));

    RUN_RE
        .captures_iter(runs)
        .map(|caps| RunRecord {
            run_accession: caps[1].to_string(),
            sample_accession: sample_accession.clone(),
            study_accession: study_accession.clone(),
            instrument_model: instrument_model.clone(),
            platform: platform.clone(),
            organism: organism.clone(),
            environment: environment.clone(),
        })
        .collect()
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).and_then(|caps| non_empty(&caps[1]))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
