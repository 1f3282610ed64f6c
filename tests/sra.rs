use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use hybrid_finder::domain::PlatformCategory;
use hybrid_finder::error::HybridError;
use hybrid_finder::grouping::hybrid_samples;
use hybrid_finder::platform::classify;
use hybrid_finder::retry::RateLimiter;
use hybrid_finder::sra::{EntrezHttpClient, SraClient, parse_search_page, parse_summary};

fn fixture() -> Value {
    serde_json::from_str(include_str!("fixtures/esummary_sra.json")).unwrap()
}

#[test]
fn summary_fixture_yields_one_record_per_run() {
    let records = parse_summary(&fixture()).unwrap();
    let runs: Vec<_> = records.iter().map(|r| r.run_accession.as_str()).collect();
    assert_eq!(
        runs,
        vec!["SRR21000001", "SRR21000002", "SRR21000003", "ERR9900001"]
    );

    let first = &records[0];
    assert_eq!(first.sample_accession.as_deref(), Some("SAMN30000017"));
    assert_eq!(first.study_accession.as_deref(), Some("SRP400100"));
    assert_eq!(first.instrument_model.as_deref(), Some("Illumina NovaSeq 6000"));
    assert_eq!(first.organism.as_deref(), Some("Klebsiella pneumoniae"));
    assert_eq!(
        first.environment.as_deref(),
        Some("Hybrid assembly of Klebsiella")
    );

    let last = &records[3];
    assert_eq!(last.sample_accession.as_deref(), Some("ERS9000001"));
    assert_eq!(last.instrument_model.as_deref(), Some("PACBIO_SMRT"));
    assert_eq!(
        classify(last.instrument_model.as_deref()),
        PlatformCategory::Long
    );
}

#[test]
fn summary_fixture_groups_into_one_hybrid() {
    let hybrids = hybrid_samples(parse_summary(&fixture()).unwrap());
    assert_eq!(hybrids.len(), 1);
    assert_eq!(hybrids[0].biosample, "SAMN30000017");
    assert_eq!(hybrids[0].long_reads.len(), 2);
}

#[test]
fn document_without_runs_is_schema_error() {
    let payload = json!({
        "result": { "uids": ["1"], "1": { "expxml": "<Summary/>" } }
    });
    assert_matches!(parse_summary(&payload), Err(HybridError::Schema(_)));
}

#[test]
fn withdrawn_document_is_skipped() {
    let payload = json!({
        "result": {
            "uids": ["1", "2"],
            "1": {
                "expxml": "<Summary><Platform instrument_model=\"MinION\">OXFORD_NANOPORE</Platform></Summary><Sample acc=\"SRS1\" name=\"missing\"/><Biosample>SAMN1</Biosample>",
                "runs": "<Run acc=\"SRR1\"/>"
            },
            "2": { "error": "cannot get document summary" }
        }
    });
    let records = parse_summary(&payload).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].run_accession, "SRR1");
    assert_eq!(records[0].environment, None);
}

#[test]
fn payload_of_only_withdrawn_documents_is_schema_error() {
    let payload = json!({
        "result": {
            "uids": ["1", "2"],
            "1": { "error": "cannot get document summary" },
            "2": { "error": "cannot get document summary" }
        }
    });
    assert_matches!(
        parse_summary(&payload),
        Err(HybridError::Schema(message)) if message.contains("cannot get document summary")
    );
}

#[test]
fn error_payload_is_malformed() {
    let payload = json!({ "error": "API rate limit exceeded" });
    assert_matches!(
        parse_summary(&payload),
        Err(HybridError::MalformedResponse(message)) if message.contains("rate limit")
    );
}

#[test]
fn search_page_reads_string_count() {
    let payload = json!({
        "esearchresult": { "count": "1234", "retmax": "2", "idlist": ["11", "12"] }
    });
    let page = parse_search_page(&payload).unwrap();
    assert_eq!(page.total, 1234);
    assert_eq!(page.ids, vec!["11".to_string(), "12".to_string()]);
}

/// Serves `responses.len()` requests, answering each with the body whose
/// key appears in the request path.
fn serve(responses: Vec<(&'static str, String)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    thread::spawn(move || {
        for _ in 0..responses.len() {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            let payload = responses
                .iter()
                .find(|(key, _)| request_line.contains(key))
                .map(|(_, body)| body.clone())
                .unwrap_or_else(|| "{}".to_string());
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                payload.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
        }
    });
    format!("http://{address}")
}

#[test]
fn http_client_resolves_accessions_then_summarizes() {
    let search = json!({
        "esearchresult": { "count": "3", "idlist": ["27315142", "27315143", "27315144"] }
    });
    let base = serve(vec![
        ("esearch.fcgi", search.to_string()),
        ("esummary.fcgi", fixture().to_string()),
    ]);
    let client = EntrezHttpClient::with_limiter("lab@example.org", None, RateLimiter::unlimited())
        .unwrap()
        .with_base_url(&base);

    let records = client.fetch_runs(&["SRP400100".to_string()]).unwrap();
    assert_eq!(records.len(), 4);
}
