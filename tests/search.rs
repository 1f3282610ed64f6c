mod common;

use std::sync::Arc;
use std::time::Duration;

use hybrid_finder::checkpoint::MemoryCheckpoint;
use hybrid_finder::fetcher::ResilientFetcher;
use hybrid_finder::progress::{ProgressEvent, RecordingSink};
use hybrid_finder::cancel::CancelFlag;
use hybrid_finder::retry::{RetryPolicy, Sleeper};
use hybrid_finder::search::{SearchConfig, SearchDriver, StopReason};

use common::{MockSra, RecordingSleeper, run};

/// `count` search hits, one per sample; samples for which `hybrid(i)` holds
/// also carry a long-read run.
fn candidates(count: usize, hybrid: impl Fn(usize) -> bool) -> MockSra {
    let mut client = MockSra::new();
    let mut uids = Vec::new();
    for i in 0..count {
        let uid = format!("{}", 1000 + i);
        let sample = format!("SAMN{i:04}");
        let short = run(&format!("SRR{i}0"), &sample, "Illumina MiSeq");
        let mut runs = vec![short.clone()];
        if hybrid(i) {
            runs.push(run(&format!("SRR{i}1"), &sample, "MinION"));
        }
        client = client.with_runs(&uid, vec![short]).with_runs(&sample, runs);
        uids.push(uid);
    }
    client.with_search_results(uids)
}

fn driver(client: MockSra) -> SearchDriver<MockSra> {
    let fetcher = ResilientFetcher::with_sleeper(
        client,
        RetryPolicy::default(),
        Arc::new(RecordingSleeper::default()),
    );
    SearchDriver::new(Arc::new(fetcher))
}

fn config(target: usize, page_size: usize, safety_bound: usize) -> SearchConfig {
    SearchConfig {
        target,
        page_size,
        safety_bound,
        ..SearchConfig::new("query")
    }
}

#[test]
fn stops_once_target_is_reached() {
    let report = driver(candidates(100, |i| i % 2 == 0)).run(&config(3, 10, 1000));

    assert_eq!(report.stop, StopReason::TargetReached);
    assert_eq!(report.hybrids_confirmed, 3);
    assert_eq!(report.candidates_checked, 5);
    assert_eq!(report.pages_fetched, 1);
    let samples: Vec<_> = report.hybrids.iter().map(|h| h.biosample.as_str()).collect();
    assert_eq!(samples, vec!["SAMN0000", "SAMN0002", "SAMN0004"]);
}

#[test]
fn stops_when_results_run_out() {
    let report = driver(candidates(12, |i| i == 7)).run(&config(5, 5, 1000));

    assert_eq!(report.stop, StopReason::Exhausted);
    assert_eq!(report.candidates_checked, 12);
    assert_eq!(report.hybrids_confirmed, 1);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].run_accession, "SRR70");
}

#[test]
fn safety_bound_limits_pages() {
    let client = candidates(500, |_| false);
    let report = driver(client).run(&config(20, 50, 120));

    assert_eq!(report.stop, StopReason::SafetyBound);
    assert!(report.hybrids.is_empty());
    assert!(report.pages_fetched <= 120_usize.div_ceil(50));
    assert_eq!(report.candidates_checked, 150);
}

#[test]
fn failed_search_ends_with_partial_result() {
    let report = driver(MockSra::new().with_failing_search()).run(&config(5, 10, 100));

    assert_eq!(report.stop, StopReason::SearchFailed);
    assert_eq!(report.pages_fetched, 0);
    assert!(report.records.is_empty());
}

#[test]
fn repeated_sample_is_checked_once_and_kept() {
    let sample = "SAMN0001";
    let short = run("SRR10", sample, "Illumina MiSeq");
    let second = run("SRR12", sample, "Illumina MiSeq");
    let long = run("SRR11", sample, "PacBio RS II");
    let client = MockSra::new()
        .with_runs("1", vec![short.clone()])
        .with_runs("2", vec![second.clone()])
        .with_runs(sample, vec![short, second, long])
        .with_search_results(vec!["1".to_string(), "2".to_string()]);
    let progress = Arc::new(RecordingSink::default());
    let checkpoints = Arc::new(MemoryCheckpoint::default());

    let report = driver(client)
        .with_progress(progress.clone())
        .with_checkpoint_sink(checkpoints.clone())
        .run(&config(5, 10, 100));

    assert_eq!(report.candidates_checked, 1);
    assert_eq!(report.records.len(), 2);
    let checked = progress
        .events()
        .into_iter()
        .filter(|event| matches!(event, ProgressEvent::SampleChecked { hybrid: true, .. }))
        .count();
    assert_eq!(checked, 1);
    let last = checkpoints.last().unwrap();
    assert!(last.hybrids.contains_key(sample));
}

/// Raises the cancel flag whenever a retry backs off.
struct CancellingSleeper(CancelFlag);

impl Sleeper for CancellingSleeper {
    fn sleep(&self, _duration: Duration) {
        self.0.cancel();
    }
}

fn cancelling_driver(client: MockSra) -> SearchDriver<MockSra> {
    let cancel = CancelFlag::new();
    let fetcher = ResilientFetcher::with_sleeper(
        client,
        RetryPolicy::default(),
        Arc::new(CancellingSleeper(cancel.clone())),
    );
    SearchDriver::new(Arc::new(fetcher)).with_cancel(cancel)
}

#[test]
fn interrupted_search_page_is_cancelled_not_failed() {
    let report = cancelling_driver(MockSra::new().with_failing_search()).run(&config(5, 10, 100));

    assert_eq!(report.stop, StopReason::Cancelled);
    assert_eq!(report.pages_fetched, 0);
}

#[test]
fn interrupted_sample_check_leaves_sample_unchecked() {
    let client = candidates(3, |_| true).failing("SAMN0001", 5);
    let checkpoints = Arc::new(MemoryCheckpoint::default());

    let report = cancelling_driver(client)
        .with_checkpoint_sink(checkpoints.clone())
        .run(&config(5, 10, 100));

    assert_eq!(report.stop, StopReason::Cancelled);
    assert_eq!(report.candidates_checked, 1);
    assert_eq!(report.hybrids_confirmed, 1);
    let last = checkpoints.last().unwrap();
    assert!(last.processed.contains("SAMN0000"));
    assert!(!last.processed.contains("SAMN0001"));
}
