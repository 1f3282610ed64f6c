mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use hybrid_finder::batch::Batch;
use hybrid_finder::cancel::CancelFlag;
use hybrid_finder::error::HybridError;
use hybrid_finder::fetcher::ResilientFetcher;
use hybrid_finder::retry::{RetryPolicy, Sleeper};

use common::{MockSra, RecordingSleeper, run};

fn fetcher(client: MockSra) -> (ResilientFetcher<MockSra>, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let fetcher = ResilientFetcher::with_sleeper(client, RetryPolicy::default(), sleeper.clone());
    (fetcher, sleeper)
}

fn batch(ids: &[&str]) -> Batch {
    Batch::new(0, ids.iter().map(|id| id.to_string()).collect())
}

#[test]
fn recovers_after_two_transient_failures() {
    let client = MockSra::new()
        .with_runs("SRP1", vec![run("SRR1", "SAMN1", "Illumina NovaSeq 6000")])
        .failing("SRP1", 2);
    let (fetcher, sleeper) = fetcher(client);

    let fetched = fetcher.fetch(&batch(&["SRP1"]));

    assert!(!fetched.is_lost());
    assert_eq!(fetched.records.len(), 1);
    assert_eq!(fetcher.client().fetch_calls(), 3);
    assert_eq!(
        sleeper.slept(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
}

#[test]
fn exhausted_batch_is_lost_with_leading_ids() {
    let client = MockSra::new().always_failing("SRP1");
    let (fetcher, sleeper) = fetcher(client);

    let fetched = fetcher.fetch(&batch(&["SRP1", "SRP2", "SRP3", "SRP4"]));

    assert!(fetched.records.is_empty());
    let error = fetched.error.unwrap();
    assert_eq!(error.attempts, 3);
    assert_eq!(error.leading, vec!["SRP1", "SRP2", "SRP3"]);
    assert!(error.to_string().contains("after 3 attempts"));
    assert_eq!(fetcher.client().fetch_calls(), 3);
    assert_eq!(sleeper.slept().len(), 2);
}

#[test]
fn schema_error_yields_empty_result_without_retry() {
    let client = MockSra::new().with_schema_error("SRP1");
    let (fetcher, sleeper) = fetcher(client);

    let fetched = fetcher.fetch(&batch(&["SRP1"]));

    assert!(fetched.records.is_empty());
    assert!(fetched.error.is_none());
    assert_eq!(fetcher.client().fetch_calls(), 1);
    assert!(sleeper.slept().is_empty());
}

/// Raises the cancel flag the first time a retry backs off.
struct CancellingSleeper(CancelFlag);

impl Sleeper for CancellingSleeper {
    fn sleep(&self, _duration: Duration) {
        self.0.cancel();
    }
}

#[test]
fn cancelled_fetch_is_interrupted_not_lost() {
    let client = MockSra::new().always_failing("SRP1");
    let (fetcher, sleeper) = fetcher(client);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let fetched = fetcher.fetch_until(&batch(&["SRP1"]), &cancel);

    assert!(fetched.is_interrupted());
    assert!(!fetched.is_lost());
    assert!(fetched.records.is_empty());
    assert_eq!(fetcher.client().fetch_calls(), 1);
    assert!(sleeper.slept().is_empty());
}

#[test]
fn cancel_during_backoff_interrupts_remaining_attempts() {
    let cancel = CancelFlag::new();
    let fetcher = ResilientFetcher::with_sleeper(
        MockSra::new().always_failing("SRP1"),
        RetryPolicy::default(),
        Arc::new(CancellingSleeper(cancel.clone())),
    );

    let fetched = fetcher.fetch_until(&batch(&["SRP1"]), &cancel);

    assert!(fetched.is_interrupted());
    assert_eq!(fetched.error, None);
    assert_eq!(fetcher.client().fetch_calls(), 1);
}

#[test]
fn rejected_batch_is_lost_even_when_cancelled() {
    let client = MockSra::new().rejecting("SRP1");
    let (fetcher, _) = fetcher(client);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let fetched = fetcher.fetch_until(&batch(&["SRP1"]), &cancel);

    assert!(!fetched.is_interrupted());
    assert_eq!(fetched.error.map(|err| err.attempts), Some(1));
}

#[test]
fn cancelled_search_page_is_interrupted() {
    let client = MockSra::new().with_failing_search();
    let (fetcher, _) = fetcher(client);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let result = fetcher.search_page("query", 50, 0, &cancel);

    assert_matches!(result, Err(HybridError::Interrupted));
    assert_eq!(fetcher.client().search_calls(), 1);
}

#[test]
fn failed_search_page_surfaces_error() {
    let client = MockSra::new().with_failing_search();
    let (fetcher, _) = fetcher(client);

    let result = fetcher.search_page("query", 50, 0, &CancelFlag::new());

    assert_matches!(result, Err(HybridError::NcbiHttp(_)));
    assert_eq!(fetcher.client().search_calls(), 3);
}
