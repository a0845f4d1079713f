// tests/batch_tracker.rs

use std::sync::Arc;
use std::time::Duration;

use flowtrigger::batch::{BatchTracker, Task};
use flowtrigger::errors::FlowtriggerError;
use flowtrigger::types::{StatusSnapshot, TaskResult};
use flowtrigger_test_utils::fake_client::FakeComputeClient;
use flowtrigger_test_utils::{init_tracing, with_timeout};

fn tasks(n: usize) -> Vec<Task> {
    (1..=n)
        .map(|i| Task::new(format!("t{i}"), "fit", vec![i.to_string()]))
        .collect()
}

fn tracker(client: &Arc<FakeComputeClient>) -> BatchTracker {
    BatchTracker::new(client.clone(), Duration::from_secs(30))
}

#[tokio::test(start_paused = true)]
async fn all_zero_batch_returns_every_result() {
    init_tracing();
    let client = Arc::new(FakeComputeClient::new());

    let results = tracker(&client).run_batch("local", tasks(4)).await.unwrap();

    assert_eq!(results.len(), 4);
    assert!(results.values().all(|r| r.terminal && r.status_code == 0));
    assert_eq!(results["t3"].stdout, "t3 ok");
    assert_eq!(client.submissions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn one_failure_fails_the_batch_with_its_output() {
    init_tracing();
    let client = Arc::new(FakeComputeClient::new());
    client.fail_task("t2", 3, "partial fit", "segfault in minimizer");

    let err = tracker(&client).run_batch("local", tasks(5)).await.unwrap_err();

    match err {
        FlowtriggerError::TaskFailed {
            task,
            status_code,
            stdout,
            stderr,
            others,
            ..
        } => {
            assert_eq!(task, "t2");
            assert_eq!(status_code, 3);
            assert_eq!(stdout, "partial fit");
            assert_eq!(stderr, "segfault in minimizer");
            assert_eq!(others, 0);
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn polling_waits_for_the_last_terminal_marker() {
    init_tracing();
    let client = Arc::new(FakeComputeClient::new());

    let running: StatusSnapshot = [
        ("t1".to_string(), TaskResult::completed(0, "", "")),
        ("t2".to_string(), TaskResult::pending()),
        ("t3".to_string(), TaskResult::completed(0, "", "")),
    ]
    .into_iter()
    .collect();
    client.push_status(running.clone());
    client.push_status(running);

    let tracker = tracker(&client);
    let handle = tracker.submit_batch("local", tasks(3)).await.unwrap();
    let started = tokio::time::Instant::now();
    let snapshot = with_timeout(Duration::from_secs(600), tracker.poll_until_complete(&handle)).await.unwrap();

    assert_eq!(client.status_calls(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(60));
    assert!(snapshot.values().all(|r| r.terminal));
    assert_eq!(client.released(), vec![handle.batch_id.clone()]);
}

#[tokio::test(start_paused = true)]
async fn failed_batch_is_still_released() {
    init_tracing();
    let client = Arc::new(FakeComputeClient::new());
    client.fail_task("t1", 2, "", "boom");

    let err = tracker(&client).run_batch("local", tasks(2)).await.unwrap_err();

    assert!(matches!(err, FlowtriggerError::TaskFailed { .. }), "{err:?}");
    assert_eq!(client.released().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_tasks_keep_polling() {
    init_tracing();
    let client = Arc::new(FakeComputeClient::new());
    // The service has not registered t2 yet.
    client.push_status(
        [("t1".to_string(), TaskResult::completed(0, "", ""))]
            .into_iter()
            .collect(),
    );

    let results = tracker(&client).run_batch("local", tasks(2)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(client.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn empty_result_set_is_a_failure() {
    init_tracing();
    let client = Arc::new(FakeComputeClient::new());
    client.push_status(StatusSnapshot::new());

    let err = tracker(&client).run_batch("local", tasks(2)).await.unwrap_err();
    assert!(matches!(err, FlowtriggerError::EmptyResults { .. }));
}

#[tokio::test(start_paused = true)]
async fn empty_batch_is_rejected_before_submission() {
    let client = Arc::new(FakeComputeClient::new());

    let err = tracker(&client).run_batch("local", Vec::new()).await.unwrap_err();
    assert!(matches!(err, FlowtriggerError::Submission(_)));
    assert!(client.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn submission_error_propagates() {
    let client = Arc::new(FakeComputeClient::new());
    client.reject_submissions();

    let err = tracker(&client).run_batch("local", tasks(1)).await.unwrap_err();
    assert!(matches!(err, FlowtriggerError::Submission(_)));
    assert_eq!(client.status_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn run_single_returns_the_one_result() {
    init_tracing();
    let client = Arc::new(FakeComputeClient::new());

    let result = tracker(&client)
        .run_single("local", Task::new("combine", "combine", vec![]))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.stdout, "combine ok");
    assert_eq!(client.submissions()[0].tasks.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn run_single_failure_carries_output() {
    let client = Arc::new(FakeComputeClient::new());
    client.fail_task("combine", 1, "", "no inputs");

    let err = tracker(&client)
        .run_single("local", Task::new("combine", "combine", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowtriggerError::TaskFailed { ref stderr, .. } if stderr == "no inputs"));
}
