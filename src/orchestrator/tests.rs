use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::Semaphore;

use super::*;
use crate::error::{Error, FetchError};
use crate::export::CSV_HEADER;
use crate::test_helpers::{FakeProvider, fast_config};
use crate::types::{BatchState, OutcomeClass, ProgressEvent};

fn keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{:05}", 20000 + i)).collect()
}

fn orchestrator_with(provider: Arc<FakeProvider>) -> BatchOrchestrator {
    BatchOrchestrator::with_provider(fast_config(), provider)
}

/// Consume the progress stream to its end, dropping keepalives
async fn drain(orchestrator: &BatchOrchestrator, id: SessionId) -> Vec<ProgressEvent> {
    orchestrator
        .stream_progress(id)
        .await
        .unwrap()
        .into_stream()
        .filter(|e| futures::future::ready(*e != ProgressEvent::Keepalive))
        .collect()
        .await
}

#[tokio::test]
async fn submit_returns_before_items_complete() {
    let gate = Arc::new(Semaphore::new(0));
    let provider = Arc::new(FakeProvider::new().gated(Arc::clone(&gate)));
    let orchestrator = orchestrator_with(Arc::clone(&provider));

    let started = Instant::now();
    let id = orchestrator.submit("secret", &keys(3)).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));

    let status = orchestrator.status(id).await.unwrap();
    assert_ne!(status.state, BatchState::Completed);
    assert_eq!(status.total, 3);
    assert_eq!(status.processed, 0);

    gate.add_permits(3);
    drain(&orchestrator, id).await;
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn results_are_not_found_until_batch_completes() {
    let gate = Arc::new(Semaphore::new(0));
    let provider = Arc::new(FakeProvider::new().gated(Arc::clone(&gate)));
    let orchestrator = orchestrator_with(provider);

    let id = orchestrator.submit("secret", &keys(2)).await.unwrap();

    assert!(matches!(
        orchestrator.get_results(id).await,
        Err(Error::SessionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.preview(id).await,
        Err(Error::SessionNotFound(_))
    ));

    gate.add_permits(2);
    drain(&orchestrator, id).await;

    assert_eq!(orchestrator.get_results(id).await.unwrap().results.len(), 2);
}

#[tokio::test]
async fn blank_credential_is_rejected_without_session() {
    let orchestrator = orchestrator_with(Arc::new(FakeProvider::new()));

    let result = orchestrator.submit("   ", &keys(2)).await;

    match result {
        Err(Error::Validation { field, .. }) => assert_eq!(field.as_deref(), Some("api_key")),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(orchestrator.progress.is_empty().await);
    assert_eq!(orchestrator.active_batches().await, 0);
}

#[tokio::test]
async fn empty_or_blank_keys_are_rejected_without_session() {
    let provider = Arc::new(FakeProvider::new());
    let orchestrator = orchestrator_with(Arc::clone(&provider));

    for input in [vec![], vec![" ".to_string(), String::new()]] {
        match orchestrator.submit("secret", &input).await {
            Err(Error::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("zip_codes"))
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
    assert!(orchestrator.progress.is_empty().await);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn every_submitted_key_runs_as_its_own_item() {
    let provider = Arc::new(
        FakeProvider::new().failing("", FetchError::from_status("", 404)),
    );
    let orchestrator = orchestrator_with(Arc::clone(&provider));
    let input = vec!["10001".to_string(), String::new()];

    let id = orchestrator.submit("secret", &input).await.unwrap();
    let events = drain(&orchestrator, id).await;

    let done: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::ItemDone { key, total, .. } => Some((key.clone(), *total)),
            _ => None,
        })
        .collect();
    assert_eq!(done.len(), 2);
    assert!(done.iter().all(|(_, total)| *total == 2));
    assert!(done.iter().any(|(key, _)| key.is_empty()));
    assert_eq!(provider.calls(), 2);

    let status = orchestrator.status(id).await.unwrap();
    assert_eq!(status.total, 2);
    assert_eq!(status.succeeded, 1);
}

#[tokio::test]
async fn keys_reach_the_provider_unchanged() {
    let orchestrator = orchestrator_with(Arc::new(FakeProvider::new()));
    let input = vec![" 10001 ".to_string(), "10002".to_string()];

    let id = orchestrator.submit("secret", &input).await.unwrap();
    drain(&orchestrator, id).await;

    let mut zips: Vec<_> = orchestrator
        .get_results(id)
        .await
        .unwrap()
        .results
        .iter()
        .map(|r| r.zip_code.clone())
        .collect();
    zips.sort();
    assert_eq!(zips, vec![" 10001 ", "10002"]);
}

#[tokio::test]
async fn stream_has_one_item_done_per_key_and_terminal_last() {
    let provider = Arc::new(
        FakeProvider::new()
            .with_delay(Duration::from_millis(5))
            .failing("20003", FetchError::from_status("20003", 401)),
    );
    let orchestrator = orchestrator_with(provider);

    let id = orchestrator.submit("secret", &keys(10)).await.unwrap();
    let events = drain(&orchestrator, id).await;

    assert_eq!(events.first(), Some(&ProgressEvent::Started { total: 10 }));
    let done = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::ItemDone { .. }))
        .count();
    assert_eq!(done, 10);
    let errors = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::ItemError { .. }))
        .count();
    assert_eq!(errors, 1);

    let terminal = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal, 1);
    match events.last().unwrap() {
        ProgressEvent::BatchCompleted {
            succeeded,
            total,
            message,
        } => {
            assert_eq!((*succeeded, *total), (9, 10));
            assert_eq!(message, "Successfully processed 9 out of 10 ZIP codes");
        }
        other => panic!("expected BatchCompleted last, got {other:?}"),
    }
}

#[tokio::test]
async fn timed_out_items_do_not_block_the_batch() {
    let provider = Arc::new(FakeProvider::new().hanging("20001").hanging("20004"));
    let mut config = fast_config();
    config.fetch.request_timeout = Duration::from_millis(100);
    let orchestrator = BatchOrchestrator::with_provider(config, provider);

    let id = orchestrator.submit("secret", &keys(6)).await.unwrap();
    let events = drain(&orchestrator, id).await;

    match events.last().unwrap() {
        ProgressEvent::BatchCompleted {
            succeeded, total, ..
        } => assert_eq!(*succeeded, *total - 2),
        other => panic!("expected BatchCompleted last, got {other:?}"),
    }
    let timeouts: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::ItemError { key, message } => Some((key.clone(), message.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(timeouts.len(), 2);
    assert!(timeouts.iter().all(|(_, m)| m == "Request timeout"));
    assert_eq!(orchestrator.get_results(id).await.unwrap().results.len(), 4);
}

#[tokio::test]
async fn batch_never_exceeds_concurrency_cap() {
    let provider = Arc::new(FakeProvider::new().with_delay(Duration::from_millis(15)));
    let orchestrator = orchestrator_with(Arc::clone(&provider));

    let id = orchestrator.submit("secret", &keys(20)).await.unwrap();
    drain(&orchestrator, id).await;

    assert_eq!(provider.calls(), 20);
    assert!(provider.max_in_flight() <= 5);
}

#[tokio::test]
async fn preview_of_eight_returns_five_with_total() {
    let orchestrator = orchestrator_with(Arc::new(FakeProvider::new()));

    let id = orchestrator.submit("secret", &keys(8)).await.unwrap();
    drain(&orchestrator, id).await;
    let preview = orchestrator.preview(id).await.unwrap();

    assert_eq!(preview.data.len(), 5);
    assert_eq!(preview.preview_count, 5);
    assert_eq!(preview.total_results, 8);
}

#[tokio::test]
async fn all_failed_batch_has_no_data() {
    let mut provider = FakeProvider::new();
    for key in keys(3) {
        provider = provider.failing(&key, FetchError::from_status(key.as_str(), 404));
    }
    let orchestrator = orchestrator_with(Arc::new(provider));

    let id = orchestrator.submit("secret", &keys(3)).await.unwrap();
    let events = drain(&orchestrator, id).await;

    assert!(events.last().unwrap().is_terminal());
    assert!(matches!(orchestrator.export(id).await, Err(Error::NoData(_))));
    assert!(matches!(orchestrator.export_csv(id).await, Err(Error::NoData(_))));
    assert!(matches!(orchestrator.preview(id).await, Err(Error::NoData(_))));
    // The batch itself completed
    assert!(orchestrator.get_results(id).await.unwrap().results.is_empty());
    assert_eq!(
        orchestrator.status(id).await.unwrap().state,
        BatchState::Completed
    );
}

#[tokio::test]
async fn unknown_session_is_not_found_everywhere() {
    let orchestrator = orchestrator_with(Arc::new(FakeProvider::new()));
    let id = SessionId::new();

    assert!(matches!(
        orchestrator.stream_progress(id).await,
        Err(Error::SessionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.preview(id).await,
        Err(Error::SessionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.export(id).await,
        Err(Error::SessionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.status(id).await,
        Err(Error::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn stream_is_gone_after_terminal_event_delivered() {
    let orchestrator = orchestrator_with(Arc::new(FakeProvider::new()));

    let id = orchestrator.submit("secret", &keys(2)).await.unwrap();
    drain(&orchestrator, id).await;

    assert!(matches!(
        orchestrator.stream_progress(id).await,
        Err(Error::SessionNotFound(_))
    ));
    // Results outlive the stream
    assert_eq!(orchestrator.preview(id).await.unwrap().total_results, 2);
}

#[tokio::test]
async fn second_concurrent_observer_is_busy() {
    let gate = Arc::new(Semaphore::new(0));
    let orchestrator =
        orchestrator_with(Arc::new(FakeProvider::new().gated(Arc::clone(&gate))));

    let id = orchestrator.submit("secret", &keys(1)).await.unwrap();
    let first = orchestrator.stream_progress(id).await.unwrap();

    assert!(matches!(
        orchestrator.stream_progress(id).await,
        Err(Error::StreamBusy(_))
    ));

    drop(first);
    gate.add_permits(1);
    drain(&orchestrator, id).await;
}

#[tokio::test]
async fn keepalive_is_sent_while_batch_is_slow() {
    let gate = Arc::new(Semaphore::new(0));
    let orchestrator =
        orchestrator_with(Arc::new(FakeProvider::new().gated(Arc::clone(&gate))));

    let id = orchestrator.submit("secret", &keys(1)).await.unwrap();
    let mut subscription = orchestrator.stream_progress(id).await.unwrap();

    assert_eq!(
        subscription.next_event().await,
        Some(ProgressEvent::Started { total: 1 })
    );
    assert_eq!(
        subscription.next_event().await,
        Some(ProgressEvent::Keepalive)
    );

    gate.add_permits(1);
    let mut saw_terminal = false;
    while let Some(event) = subscription.next_event().await {
        saw_terminal |= event.is_terminal();
    }
    assert!(saw_terminal);
}

#[tokio::test]
async fn repeated_reads_are_identical() {
    let orchestrator = orchestrator_with(Arc::new(FakeProvider::new()));

    let id = orchestrator.submit("secret", &keys(4)).await.unwrap();
    drain(&orchestrator, id).await;

    let first = orchestrator.get_results(id).await.unwrap();
    let second = orchestrator.get_results(id).await.unwrap();
    assert_eq!(*first, *second);
    assert_eq!(
        orchestrator.export_csv(id).await.unwrap().content,
        orchestrator.export_csv(id).await.unwrap().content
    );
}

#[tokio::test]
async fn status_reports_final_counters() {
    let provider = Arc::new(
        FakeProvider::new().failing("20000", FetchError::timeout("20000")),
    );
    let orchestrator = orchestrator_with(provider);

    let id = orchestrator.submit("secret", &keys(3)).await.unwrap();
    drain(&orchestrator, id).await;
    let status = orchestrator.status(id).await.unwrap();

    assert_eq!(status.state, BatchState::Completed);
    assert_eq!(status.processed, 3);
    assert_eq!(status.succeeded, 2);
    assert!(status.completed_at.is_some());
}

#[tokio::test]
async fn item_done_classes_match_outcomes() {
    let provider = Arc::new(
        FakeProvider::new().failing("20001", FetchError::network("20001", "reset")),
    );
    let orchestrator = orchestrator_with(provider);

    let id = orchestrator.submit("secret", &keys(2)).await.unwrap();
    let events = drain(&orchestrator, id).await;

    for event in events {
        if let ProgressEvent::ItemDone {
            key, outcome_class, ..
        } = event
        {
            let expected = if key == "20001" {
                OutcomeClass::Error
            } else {
                OutcomeClass::Completed
            };
            assert_eq!(outcome_class, expected);
        }
    }
}

#[tokio::test]
async fn csv_export_contains_every_record() {
    let orchestrator = orchestrator_with(Arc::new(FakeProvider::new()));

    let id = orchestrator.submit("secret", &keys(7)).await.unwrap();
    drain(&orchestrator, id).await;
    let export = orchestrator.export_csv(id).await.unwrap();

    assert!(export.filename.starts_with("weather-data-"));
    assert!(export.filename.ends_with(".csv"));
    let lines: Vec<_> = export.content.lines().collect();
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0], CSV_HEADER.join(","));
}

#[tokio::test]
async fn shutdown_rejects_new_submissions() {
    let orchestrator = orchestrator_with(Arc::new(FakeProvider::new()));

    orchestrator.shutdown().await.unwrap();

    assert!(!orchestrator.is_accepting());
    assert!(matches!(
        orchestrator.submit("secret", &keys(1)).await,
        Err(Error::ShuttingDown)
    ));
}

#[tokio::test]
async fn shutdown_waits_for_running_batches() {
    let gate = Arc::new(Semaphore::new(0));
    let orchestrator =
        orchestrator_with(Arc::new(FakeProvider::new().gated(Arc::clone(&gate))));
    let id = orchestrator.submit("secret", &keys(2)).await.unwrap();

    let release = Arc::clone(&gate);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        release.add_permits(2);
    });
    orchestrator.shutdown().await.unwrap();

    assert_eq!(
        orchestrator.status(id).await.unwrap().state,
        BatchState::Completed
    );
    assert_eq!(orchestrator.get_results(id).await.unwrap().results.len(), 2);
}

#[tokio::test]
async fn sweep_evicts_completed_sessions_only() {
    let gate = Arc::new(Semaphore::new(0));
    let orchestrator =
        orchestrator_with(Arc::new(FakeProvider::new().gated(Arc::clone(&gate))));

    gate.add_permits(1);
    let done = orchestrator.submit("secret", &keys(1)).await.unwrap();
    drain(&orchestrator, done).await;
    let running = orchestrator.submit("secret", &keys(1)).await.unwrap();

    let forgotten = orchestrator.sweep_expired(Duration::ZERO).await;

    assert_eq!(forgotten, vec![done]);
    assert!(matches!(
        orchestrator.get_results(done).await,
        Err(Error::SessionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.status(done).await,
        Err(Error::SessionNotFound(_))
    ));
    assert!(orchestrator.status(running).await.is_ok());

    gate.add_permits(1);
    drain(&orchestrator, running).await;
}

#[tokio::test]
async fn sweep_evicts_unobserved_finished_streams() {
    let orchestrator = orchestrator_with(Arc::new(FakeProvider::new()));

    let id = orchestrator.submit("secret", &keys(1)).await.unwrap();
    while orchestrator.status(id).await.unwrap().state != BatchState::Completed {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Give the batch task a moment to publish its terminal event
    tokio::time::sleep(Duration::from_millis(20)).await;

    orchestrator.sweep_expired(Duration::ZERO).await;

    assert!(matches!(
        orchestrator.stream_progress(id).await,
        Err(Error::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn retention_sweeper_stops_on_shutdown() {
    let mut config = fast_config();
    config.retention.enabled = true;
    config.retention.sweep_interval = Duration::from_millis(20);
    let orchestrator = BatchOrchestrator::with_provider(config, Arc::new(FakeProvider::new()));

    let handle = orchestrator.start_retention_sweeper();
    orchestrator.shutdown().await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweeper should stop after shutdown")
        .unwrap();
}

#[tokio::test]
async fn health_is_healthy() {
    let orchestrator = orchestrator_with(Arc::new(FakeProvider::new()));
    assert_eq!(orchestrator.health().status, "healthy");
}
