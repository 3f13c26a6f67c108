//! # Live-State End-to-End Tests
//!
//! Real services driven by their poll loops against a scripted torrent
//! client, on a paused tokio clock.

use lib_common::configs::EngineConfig;
use lib_common::core::{DiffAction, DiffEntry, PollConfig, PollPhase};
use lib_common::error::FetchError;
use lib_common::ingestors::{ServiceEvent, TaxonomyService, TorrentService, TransferService};
use project_tests::{rates, torrent, ScriptedTorrentClient};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

fn fast_polls() -> PollConfig {
    PollConfig {
        base_interval: Duration::from_millis(2_000),
        floor_delay: Duration::from_millis(60_000),
        error_threshold: 3,
    }
}

async fn next_event(rx: &mut UnboundedReceiver<Arc<ServiceEvent>>) -> ServiceEvent {
    let event = tokio::time::timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("no event before timeout")
        .expect("dispatcher dropped");
    (*event).clone()
}

async fn next_list_diff(rx: &mut UnboundedReceiver<Arc<ServiceEvent>>) -> (u64, Vec<DiffEntry>) {
    loop {
        if let ServiceEvent::TorrentListDiffChange { id, diff } = next_event(rx).await {
            return (id, diff);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_torrent_list_add_change_remove() {
    let client = Arc::new(ScriptedTorrentClient::new());
    client.push_list(Ok(vec![torrent("A", 0, 100), torrent("B", 0, 100)]));
    client.set_list(Ok(vec![torrent("A", 50, 100), torrent("C", 0, 100)]));

    let service = Arc::new(TorrentService::new());
    let (_, mut rx) = service.dispatcher().add_listener("test");
    let token = CancellationToken::new();
    service.start(client.clone(), fast_polls(), &token);

    let (_, first) = next_list_diff(&mut rx).await;
    let keys: Vec<&str> = first.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["A", "B"]);
    assert!(first.iter().all(|e| matches!(e.action, DiffAction::Added(_))));

    let (_, second) = next_list_diff(&mut rx).await;
    assert_eq!(second.len(), 3);
    assert_eq!(second[0].key, "A");
    assert_eq!(
        second[0].action,
        DiffAction::Changed(json!({"bytesDone": 50, "percentComplete": 50.0}))
    );
    assert_eq!(second[1].key, "C");
    assert!(matches!(second[1].action, DiffAction::Added(_)));
    assert_eq!(second[2].key, "B");
    assert_eq!(second[2].action, DiffAction::Removed);

    // Same list again: a success without a diff.
    loop {
        match next_event(&mut rx).await {
            ServiceEvent::TorrentListFetchSuccess if client.list_calls() >= 3 => break,
            ServiceEvent::TorrentListDiffChange { .. } => panic!("unchanged list produced a diff"),
            _ => {}
        }
    }

    let list = service.torrent_list();
    assert_eq!(list.torrents.keys().collect::<Vec<_>>(), vec!["A", "C"]);
    token.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_backoff_and_recovery() {
    let client = Arc::new(ScriptedTorrentClient::new());
    for _ in 0..3 {
        client.push_list(Err(FetchError::Transport("connection refused".to_string())));
    }
    client.set_list(Ok(vec![torrent("A", 1, 2)]));

    let service = Arc::new(TorrentService::new());
    let (_, mut rx) = service.dispatcher().add_listener("test");
    let token = CancellationToken::new();
    service.start(client.clone(), fast_polls(), &token);
    let mut status = service.poll_status().unwrap();

    for expected in 1..=3u32 {
        match next_event(&mut rx).await {
            ServiceEvent::TorrentListFetchError { error_count, message } => {
                assert_eq!(error_count, expected);
                assert!(message.contains("connection refused"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // Third failure reached the threshold: the floor applies.
    status
        .wait_for(|s| s.consecutive_errors == 3 && s.phase == PollPhase::Scheduled)
        .await
        .unwrap();
    assert_eq!(status.borrow().next_delay, Duration::from_millis(60_000));

    let before = tokio::time::Instant::now();
    let (_, diff) = next_list_diff(&mut rx).await;
    assert!(before.elapsed() >= Duration::from_millis(60_000));
    assert_eq!(diff[0].key, "A");

    status.wait_for(|s| s.consecutive_errors == 0).await.unwrap();
    assert!(status.borrow().last_error.is_none());
    token.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_errors_below_threshold_keep_base_interval() {
    let client = Arc::new(ScriptedTorrentClient::new());
    client.push_list(Err(FetchError::Unavailable));
    client.push_list(Err(FetchError::Unavailable));

    let service = Arc::new(TorrentService::new());
    let token = CancellationToken::new();
    service.start(client.clone(), fast_polls(), &token);
    let mut status = service.poll_status().unwrap();

    status
        .wait_for(|s| s.consecutive_errors == 2 && s.phase == PollPhase::Scheduled)
        .await
        .unwrap();
    assert_eq!(status.borrow().next_delay, Duration::from_millis(2_000));
    token.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_poll_now_skips_the_wait() {
    let client = Arc::new(ScriptedTorrentClient::new());
    let service = Arc::new(TorrentService::new());
    let token = CancellationToken::new();
    let config = PollConfig {
        base_interval: Duration::from_secs(3_600),
        ..fast_polls()
    };
    service.start(client.clone(), config, &token);
    let mut status = service.poll_status().unwrap();
    status.wait_for(|s| s.phase == PollPhase::Scheduled).await.unwrap();
    assert_eq!(client.list_calls(), 1);

    let before = tokio::time::Instant::now();
    service.poll_now();
    status.changed().await.unwrap();
    status.wait_for(|s| s.phase == PollPhase::Scheduled).await.unwrap();
    assert_eq!(client.list_calls(), 2);
    assert!(before.elapsed() < Duration::from_secs(1));
    token.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_later_results() {
    let client = Arc::new(ScriptedTorrentClient::new());
    client.set_list(Ok(vec![torrent("A", 0, 1)]));
    let service = Arc::new(TorrentService::new());
    let token = CancellationToken::new();
    service.start(client.clone(), fast_polls(), &token);

    let mut status = service.poll_status().unwrap();
    status.wait_for(|s| s.last_success_ms.is_some()).await.unwrap();
    service.stop();

    let calls = client.list_calls();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(client.list_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_taxonomy_follows_polls() {
    let client = Arc::new(ScriptedTorrentClient::new());
    let mut tagged = torrent("A", 100, 100);
    tagged.is_complete = true;
    tagged.tags = vec!["linux".to_string()];
    tagged.tracker_uris = vec!["udp://tracker.example:1337/announce".to_string()];
    client.set_list(Ok(vec![tagged, torrent("B", 0, 100)]));

    let torrents = Arc::new(TorrentService::new());
    let taxonomy = Arc::new(TaxonomyService::new());
    let token = CancellationToken::new();
    let follower = taxonomy.start(&torrents, &token);
    let (_, mut rx) = taxonomy.dispatcher().add_listener("test");
    torrents.start(client, fast_polls(), &token);

    match next_event(&mut rx).await {
        ServiceEvent::TaxonomyDiffChange { diff, .. } => {
            assert!(diff.iter().any(|e| e.key == "tagCounts"));
        }
        other => panic!("unexpected {other:?}"),
    }
    let snapshot = taxonomy.taxonomy().taxonomy;
    assert_eq!(snapshot["statusCounts"]["all"], 2);
    assert_eq!(snapshot["statusCounts"]["complete"], 1);
    assert_eq!(snapshot["tagCounts"]["linux"], 1);
    assert_eq!(snapshot["tagCounts"]["untagged"], 1);
    assert_eq!(snapshot["trackerCounts"]["tracker.example"], 1);

    token.cancel();
    follower.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_transfer_summary_poll_feeds_history() {
    let client = Arc::new(ScriptedTorrentClient::new());
    client.set_summary(Ok(rates(10, 20)));

    let service = Arc::new(TransferService::new(&EngineConfig::default()).unwrap());
    let (_, mut rx) = service.dispatcher().add_listener("test");
    let token = CancellationToken::new();
    service.start(client, fast_polls(), &token);

    let mut saw_diff = false;
    let mut saw_history = false;
    while !(saw_diff && saw_history) {
        match next_event(&mut rx).await {
            ServiceEvent::TransferSummaryDiffChange { diff, .. } => {
                assert!(diff.iter().any(|e| e.key == "downRate" && e.action == DiffAction::Added(json!(20))));
                saw_diff = true;
            }
            ServiceEvent::HistorySnapshotUpdated(resolution) => {
                assert_eq!(resolution.as_str(), "fiveMin");
                saw_history = true;
            }
            _ => {}
        }
    }

    assert_eq!(service.transfer_summary().transfer_summary["upRate"], 10);
    assert!(service.history_size() >= 1);
    token.cancel();
}
