//! Pipeline lifecycle integration tests.
//!
//! These tests drive whole cycles through the orchestrator with mock
//! collaborators and a file-backed store:
//! - Watermark progression across cycles with failures
//! - Recovery after a crash between delivery and commit
//! - Restart between items without duplicate notifications
//! - Message splitting end to end

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use herald_core::{
    notifier::{format_message, NotifierError},
    store::{ItemFilter, NewReceipt, Watermark},
    summarizer::SummarizerError,
    testing::{fixtures, MockContentSource, TestPipeline},
    CycleOutcome, ItemStatus, SqliteStateStore, StateStore,
};

/// A pipeline over an SQLite file that can be "restarted".
struct TestHarness {
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn db_path(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("herald.db")
    }

    /// Open a fresh process view of the same database.
    fn boot(&self, source: Arc<MockContentSource>) -> TestPipeline {
        TestPipeline::builder()
            .store(open_store(&self.db_path()))
            .source(source)
            .build()
    }
}

fn open_store(path: &Path) -> Arc<SqliteStateStore> {
    Arc::new(SqliteStateStore::new(path).expect("Failed to open store"))
}

fn successful_receipts(store: &SqliteStateStore, item_id: &str) -> usize {
    store
        .list_receipts("UC1", item_id)
        .unwrap()
        .iter()
        .filter(|r| r.success)
        .count()
}

#[tokio::test]
async fn test_watermark_never_regresses_across_cycles() {
    let p = TestPipeline::new();
    p.add_channel("UC1").unwrap();

    p.source
        .set_items(
            "UC1",
            vec![
                fixtures::candidate("UC1", "v1", 10),
                fixtures::candidate("UC1", "v2", 20),
            ],
        )
        .await;
    p.orchestrator.run_cycle("UC1", false).await.unwrap();
    let first = p.channel("UC1").unwrap().watermark.unwrap();
    assert_eq!(first, Watermark::new(fixtures::ts(20), "v2"));

    // The source replays an old item next to a new one that fails delivery.
    p.source
        .add_items("UC1", vec![fixtures::candidate("UC1", "v3", 30)])
        .await;
    p.notifier
        .fail_matching("Video v3", NotifierError::Permanent("blocked".to_string()))
        .await;
    let report = p.orchestrator.run_cycle("UC1", false).await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::Failed);

    let second = p.channel("UC1").unwrap().watermark.unwrap();
    assert!(second >= first);
    assert_eq!(second, Watermark::new(fixtures::ts(30), "v3"));

    // Nothing new: the watermark stays put.
    p.orchestrator.run_cycle("UC1", false).await.unwrap();
    assert_eq!(p.channel("UC1").unwrap().watermark.unwrap(), second);

    let items = p
        .store
        .list_items(&ItemFilter::new().for_channel("UC1"))
        .unwrap();
    let statuses: Vec<_> = items.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![ItemStatus::Notified, ItemStatus::Notified, ItemStatus::Failed]
    );
}

#[tokio::test]
async fn test_summary_failure_still_notifies_and_advances() {
    let p = TestPipeline::new();
    p.add_channel("UC1").unwrap();
    p.source
        .set_items(
            "UC1",
            vec![
                fixtures::candidate("UC1", "v1", 1),
                fixtures::candidate("UC1", "v2", 2),
                fixtures::candidate("UC1", "v3", 3),
            ],
        )
        .await;
    p.summarizer
        .fail_title("Video v2", SummarizerError::Permanent("refused".to_string()))
        .await;

    p.orchestrator.run_cycle("UC1", false).await.unwrap();

    let sent = p.notifier.sent().await;
    assert_eq!(sent.len(), 3);
    assert!(sent[1].text.contains("Summary unavailable."));
    assert!(!sent[0].text.contains("Summary unavailable."));

    let v2 = p.store.get_item("UC1", "v2").unwrap().unwrap();
    assert_eq!(v2.status, ItemStatus::Failed);
    assert_eq!(
        p.channel("UC1").unwrap().watermark.unwrap(),
        Watermark::new(fixtures::ts(3), "v3")
    );
}

#[tokio::test]
async fn test_crash_between_delivery_and_commit_does_not_resend() {
    let harness = TestHarness::new();
    let source = Arc::new(MockContentSource::new());
    source
        .set_items("UC1", vec![fixtures::candidate("UC1", "v1", 1)])
        .await;

    // First process: the item was delivered and its receipt written, then
    // the process died before the item was committed.
    {
        let store = open_store(&harness.db_path());
        store.add_channel(fixtures::new_channel("UC1")).unwrap();
        store.upsert_item(&fixtures::candidate("UC1", "v1", 1)).unwrap();
        store
            .record_receipt(NewReceipt {
                channel_id: "UC1".to_string(),
                item_id: "v1".to_string(),
                endpoint_id: fixtures::ENDPOINT.to_string(),
                provider_message_id: Some("msg-1".to_string()),
                chunks_sent: 1,
                success: true,
                error: None,
            })
            .unwrap();
    }

    let p = harness.boot(source);
    let report = p.orchestrator.run_cycle("UC1", false).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert_eq!(report.items_recovered, 1);
    assert_eq!(report.items_notified, 1);
    assert!(p.notifier.sent().await.is_empty());
    assert_eq!(successful_receipts(&p.store, "v1"), 1);

    let item = p.store.get_item("UC1", "v1").unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Notified);
    assert_eq!(
        p.channel("UC1").unwrap().watermark.unwrap(),
        Watermark::new(fixtures::ts(1), "v1")
    );
}

#[tokio::test]
async fn test_crash_after_partial_chunks_resends_whole_item() {
    let harness = TestHarness::new();
    let source = Arc::new(MockContentSource::new());
    let item = fixtures::candidate("UC1", "v1", 1);
    source.set_items("UC1", vec![item.clone()]).await;

    // The item was discovered but never fully delivered: no success receipt.
    {
        let store = open_store(&harness.db_path());
        store.add_channel(fixtures::new_channel("UC1")).unwrap();
        store.upsert_item(&item).unwrap();
    }

    let p = TestPipeline::builder()
        .store(open_store(&harness.db_path()))
        .source(source)
        .max_message_chars(200)
        .build();
    p.summarizer
        .set_default_summary(&"A sentence about the video. ".repeat(15))
        .await;
    let report = p.orchestrator.run_cycle("UC1", false).await.unwrap();
    assert_eq!(report.items_notified, 1);

    let sent = p.notifier.sent().await;
    assert!(sent.len() > 1);
    assert!(sent.iter().all(|m| m.text.chars().count() <= 200));

    let item = p.store.get_item("UC1", "v1").unwrap().unwrap();
    let texts: Vec<_> = sent.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts.concat(), format_message(&item));
    assert_eq!(successful_receipts(&p.store, "v1"), 1);
}

#[tokio::test]
async fn test_restart_between_items_has_no_duplicate_receipts() {
    let harness = TestHarness::new();

    // First process sees only item 1 and commits it.
    let first_source = Arc::new(MockContentSource::new());
    first_source
        .set_items("UC1", vec![fixtures::candidate("UC1", "v1", 1)])
        .await;
    {
        let p = harness.boot(first_source);
        p.add_channel("UC1").unwrap();
        p.orchestrator.run_cycle("UC1", false).await.unwrap();
        assert_eq!(p.notifier.sent().await.len(), 1);
    }

    // After a restart the source lists both items.
    let second_source = Arc::new(MockContentSource::new());
    second_source
        .set_items(
            "UC1",
            vec![
                fixtures::candidate("UC1", "v1", 1),
                fixtures::candidate("UC1", "v2", 2),
            ],
        )
        .await;
    let p = harness.boot(second_source);
    let report = p.orchestrator.run_cycle("UC1", false).await.unwrap();

    assert_eq!(report.items_notified, 1);
    let sent = p.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("Video v2"));

    assert_eq!(successful_receipts(&p.store, "v1"), 1);
    assert_eq!(successful_receipts(&p.store, "v2"), 1);
}

#[tokio::test]
async fn test_circuit_state_survives_restart() {
    let harness = TestHarness::new();
    let source = Arc::new(MockContentSource::new());

    {
        let p = TestPipeline::builder()
            .store(open_store(&harness.db_path()))
            .source(source.clone())
            .failure_threshold(1)
            .max_attempts(1)
            .build();
        p.add_channel("UC1").unwrap();
        source
            .push_error(herald_core::SourceError::Transient("503".to_string()))
            .await;
        let report = p.orchestrator.run_cycle("UC1", false).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Failed);
    }

    let p = harness.boot(source.clone());
    let report = p.orchestrator.run_cycle("UC1", false).await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::CircuitOpen);
    assert!(source.list_calls().await.len() == 1);
}
