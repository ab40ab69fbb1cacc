//! End-to-end lifecycle scenarios driven through the orchestrator with a
//! recording channel stub.

use async_trait::async_trait;
use runledger_core::model::{BatchDescriptor, Outcome, TestEndEvent};
use runledger_core::notify::{ChannelClient, ChannelError, MessageHandle};
use runledger_core::orchestrator::RunOrchestrator;
use runledger_core::RunConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingClient {
    messages: Mutex<Vec<String>>,
    edits: Mutex<Vec<String>>,
    replies: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

impl RecordingClient {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    fn final_summary(&self) -> String {
        self.messages().last().cloned().expect("summary sent")
    }
}

#[async_trait]
impl ChannelClient for RecordingClient {
    async fn send_message(&self, text: &str) -> Result<MessageHandle, ChannelError> {
        let mut messages = self.messages.lock().unwrap();
        messages.push(text.to_string());
        Ok(MessageHandle(format!("m{}", messages.len())))
    }

    async fn edit_message(&self, _h: &MessageHandle, text: &str) -> Result<(), ChannelError> {
        self.edits.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn reply(&self, _h: &MessageHandle, text: &str) -> Result<(), ChannelError> {
        self.replies.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn start_thread(&self, _h: &MessageHandle, _name: &str) {}

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

fn config_in(dir: &tempfile::TempDir) -> RunConfig {
    RunConfig::default().rooted_at(dir.path())
}

fn passed(title: &str) -> TestEndEvent {
    TestEndEvent::new(title, Outcome::Passed, None)
}

fn failed(title: &str, detail: &str) -> TestEndEvent {
    TestEndEvent::new(title, Outcome::Failed, Some(detail.to_string()))
}

#[tokio::test]
async fn single_batch_run_produces_summary_with_rerun_filter() {
    let dir = tempfile::tempdir().unwrap();
    let client = RecordingClient::new();
    let mut orch = RunOrchestrator::with_client(config_in(&dir), client.clone());

    orch.on_begin(3).await;
    orch.on_test_end(passed("PHARMA-1 | should load")).await;
    orch.on_test_end(failed("PHARMA-7 | should X", "expected true, got false"))
        .await;
    orch.on_test_end(passed("PHARMA-2 | should save")).await;
    orch.on_end().await;

    let summary = client.final_summary();
    assert!(summary.contains("Passed: 2"), "{summary}");
    assert!(summary.contains("Failed: 1"));
    assert!(summary.contains("Skipped: 0"));
    assert!(summary.contains("--grep \"PHARMA-7\""));

    // header posted first, then the summary
    assert!(client.messages()[0].contains("(0/3)"));
    // failure snippet drained before the summary went out
    let replies = client.replies.lock().unwrap().clone();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("PHARMA-7"));
    // client closed exactly once
    assert_eq!(client.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn duplicate_case_ids_appear_once_in_summary() {
    let dir = tempfile::tempdir().unwrap();
    let client = RecordingClient::new();
    let mut orch = RunOrchestrator::with_client(config_in(&dir), client.clone());

    orch.on_begin(2).await;
    orch.on_test_end(failed("PHARMA-42 | variant a", "boom")).await;
    orch.on_test_end(failed("PHARMA-42 | variant b", "boom")).await;
    orch.on_end().await;

    let summary = client.final_summary();
    let cases_line = summary
        .lines()
        .find(|l| l.starts_with("Failing cases:"))
        .expect("cases line present");
    assert_eq!(cases_line, "Failing cases: PHARMA-42");
    assert!(summary.contains("Failed: 2"));
}

#[tokio::test]
async fn non_finalizing_batch_persists_and_stays_quiet() {
    let dir = tempfile::tempdir().unwrap();
    let client = RecordingClient::new();
    let mut cfg = config_in(&dir);
    cfg.batch = BatchDescriptor {
        index: 1,
        count: 2,
        reuse_across_batches: true,
    };
    let state_path = cfg.state_path.clone();
    let mut orch = RunOrchestrator::with_client(cfg, client.clone());

    orch.on_begin(2).await;
    orch.on_test_end(passed("PHARMA-1 | a")).await;
    orch.on_test_end(failed("PHARMA-9 | b", "boom")).await;
    orch.on_end().await;

    assert!(state_path.exists(), "cumulative state persisted");
    // only the header went out as a top-level message, no summary
    assert_eq!(client.messages().len(), 1);
    assert_eq!(client.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn finalizing_batch_merges_prior_counts() {
    let dir = tempfile::tempdir().unwrap();

    let mut first_cfg = config_in(&dir);
    first_cfg.batch = BatchDescriptor {
        index: 1,
        count: 2,
        reuse_across_batches: true,
    };
    let first_client = RecordingClient::new();
    let mut first = RunOrchestrator::with_client(first_cfg.clone(), first_client.clone());
    first.on_begin(2).await;
    first.on_test_end(passed("PHARMA-1 | a")).await;
    first.on_test_end(failed("PHARMA-9 | b", "boom")).await;
    first.on_end().await;

    let mut second_cfg = config_in(&dir);
    second_cfg.batch = BatchDescriptor {
        index: 2,
        count: 2,
        reuse_across_batches: true,
    };
    let client = RecordingClient::new();
    let mut second = RunOrchestrator::with_client(second_cfg, client.clone());
    second.on_begin(2).await;
    second.on_test_end(passed("PHARMA-2 | c")).await;
    second.on_test_end(passed("PHARMA-3 | d")).await;
    second.on_end().await;

    let summary = client.final_summary();
    assert!(summary.contains("Passed: 3"), "{summary}");
    assert!(summary.contains("Failed: 1"));
    assert!(summary.contains("PHARMA-9"));
    // the finalizing batch deletes the shared state file
    assert!(!first_cfg.state_path.exists());
}

#[tokio::test]
async fn terminated_is_absorbing() {
    let dir = tempfile::tempdir().unwrap();
    let client = RecordingClient::new();
    let mut orch = RunOrchestrator::with_client(config_in(&dir), client.clone());

    orch.on_begin(1).await;
    orch.on_test_end(passed("PHARMA-1 | a")).await;
    orch.on_end().await;

    let sent_before = client.messages().len();
    orch.on_test_end(failed("PHARMA-2 | late", "boom")).await;
    orch.on_end().await;
    assert_eq!(client.messages().len(), sent_before);
    assert_eq!(orch.snapshot().completed, 1);
    assert_eq!(client.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn events_before_begin_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let client = RecordingClient::new();
    let mut orch = RunOrchestrator::with_client(config_in(&dir), client.clone());

    orch.on_test_end(passed("PHARMA-1 | early")).await;
    assert_eq!(orch.snapshot().completed, 0);
    assert!(client.messages().is_empty());
}
