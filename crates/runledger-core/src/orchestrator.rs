//! The stateful glue between runner lifecycle events and everything else.
//!
//! One orchestrator per process. It owns the channel client for the process
//! lifetime, keeps the run snapshot current, feeds failures into the debounced
//! queue, and on the finalizing batch drives merge → publish → drain →
//! summary. No lifecycle handler can fail the run: every error path degrades
//! to console/log-only reporting.

use crate::artifact::{ArtifactMerger, MergeConfig, MergeOutcome, MergedReportBundle};
use crate::config::RunConfig;
use crate::model::{FailureSnippet, Outcome, TestEndEvent};
use crate::notify::{build_client, ChannelClient, MessageHandle};
use crate::publish::{PublishResult, ReportPublisher};
use crate::queue::FailureQueue;
use crate::snapshot::RunSnapshot;
use crate::state::CumulativeStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum interval between header edits, to stay under channel rate limits.
const HEADER_MIN_EDIT_INTERVAL: Duration = Duration::from_millis(200);

/// For large runs, edit the header at most every this many tests.
fn header_step(total: u64) -> u64 {
    if total <= 10 {
        1
    } else {
        std::cmp::max(1, total / 10)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Terminated,
}

pub struct RunOrchestrator {
    cfg: RunConfig,
    client: Arc<dyn ChannelClient>,
    queue: FailureQueue,
    store: CumulativeStore,
    snapshot: RunSnapshot,
    phase: Phase,
    header: Option<MessageHandle>,
    last_edit: Option<Instant>,
    step: u64,
}

impl RunOrchestrator {
    /// Build the orchestrator and its channel client. The client lives
    /// exactly as long as the orchestrator and is closed on every end path.
    pub fn new(cfg: RunConfig) -> Self {
        let client = build_client(&cfg.channel);
        Self::with_client(cfg, client)
    }

    /// Seam for tests and embedders that bring their own channel transport.
    pub fn with_client(cfg: RunConfig, client: Arc<dyn ChannelClient>) -> Self {
        let queue = FailureQueue::new(Arc::clone(&client), cfg.debounce);
        let store = CumulativeStore::new(&cfg.state_path);
        Self {
            cfg,
            client,
            queue,
            store,
            snapshot: RunSnapshot::default(),
            phase: Phase::Idle,
            header: None,
            last_edit: None,
            step: 1,
        }
    }

    pub fn snapshot(&self) -> &RunSnapshot {
        &self.snapshot
    }

    /// Run start: fix the planned total, fold in prior batches when this
    /// process continues a cumulative run, post the initial header.
    pub async fn on_begin(&mut self, planned_total: u64) {
        if self.phase != Phase::Idle {
            tracing::warn!(phase = ?self.phase, "on_begin ignored outside Idle");
            return;
        }
        self.snapshot = RunSnapshot::with_total(planned_total);
        if self.cfg.batch.merges_prior() {
            match self.store.load() {
                Ok(Some(prior)) => {
                    tracing::info!(
                        completed = prior.snapshot.completed,
                        "continuing cumulative run"
                    );
                    self.snapshot.merge_from(&prior.snapshot);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "prior cumulative state rejected"),
            }
        }
        self.step = header_step(self.snapshot.total);
        self.phase = Phase::Running;

        let text = render_header(&self.snapshot, &self.cfg.env_name);
        match self.client.send_message(&text).await {
            Ok(handle) => {
                self.client.start_thread(&handle, "failures").await;
                self.queue.set_anchor(handle.clone());
                self.header = Some(handle);
            }
            Err(e) => tracing::warn!(error = %e, "header not posted; console-only run"),
        }
    }

    /// One test finished. Updates counts, queues a snippet on failure, and
    /// re-renders the header under the throttle.
    pub async fn on_test_end(&mut self, event: TestEndEvent) {
        if self.phase != Phase::Running {
            tracing::debug!(phase = ?self.phase, title = %event.title, "test end ignored");
            return;
        }
        self.snapshot.advance(event.outcome, &event.case_ids);
        if event.outcome == Outcome::Failed {
            let body = event.failure.as_deref().unwrap_or("(no failure detail)");
            self.queue.enqueue(FailureSnippet::new(&event.title, body));
        }
        if self.should_edit_header() {
            self.last_edit = Some(Instant::now());
            if let Some(handle) = self.header.clone() {
                let text = render_header(&self.snapshot, &self.cfg.env_name);
                if let Err(e) = self.client.edit_message(&handle, &text).await {
                    // retried only by the next natural re-render
                    tracing::warn!(error = %e, "header edit failed");
                }
            }
        }
    }

    /// Run end. A non-finalizing batch persists its view and goes quiet; the
    /// finalizing batch merges, publishes, drains the queue and sends the
    /// summary. Every arm closes the client and reaches Terminated.
    pub async fn on_end(&mut self) {
        if self.phase != Phase::Running {
            tracing::debug!(phase = ?self.phase, "on_end ignored");
            return;
        }
        self.phase = Phase::Terminated;

        if !self.cfg.batch.is_finalizing() {
            if let Err(e) = self.store.save(&self.snapshot, &self.cfg.batch) {
                tracing::warn!(error = %e, "cumulative state not persisted; later batches restart counts");
            }
            self.client.close().await;
            return;
        }

        let merged = self.merge_artifacts().await;
        let publish_path: PathBuf = merged
            .map(|bundle| bundle.dir)
            .unwrap_or_else(|| self.cfg.report_dir.clone());
        let published = if self.cfg.publish.is_enabled() {
            ReportPublisher::new(self.cfg.publish_tool.clone())
                .publish(&publish_path)
                .await
        } else {
            tracing::info!("report publish disabled by policy");
            PublishResult::default()
        };
        if let Some(err) = &published.error {
            tracing::warn!(error = %err, "report publish failed");
        }

        self.queue.drain().await;

        let summary = compose_summary(&self.snapshot, &self.cfg, &published);
        if let Err(e) = self.client.send_message(&summary).await {
            tracing::warn!(error = %e, "final summary not delivered");
            eprintln!("{summary}");
        }

        self.store.clear();
        self.client.close().await;
    }

    async fn merge_artifacts(&self) -> Option<MergedReportBundle> {
        let merger = ArtifactMerger::new(MergeConfig::new(
            self.cfg.merge_tool.clone(),
            &self.cfg.merged_dir,
        ));
        let bundles = merger.discover_bundles(&self.cfg.bundle_root);
        if bundles.is_empty() {
            tracing::debug!(root = %self.cfg.bundle_root.display(), "no batch bundles to merge");
            return None;
        }
        let staged = match merger.stage_for_merge(&bundles, &self.cfg.staging_dir) {
            Ok(staged) => staged,
            Err(e) => {
                tracing::warn!(error = %e, "bundle staging failed; skipping merge");
                return None;
            }
        };
        match merger.merge(&staged).await {
            Ok(MergeOutcome::Merged(bundle)) => Some(bundle),
            Ok(MergeOutcome::TimedOut) => {
                tracing::warn!("report merge timed out; continuing without unified report");
                None
            }
            Ok(MergeOutcome::ToolError { status, log }) => {
                tracing::warn!(?status, log = %log, "report merge failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "report merge not attempted");
                None
            }
        }
    }

    fn should_edit_header(&self) -> bool {
        if self.header.is_none() || self.snapshot.total == 0 {
            return false;
        }
        let done = self.snapshot.completed;
        if done == self.snapshot.total {
            return true;
        }
        let on_step = done == 1 || done % self.step == 0;
        let interval_ok = self
            .last_edit
            .map(|t| t.elapsed() >= HEADER_MIN_EDIT_INTERVAL)
            .unwrap_or(true);
        on_step && interval_ok
    }
}

/// Live progress header. Deterministic, unit-testable.
pub fn render_header(snapshot: &RunSnapshot, env_name: &str) -> String {
    let pct = (snapshot.percent_complete() * 100.0).round() as u64;
    let mut line = format!(
        "⏳ {env_name} run — {pct}% ({}/{})",
        snapshot.completed, snapshot.total
    );
    if snapshot.failed > 0 {
        line.push_str(&format!(" · {} failed", snapshot.failed));
    }
    line
}

/// The final summary message: totals, report links, and on failure the
/// deduplicated sorted case IDs with a rerun command and hyperlink.
pub fn compose_summary(snapshot: &RunSnapshot, cfg: &RunConfig, published: &PublishResult) -> String {
    let icon = if snapshot.failed == 0 { "✅" } else { "❌" };
    let mut lines = vec![format!(
        "{icon} {} test run finished — Passed: {} · Failed: {} · Skipped: {} ({}/{})",
        cfg.env_name,
        snapshot.passed,
        snapshot.failed,
        snapshot.skipped,
        snapshot.completed,
        snapshot.total
    )];
    if let Some(url) = &published.report_url {
        lines.push(format!("📊 Report: {url}"));
    }
    if let Some(url) = &published.trace_index_url {
        lines.push(format!("🔍 Traces: {url}"));
    }
    if published.error.is_some() {
        lines.push("⚠️ Report publish failed; artifacts remain in CI.".to_string());
    }

    if snapshot.failed == 0 {
        lines.push("All green — nothing to rerun 🎉".to_string());
    } else {
        let ids = snapshot.sorted_failed_case_ids();
        let names: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        let filter = names.join("|");
        lines.push(format!("Failing cases: {}", names.join(", ")));
        lines.push(format!(
            "Rerun: `TEST_ENV={} {} test --grep \"{}\" --workers {}`",
            cfg.env_name, cfg.rerun_tool, filter, cfg.workers
        ));
        if let Some(base) = &cfg.rerun_link_base {
            let encoded: String = url::form_urlencoded::byte_serialize(filter.as_bytes()).collect();
            lines.push(format!("<{base}?grep={encoded}|Rerun failed cases in CI>"));
        }
    }
    lines.join("\n")
}
