//! Run configuration assembled once at process start.

use crate::model::BatchDescriptor;
use crate::notify::ChannelConfig;
use crate::publish::PublishPolicy;
use crate::queue::DEFAULT_DEBOUNCE;
use crate::state::DEFAULT_STATE_PATH;
use std::path::PathBuf;
use std::time::Duration;

/// Everything the orchestrator needs to know about this process's run:
/// batching position, channel credentials, artifact locations and the
/// external tool command lines.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub batch: BatchDescriptor,
    /// Target environment name, used in messages and the rerun directive.
    pub env_name: String,
    /// Worker count, used only to compose the rerun command.
    pub workers: u32,
    pub channel: ChannelConfig,
    pub state_path: PathBuf,
    /// Root directory the per-batch bundle archives land under.
    pub bundle_root: PathBuf,
    /// Report directory of a single-batch run; publish falls back to it when
    /// there is nothing to merge.
    pub report_dir: PathBuf,
    /// Where staged merge input is assembled.
    pub staging_dir: PathBuf,
    /// Where the merge tool writes the unified report.
    pub merged_dir: PathBuf,
    /// Merge tool argv; empty disables merging.
    pub merge_tool: Vec<String>,
    /// Publish tool argv; empty disables publishing regardless of policy.
    pub publish_tool: Vec<String>,
    pub publish: PublishPolicy,
    pub debounce: Duration,
    /// Tool named in the rerun command, e.g. `npx playwright`.
    pub rerun_tool: String,
    /// Base URL for the rerun hyperlink; omitted when not configured.
    pub rerun_link_base: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch: BatchDescriptor::single(),
            env_name: "local".to_string(),
            workers: 4,
            channel: ChannelConfig::default(),
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            bundle_root: PathBuf::from("blob-report"),
            report_dir: PathBuf::from("test-report"),
            staging_dir: PathBuf::from(".runledger/merge-input"),
            merged_dir: PathBuf::from(".runledger/merged-report"),
            merge_tool: Vec::new(),
            publish_tool: Vec::new(),
            publish: PublishPolicy::Disabled,
            debounce: DEFAULT_DEBOUNCE,
            rerun_tool: "npx playwright".to_string(),
            rerun_link_base: None,
        }
    }
}

impl RunConfig {
    /// Root all on-disk paths under `base`. Used by the CLI (run working
    /// directory) and by tests (tempdirs).
    pub fn rooted_at(mut self, base: &std::path::Path) -> Self {
        self.state_path = base.join(&self.state_path);
        self.bundle_root = base.join(&self.bundle_root);
        self.report_dir = base.join(&self.report_dir);
        self.staging_dir = base.join(&self.staging_dir);
        self.merged_dir = base.join(&self.merged_dir);
        self
    }
}
