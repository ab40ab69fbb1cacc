//! Command-line arguments. Batch position and environment knobs mirror the
//! variables the CI matrix exports, so most runs need no flags at all.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "runledger", about = "Test-run progress aggregation and chat-ops notification")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Consume runner lifecycle events (JSONL on stdin) and drive the pipeline
    Run(RunArgs),
    /// Feed a small scripted run through the pipeline against the console
    Demo(RunArgs),
    /// Delete a stale cumulative state file left by a killed run
    Clean(CleanArgs),
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// 1-based batch number of this process
    #[arg(long, env = "BATCH_INDEX", default_value_t = 1)]
    pub batch_index: u32,

    /// total number of batches in the logical run
    #[arg(long, env = "BATCH_COUNT", default_value_t = 1)]
    pub batch_count: u32,

    /// carry counts across batches through the cumulative state file
    #[arg(long, env = "REUSE_ACROSS_BATCHES")]
    pub reuse_across_batches: bool,

    /// target environment name (messages and rerun directive)
    #[arg(long, env = "TEST_ENV", default_value = "local")]
    pub env_name: String,

    /// worker count, used only in the rerun command string
    #[arg(long, env = "WORKERS", default_value_t = 4)]
    pub workers: u32,

    #[arg(long, default_value = ".runledger/cumulative.json")]
    pub state_path: PathBuf,

    /// root directory per-batch bundle archives land under
    #[arg(long, default_value = "blob-report")]
    pub bundle_root: PathBuf,

    /// report directory of a single-batch run (publish fallback)
    #[arg(long, default_value = "test-report")]
    pub report_dir: PathBuf,

    /// merge tool command line (space separated); empty disables merging
    #[arg(long, env = "RUNLEDGER_MERGE_TOOL", default_value = "")]
    pub merge_tool: String,

    /// publish tool command line (space separated); empty disables publishing
    #[arg(long, env = "RUNLEDGER_PUBLISH_TOOL", default_value = "")]
    pub publish_tool: String,

    /// debounce window for failure notifications, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub debounce_ms: u64,

    /// base URL for the rerun hyperlink in the final summary
    #[arg(long, env = "RERUN_LINK_BASE")]
    pub rerun_link_base: Option<String>,
}

#[derive(Parser, Clone)]
pub struct CleanArgs {
    #[arg(long, default_value = ".runledger/cumulative.json")]
    pub state_path: PathBuf,
}

/// Split a tool command line into argv the way a shell would for the simple
/// unquoted case.
pub fn split_tool(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
