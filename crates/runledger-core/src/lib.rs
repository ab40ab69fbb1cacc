//! Runledger: test-run progress aggregation and chat-ops notification.
//!
//! Consumes runner lifecycle events (run begin, per-test end, run end) and
//! keeps an authoritative run snapshot, carries it across batch processes
//! through a stamped state file, merges per-batch report bundles, publishes
//! the unified report, and pushes throttled progress plus one final summary
//! to an external channel. The whole pipeline is best-effort by contract:
//! nothing in here may fail the test run itself.

pub mod artifact;
pub mod config;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod publish;
pub mod queue;
pub mod sanitize;
pub mod snapshot;
pub mod state;

pub use config::RunConfig;
pub use model::{BatchDescriptor, CaseId, FailureSnippet, Outcome, TestEndEvent};
pub use orchestrator::RunOrchestrator;
pub use snapshot::RunSnapshot;
pub use state::CumulativeStore;
