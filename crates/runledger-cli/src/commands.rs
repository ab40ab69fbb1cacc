use crate::args::{split_tool, Cli, CleanArgs, Commands, RunArgs};
use crate::events::LifecycleEvent;
use anyhow::Result;
use runledger_core::model::{BatchDescriptor, TestEndEvent};
use runledger_core::notify::ChannelConfig;
use runledger_core::publish::PublishPolicy;
use runledger_core::state::CumulativeStore;
use runledger_core::{Outcome, RunConfig, RunOrchestrator};
use std::io::BufRead;
use std::time::Duration;

pub async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Demo(args) => demo(args).await,
        Commands::Clean(args) => clean(args),
    }
}

fn build_config(args: &RunArgs) -> RunConfig {
    RunConfig {
        batch: BatchDescriptor {
            index: args.batch_index,
            count: args.batch_count,
            reuse_across_batches: args.reuse_across_batches,
        },
        env_name: args.env_name.clone(),
        workers: args.workers,
        channel: ChannelConfig::from_env(),
        state_path: args.state_path.clone(),
        bundle_root: args.bundle_root.clone(),
        report_dir: args.report_dir.clone(),
        merge_tool: split_tool(&args.merge_tool),
        publish_tool: split_tool(&args.publish_tool),
        publish: PublishPolicy::from_env(),
        debounce: Duration::from_millis(args.debounce_ms),
        rerun_link_base: args.rerun_link_base.clone(),
        ..RunConfig::default()
    }
}

/// Consume lifecycle events from stdin until the stream ends. A truncated
/// stream (runner killed) still finalizes with whatever was observed.
async fn run(args: RunArgs) -> Result<i32> {
    let mut orch = RunOrchestrator::new(build_config(&args));
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: LifecycleEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed lifecycle event");
                continue;
            }
        };
        match event {
            LifecycleEvent::Begin { planned } => orch.on_begin(planned).await,
            LifecycleEvent::TestEnd {
                title,
                status,
                failure,
            } => {
                orch.on_test_end(TestEndEvent::new(title, status, failure))
                    .await
            }
            LifecycleEvent::End => break,
        }
    }
    orch.on_end().await;
    Ok(0)
}

/// Scripted three-test run against the console fallback; a quick way to see
/// the header, snippet and summary output without a channel or a runner.
async fn demo(args: RunArgs) -> Result<i32> {
    let mut cfg = build_config(&args);
    cfg.channel = ChannelConfig::default();
    let mut orch = RunOrchestrator::new(cfg);

    orch.on_begin(3).await;
    orch.on_test_end(TestEndEvent::new(
        "PHARMA-1 | loads the dashboard",
        Outcome::Passed,
        None,
    ))
    .await;
    orch.on_test_end(TestEndEvent::new(
        "PHARMA-7 | submits an order",
        Outcome::Failed,
        Some("expected status 200, received 500".to_string()),
    ))
    .await;
    orch.on_test_end(TestEndEvent::new(
        "PHARMA-2 | renders inventory",
        Outcome::Passed,
        None,
    ))
    .await;
    orch.on_end().await;
    Ok(0)
}

fn clean(args: CleanArgs) -> Result<i32> {
    let store = CumulativeStore::new(&args.state_path);
    store.clear();
    eprintln!("removed {} (if present)", args.state_path.display());
    Ok(0)
}
