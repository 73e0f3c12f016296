// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::history::RunHistory;
use crate::pipeline::Pipeline;

/// Runs the pipeline on a fixed interval; the first run starts immediately.
/// Ticks missed while a run is in flight are skipped, not queued.
pub fn spawn_scheduler(
    pipeline: Arc<Pipeline>,
    history: Arc<RunHistory>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let report = pipeline.run_once().await;
            tracing::info!(
                target: "ingest",
                run_id = %report.run_id,
                outcome = ?report.outcome(),
                "scheduled run finished"
            );
            history.push(report);
        }
    })
}
