// tests/scheduler_runs.rs
mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;

use trending_ingest::history::RunHistory;
use trending_ingest::pipeline::RunOutcome;
use trending_ingest::scheduler::spawn_scheduler;
use trending_ingest::supply::MemorySupplier;
use trending_ingest::{Pipeline, PipelineSettings, Store};

#[tokio::test]
async fn first_tick_ingests_and_later_ticks_find_nothing_new() {
    let supplier = MemorySupplier::new(
        film_and_autos(),
        vec![obs("vidA", day(2017, 11, 14), "1", Some(5))],
    );
    let pipeline = Arc::new(Pipeline::new(
        Store::open_in_memory().unwrap(),
        Arc::new(supplier),
        PipelineSettings::default(),
    ));
    let history = Arc::new(RunHistory::with_capacity(16));

    let handle = spawn_scheduler(pipeline.clone(), history.clone(), Duration::from_millis(20));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while history.snapshot_last_n(16).len() < 3 {
        assert!(tokio::time::Instant::now() < deadline, "scheduler did not tick");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.abort();

    let runs = history.snapshot_last_n(16);
    assert_eq!(runs[0].outcome(), RunOutcome::Ingested);
    assert!(runs[1..].iter().all(|r| r.outcome() == RunOutcome::NoNewData));
    assert_eq!(pipeline.store().lock().unwrap().observation_count().unwrap(), 1);
}
