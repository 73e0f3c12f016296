// tests/telemetry_counters.rs
// Counters emitted for finished runs, captured with a thread-local recorder.

mod common;

use common::*;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

use trending_ingest::error::IngestError;
use trending_ingest::pipeline::InputTally;
use trending_ingest::supply::RawBatch;
use trending_ingest::telemetry::record_run;
use trending_ingest::{execute, RunReport, Store};

fn counter(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> Option<u64> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(key, _, _, value)| {
            let k = key.key();
            if k.name() != name {
                return None;
            }
            if let Some((lk, lv)) = label {
                if !k.labels().any(|l| l.key() == lk && l.value() == lv) {
                    return None;
                }
            }
            match value {
                DebugValue::Counter(v) => Some(v),
                _ => None,
            }
        })
}

fn committed_report() -> RunReport {
    let mut store = Store::open_in_memory().unwrap();
    let d = day(2017, 11, 14);
    execute(
        &mut store,
        &ctx("t1"),
        RawBatch {
            categories: film_and_autos(),
            observations: vec![
                obs("a", d, "1", Some(1)),
                obs("b", d, "2", Some(2)),
                obs("c", d, "404", Some(3)),
            ],
            publish_times_coerced: 0,
        },
    )
    .unwrap()
}

#[test]
fn committed_run_counts_rows() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let report = committed_report();

    metrics::with_local_recorder(&recorder, || record_run(&report));

    assert_eq!(
        counter(&snapshotter, "ingest_runs_total", Some(("status", "committed"))),
        Some(1)
    );
    assert_eq!(counter(&snapshotter, "ingest_categories_inserted_total", None), Some(2));
    assert_eq!(counter(&snapshotter, "ingest_rows_considered_total", None), Some(3));
    assert_eq!(counter(&snapshotter, "ingest_rows_dropped_total", None), Some(1));
    assert_eq!(counter(&snapshotter, "ingest_rows_upserted_total", None), Some(2));
}

#[test]
fn aborted_run_only_counts_the_status() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let ctx = ctx("t2");
    let report = RunReport::aborted(&ctx, InputTally::default(), &IngestError::RunInProgress);

    metrics::with_local_recorder(&recorder, || record_run(&report));

    assert_eq!(
        counter(&snapshotter, "ingest_runs_total", Some(("status", "run_in_progress"))),
        Some(1)
    );
    assert_eq!(counter(&snapshotter, "ingest_rows_upserted_total", None), None);
}
