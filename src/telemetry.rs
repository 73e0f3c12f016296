// src/telemetry.rs
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::pipeline::RunReport;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Pipeline runs by terminal status.");
        describe_counter!(
            "ingest_categories_inserted_total",
            "Category rows created by the dimension load."
        );
        describe_counter!(
            "ingest_rows_considered_total",
            "Fact rows newer than the watermark."
        );
        describe_counter!(
            "ingest_rows_dropped_total",
            "Fact rows dropped for an unknown category."
        );
        describe_counter!(
            "ingest_rows_upserted_total",
            "Fact rows inserted or refreshed."
        );
        describe_histogram!("ingest_run_ms", "Run duration in milliseconds.");
        describe_gauge!(
            "ingest_watermark_ts",
            "Unix ts of the latest committed trending day."
        );
        describe_gauge!("ingest_last_run_ts", "Unix ts when the last run finished.");
    });
}

/// Emits the counters of one finished run. Aborted runs only bump the status
/// counter: their writes were rolled back.
pub fn record_run(report: &RunReport) {
    ensure_metrics_described();

    let status = match report.error_kind() {
        None => "committed",
        Some(kind) => kind.as_str(),
    };
    counter!("ingest_runs_total", "status" => status).increment(1);
    histogram!("ingest_run_ms").record(report.duration_ms as f64);
    gauge!("ingest_last_run_ts").set(report.finished_at.timestamp() as f64);

    if !report.is_committed() {
        return;
    }
    counter!("ingest_categories_inserted_total").increment(report.categories_inserted as u64);
    counter!("ingest_rows_considered_total").increment(report.rows_considered as u64);
    counter!("ingest_rows_dropped_total").increment(report.rows_dropped_missing_category as u64);
    counter!("ingest_rows_upserted_total").increment(report.rows_upserted as u64);
    if let Some(wm) = report.watermark_after {
        let ts = wm.and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp()).unwrap_or(0);
        gauge!("ingest_watermark_ts").set(ts as f64);
    }
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the global Prometheus recorder.
    pub fn install() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// A recorder that is not installed globally; renders an empty exposition.
    pub fn detached() -> Self {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        Self { handle }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}
