// src/pipeline/mod.rs
//! Run orchestration: one unit of work per run covering the category load,
//! the watermark read, the referential filter and the fact upsert.
//!
//! Either every write of a run becomes visible at commit, or none does.

pub mod categories;
pub mod observations;
pub mod referential;
pub mod watermark;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::Instrument;

use crate::config::IngestConfig;
use crate::error::{ErrorKind, IngestError};
use crate::store::{Store, StoreOptions, UnitOfWork};
use crate::supply::files::FileSupplier;
use crate::supply::{RawBatch, RawSupplier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Rows per multi-row upsert statement.
    pub batch_rows: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { batch_rows: 500 }
    }
}

/// Per-run context handed to every step instead of process-wide state.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub settings: PipelineSettings,
    pub span: tracing::Span,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, settings: PipelineSettings) -> Self {
        let run_id = run_id.into();
        let span = tracing::info_span!(target: "ingest", "ingest_run", run_id = %run_id);
        Self {
            run_id,
            started_at: Utc::now(),
            settings,
            span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Committed,
    Aborted,
}

impl RunState {
    pub fn can_transition(self, to: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, to),
            (Idle, Running)
                | (Committed, Running)
                | (Aborted, Running)
                | (Running, Committed)
                | (Running, Aborted)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Committed,
    Aborted { kind: ErrorKind, message: String },
}

/// What an operator needs to tell "nothing new" from "pipeline broken".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    NoNewData,
    /// Newer rows arrived but every one referenced an unknown category.
    AllDropped,
    Ingested,
    Failed(ErrorKind),
}

/// Input sizes known before the unit of work starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputTally {
    pub categories_supplied: usize,
    pub rows_supplied: usize,
    pub publish_times_coerced: usize,
}

impl InputTally {
    pub fn of(batch: &RawBatch) -> Self {
        Self {
            categories_supplied: batch.categories.len(),
            rows_supplied: batch.observations.len(),
            publish_times_coerced: batch.publish_times_coerced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: RunStatus,
    pub categories_supplied: usize,
    pub categories_inserted: usize,
    pub rows_supplied: usize,
    /// Rows newer than the watermark.
    pub rows_considered: usize,
    pub rows_stale: usize,
    pub rows_dropped_missing_category: usize,
    pub duplicates_collapsed: usize,
    pub rows_upserted: usize,
    pub rows_inserted: usize,
    pub rows_updated: usize,
    pub publish_times_coerced: usize,
    pub watermark_before: Option<NaiveDate>,
    pub watermark_after: Option<NaiveDate>,
}

impl RunReport {
    fn started(ctx: &RunContext, tally: InputTally) -> Self {
        Self {
            run_id: ctx.run_id.clone(),
            started_at: ctx.started_at,
            finished_at: ctx.started_at,
            duration_ms: 0,
            status: RunStatus::Committed,
            categories_supplied: tally.categories_supplied,
            categories_inserted: 0,
            rows_supplied: tally.rows_supplied,
            rows_considered: 0,
            rows_stale: 0,
            rows_dropped_missing_category: 0,
            duplicates_collapsed: 0,
            rows_upserted: 0,
            rows_inserted: 0,
            rows_updated: 0,
            publish_times_coerced: tally.publish_times_coerced,
            watermark_before: None,
            watermark_after: None,
        }
    }

    /// Report of a rolled-back run: input counts survive, write counts are zero.
    pub fn aborted(ctx: &RunContext, tally: InputTally, err: &IngestError) -> Self {
        let mut r = Self::started(ctx, tally);
        r.status = RunStatus::Aborted {
            kind: err.kind(),
            message: err.to_string(),
        };
        r.finish();
        r
    }

    fn finish(&mut self) {
        self.finished_at = Utc::now();
        self.duration_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.status, RunStatus::Committed)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.status {
            RunStatus::Committed => None,
            RunStatus::Aborted { kind, .. } => Some(*kind),
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        match &self.status {
            RunStatus::Aborted { kind, .. } => RunOutcome::Failed(*kind),
            RunStatus::Committed if self.rows_considered == 0 => RunOutcome::NoNewData,
            RunStatus::Committed if self.rows_upserted == 0 => RunOutcome::AllDropped,
            RunStatus::Committed => RunOutcome::Ingested,
        }
    }
}

/// Runs one batch against the store inside a single unit of work.
pub fn execute(
    store: &mut Store,
    ctx: &RunContext,
    batch: RawBatch,
) -> Result<RunReport, IngestError> {
    let _entered = ctx.span.enter();
    let mut report = RunReport::started(ctx, InputTally::of(&batch));

    let uow = store.begin()?;
    tracing::debug!(target: "ingest", from = ?RunState::Idle, to = ?RunState::Running, "run state");

    match apply(&uow, ctx, batch, &mut report) {
        Ok(()) => {
            uow.commit()?;
            tracing::debug!(target: "ingest", from = ?RunState::Running, to = ?RunState::Committed, "run state");
        }
        Err(e) => {
            if let Err(rb) = uow.rollback() {
                tracing::error!(target: "ingest", error = %rb, "rollback failed");
            }
            tracing::debug!(target: "ingest", from = ?RunState::Running, to = ?RunState::Aborted, "run state");
            return Err(e);
        }
    }

    report.finish();
    Ok(report)
}

fn apply(
    uow: &UnitOfWork<'_>,
    ctx: &RunContext,
    batch: RawBatch,
    report: &mut RunReport,
) -> Result<(), IngestError> {
    report.categories_inserted = categories::load(uow, ctx, &batch.categories)?;

    let wm = watermark::resolve(uow)?;
    report.watermark_before = wm;
    report.watermark_after = wm;

    let bounded = watermark::bound(batch.observations, wm);
    report.rows_considered = bounded.fresh.len();
    report.rows_stale = bounded.stale;
    if let Some(wm) = wm {
        tracing::info!(target: "ingest", watermark = %wm, stale = bounded.stale, "filtering for new data");
    }
    if bounded.fresh.is_empty() {
        tracing::info!(target: "ingest", "no new records to ingest");
        return Ok(());
    }

    let valid = uow.category_ids()?;
    let part = referential::partition(ctx, bounded.fresh, &valid);
    report.rows_dropped_missing_category = part.dropped.len();

    let written = observations::write(uow, ctx, part.kept)?;
    report.duplicates_collapsed = written.duplicates_collapsed;
    report.rows_upserted = written.upserted;
    report.rows_inserted = written.inserted;
    report.rows_updated = written.updated;

    report.watermark_after = watermark::resolve(uow)?;
    Ok(())
}

/// Async driver: owns the store and the supplier, serializes runs in-process.
pub struct Pipeline {
    store: Arc<Mutex<Store>>,
    supplier: Arc<dyn RawSupplier>,
    settings: PipelineSettings,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<RunState>,
    seq: AtomicU64,
}

impl Pipeline {
    pub fn new(store: Store, supplier: Arc<dyn RawSupplier>, settings: PipelineSettings) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            supplier,
            settings,
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(RunState::Idle),
            seq: AtomicU64::new(0),
        }
    }

    pub fn from_config(cfg: &IngestConfig) -> Result<Self, IngestError> {
        let store = Store::open(
            &cfg.database_path,
            StoreOptions {
                busy_timeout: std::time::Duration::from_millis(cfg.busy_timeout_ms),
            },
        )?;
        Ok(Self::new(
            store,
            Arc::new(FileSupplier::from_config(cfg)),
            PipelineSettings {
                batch_rows: cfg.batch_rows,
            },
        ))
    }

    pub fn store(&self) -> Arc<Mutex<Store>> {
        self.store.clone()
    }

    pub fn state(&self) -> RunState {
        self.state.lock().map(|s| *s).unwrap_or(RunState::Aborted)
    }

    fn set_state(&self, to: RunState) {
        if let Ok(mut s) = self.state.lock() {
            if !s.can_transition(to) {
                tracing::warn!(target: "ingest", from = ?*s, to = ?to, "illegal run state transition ignored");
                return;
            }
            *s = to;
        }
    }

    fn next_context(&self) -> RunContext {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("{}-{n:04}", Utc::now().format("%Y%m%dT%H%M%SZ"));
        RunContext::new(id, self.settings)
    }

    /// One full run. Never panics and never returns early without a report:
    /// failures come back as `RunStatus::Aborted`.
    pub async fn run_once(&self) -> RunReport {
        let ctx = self.next_context();

        let Ok(_gate) = self.gate.try_lock() else {
            let report = RunReport::aborted(&ctx, InputTally::default(), &IngestError::RunInProgress);
            tracing::warn!(target: "ingest", run_id = %ctx.run_id, "run skipped: another run is in flight");
            crate::telemetry::record_run(&report);
            return report;
        };

        self.set_state(RunState::Running);
        tracing::info!(target: "ingest", run_id = %ctx.run_id, supplier = self.supplier.name(), "ingest run started");

        let mut tally = InputTally::default();
        let result = match self.gather(&mut tally).instrument(ctx.span.clone()).await {
            Ok(batch) => self.execute_blocking(&ctx, batch).await,
            Err(e) => Err(e),
        };

        let report = match result {
            Ok(report) => {
                self.set_state(RunState::Committed);
                tracing::info!(
                    target: "ingest",
                    run_id = %report.run_id,
                    categories_inserted = report.categories_inserted,
                    considered = report.rows_considered,
                    dropped = report.rows_dropped_missing_category,
                    upserted = report.rows_upserted,
                    watermark = ?report.watermark_after,
                    "pipeline completed successfully"
                );
                report
            }
            Err(e) => {
                self.set_state(RunState::Aborted);
                tracing::error!(target: "ingest", run_id = %ctx.run_id, kind = e.kind().as_str(), error = %e, "pipeline failed");
                RunReport::aborted(&ctx, tally, &e)
            }
        };
        crate::telemetry::record_run(&report);
        report
    }

    /// Reads both inputs, tallying each as it arrives so a failed fact read
    /// still reports the dimension it saw.
    async fn gather(&self, tally: &mut InputTally) -> Result<RawBatch, IngestError> {
        let categories = self.supplier.categories().await?;
        tally.categories_supplied = categories.len();
        let parsed = self.supplier.observations().await?;
        let batch = RawBatch {
            categories,
            observations: parsed.rows,
            publish_times_coerced: parsed.publish_times_coerced,
        };
        *tally = InputTally::of(&batch);
        Ok(batch)
    }

    async fn execute_blocking(&self, ctx: &RunContext, batch: RawBatch) -> Result<RunReport, IngestError> {
        let store = self.store.clone();
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = store
                .lock()
                .map_err(|_| IngestError::StoreUnavailable("store mutex poisoned".into()))?;
            execute(&mut guard, &ctx, batch)
        })
        .await
        .map_err(|e| IngestError::StoreUnavailable(format!("ingest worker failed: {e}")))?
    }
}
