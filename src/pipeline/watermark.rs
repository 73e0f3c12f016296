// src/pipeline/watermark.rs
use chrono::NaiveDate;

use crate::error::IngestError;
use crate::model::Observation;
use crate::store::UnitOfWork;

/// Latest trending day already persisted, `None` for an empty store.
/// Always recomputed from the store.
pub fn resolve(uow: &UnitOfWork<'_>) -> Result<Option<NaiveDate>, IngestError> {
    uow.max_trending_date()
}

#[derive(Debug, Default)]
pub struct Bounded {
    /// Rows strictly newer than the watermark, in input order.
    pub fresh: Vec<Observation>,
    /// Rows at or before the watermark; never revisited.
    pub stale: usize,
}

pub fn bound(batch: Vec<Observation>, watermark: Option<NaiveDate>) -> Bounded {
    let Some(wm) = watermark else {
        return Bounded {
            fresh: batch,
            stale: 0,
        };
    };
    let total = batch.len();
    let fresh: Vec<Observation> = batch
        .into_iter()
        .filter(|o| o.trending_date > wm)
        .collect();
    Bounded {
        stale: total - fresh.len(),
        fresh,
    }
}
