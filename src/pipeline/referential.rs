// src/pipeline/referential.rs
use std::collections::{BTreeSet, HashSet};

use crate::model::Observation;
use crate::pipeline::RunContext;

/// Most missing ids we name in a single log line.
const MAX_LOGGED_IDS: usize = 10;

#[derive(Debug, Default)]
pub struct Partition {
    pub kept: Vec<Observation>,
    pub dropped: Vec<Observation>,
}

impl Partition {
    /// Distinct category ids that had no dimension row, sorted.
    pub fn missing_ids(&self) -> BTreeSet<&str> {
        self.dropped.iter().map(|o| o.category_id.as_str()).collect()
    }
}

/// Splits rows by whether their category exists. Order within each side is
/// the input order, so the split is reproducible for a fixed batch and
/// dimension snapshot.
pub fn partition(ctx: &RunContext, rows: Vec<Observation>, valid: &HashSet<String>) -> Partition {
    let (kept, dropped): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .partition(|o| valid.contains(&o.category_id));
    let part = Partition { kept, dropped };

    if !part.dropped.is_empty() {
        let missing: Vec<&str> = part.missing_ids().into_iter().take(MAX_LOGGED_IDS).collect();
        tracing::warn!(
            target: "ingest",
            run_id = %ctx.run_id,
            dropped = part.dropped.len(),
            missing = ?missing,
            "dropped rows due to missing category"
        );
    }
    part
}
