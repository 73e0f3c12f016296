// src/pipeline/categories.rs
use rusqlite::types::Value;

use crate::error::IngestError;
use crate::model::Category;
use crate::pipeline::RunContext;
use crate::store::upsert::{OnConflict, UpsertRow, UpsertSpec};
use crate::store::UnitOfWork;

/// The dimension is append-only: a known id keeps the title it was created with.
pub const CATEGORY_UPSERT: UpsertSpec = UpsertSpec {
    table: "categories",
    columns: &["id", "title"],
    conflict_key: &["id"],
    on_conflict: OnConflict::Ignore,
};

impl UpsertRow for Category {
    fn values(&self) -> Vec<Value> {
        vec![Value::Text(self.id.clone()), Value::Text(self.title.clone())]
    }
}

/// Inserts unseen categories. Returns how many rows were actually created.
pub fn load(
    uow: &UnitOfWork<'_>,
    ctx: &RunContext,
    categories: &[Category],
) -> Result<usize, IngestError> {
    if let Some(bad) = categories.iter().find(|c| c.id.trim().is_empty()) {
        return Err(IngestError::malformed(
            "category file",
            format!("empty category id (title {:?})", bad.title),
        ));
    }
    let inserted = uow.upsert(&CATEGORY_UPSERT, categories, ctx.settings.batch_rows)?;
    tracing::info!(
        target: "ingest",
        supplied = categories.len(),
        inserted,
        "categories loaded"
    );
    Ok(inserted)
}
