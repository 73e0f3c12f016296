// src/store/upsert.rs
//! One set-based insert primitive for both conflict strategies: the category
//! dimension ignores conflicting keys, the trending facts overwrite a chosen
//! subset of columns.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Transaction};

use crate::error::IngestError;

/// Bound-parameter ceiling of the bundled SQLite (`SQLITE_MAX_VARIABLE_NUMBER`).
pub const MAX_BOUND_PARAMS: usize = 32_766;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// `DO NOTHING`: existing rows stay untouched.
    Ignore,
    /// `DO UPDATE SET c = excluded.c` for each listed column.
    Overwrite(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct UpsertSpec {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub conflict_key: &'static [&'static str],
    pub on_conflict: OnConflict,
}

/// A record that binds its values in `UpsertSpec::columns` order.
pub trait UpsertRow {
    fn values(&self) -> Vec<Value>;
}

impl UpsertSpec {
    pub fn validate(&self) -> Result<(), IngestError> {
        let bad = |msg: String| Err(IngestError::ConstraintViolation(format!("{}: {msg}", self.table)));
        if self.columns.is_empty() {
            return bad("upsert has no columns".into());
        }
        if self.conflict_key.is_empty() {
            return bad("upsert has no conflict key".into());
        }
        for k in self.conflict_key {
            if !self.columns.contains(k) {
                return bad(format!("conflict key column {k} is not inserted"));
            }
        }
        if let OnConflict::Overwrite(cols) = self.on_conflict {
            if cols.is_empty() {
                return bad("overwrite list is empty".into());
            }
            for c in cols {
                if !self.columns.contains(c) {
                    return bad(format!("overwrite column {c} is not inserted"));
                }
                if self.conflict_key.contains(c) {
                    return bad(format!("overwrite column {c} is part of the conflict key"));
                }
            }
        }
        Ok(())
    }

    /// Largest tuple count one statement may carry: the caller's chunk size,
    /// capped so the statement stays under the store's parameter ceiling.
    pub fn rows_per_statement(&self, chunk_rows: usize) -> usize {
        let ceiling = MAX_BOUND_PARAMS / self.columns.len().max(1);
        chunk_rows.min(ceiling).max(1)
    }

    /// Statement text for `rows` tuples.
    pub fn statement(&self, rows: usize) -> String {
        let tuple = format!("({})", vec!["?"; self.columns.len()].join(", "));
        let values = vec![tuple; rows].join(", ");
        let action = match self.on_conflict {
            OnConflict::Ignore => "DO NOTHING".to_string(),
            OnConflict::Overwrite(cols) => {
                let sets: Vec<String> = cols.iter().map(|c| format!("{c} = excluded.{c}")).collect();
                format!("DO UPDATE SET {}", sets.join(", "))
            }
        };
        format!(
            "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) {}",
            self.table,
            self.columns.join(", "),
            values,
            self.conflict_key.join(", "),
            action
        )
    }
}

/// Writes `rows` with multi-row statements of at most `chunk_rows` tuples each,
/// all on the caller's transaction. Returns the store's affected-row count:
/// inserted rows plus, for `Overwrite`, updated rows.
pub fn upsert<R: UpsertRow>(
    tx: &Transaction<'_>,
    spec: &UpsertSpec,
    rows: &[R],
    chunk_rows: usize,
) -> Result<usize, IngestError> {
    spec.validate()?;
    if rows.is_empty() {
        return Ok(0);
    }
    let chunk_rows = spec.rows_per_statement(chunk_rows);
    let mut affected = 0usize;

    for chunk in rows.chunks(chunk_rows) {
        let mut params = Vec::with_capacity(chunk.len() * spec.columns.len());
        for row in chunk {
            let vals = row.values();
            if vals.len() != spec.columns.len() {
                return Err(IngestError::ConstraintViolation(format!(
                    "{}: row binds {} values for {} columns",
                    spec.table,
                    vals.len(),
                    spec.columns.len()
                )));
            }
            params.extend(vals);
        }
        let mut stmt = tx.prepare_cached(&spec.statement(chunk.len()))?;
        affected += stmt.execute(params_from_iter(params))?;
    }

    Ok(affected)
}
