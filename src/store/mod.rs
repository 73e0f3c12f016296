// src/store/mod.rs
//! SQLite-backed relational store: schema, unit of work, and the read queries
//! the pipeline and the status surface need.

pub mod upsert;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{is_busy, IngestError};
use crate::model::{date_from_store, date_to_store};
use upsert::{upsert, UpsertRow, UpsertSpec};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id    TEXT PRIMARY KEY NOT NULL CHECK (length(id) > 0),
    title TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trending_videos (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    video_id      TEXT NOT NULL CHECK (length(video_id) > 0),
    trending_date TEXT NOT NULL,
    title         TEXT,
    channel_title TEXT,
    category_id   TEXT REFERENCES categories(id),
    publish_time  TEXT,
    views         INTEGER CHECK (views IS NULL OR views >= 0),
    likes         INTEGER CHECK (likes IS NULL OR likes >= 0),
    dislikes      INTEGER CHECK (dislikes IS NULL OR dislikes >= 0),
    comment_count INTEGER CHECK (comment_count IS NULL OR comment_count >= 0),
    CONSTRAINT uq_video_trending_day UNIQUE (video_id, trending_date)
);

CREATE INDEX IF NOT EXISTS idx_trending_videos_date ON trending_videos (trending_date);
";

/// A persisted observation as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredObservation {
    pub id: i64,
    pub video_id: String,
    pub trending_date: String,
    pub title: Option<String>,
    pub channel_title: Option<String>,
    pub category_id: Option<String>,
    pub publish_time: Option<String>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub dislikes: Option<i64>,
    pub comment_count: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5_000),
        }
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (and migrates) the database file. Missing parent directories are
    /// not created: an unopenable path is reported as `StoreUnavailable`.
    pub fn open(path: &Path, opts: StoreOptions) -> Result<Self, IngestError> {
        let conn = Connection::open(path).map_err(|e| {
            IngestError::StoreUnavailable(format!("opening {}: {e}", path.display()))
        })?;
        Self::init(conn, opts)
    }

    pub fn open_in_memory() -> Result<Self, IngestError> {
        Self::init(Connection::open_in_memory()?, StoreOptions::default())
    }

    fn init(conn: Connection, opts: StoreOptions) -> Result<Self, IngestError> {
        conn.busy_timeout(opts.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Starts the run's unit of work. The transaction is `IMMEDIATE`, so it
    /// holds the database write lock from the watermark read to the commit; a
    /// second writer that cannot get the lock within the busy timeout is
    /// refused with `RunInProgress`.
    pub fn begin(&mut self) -> Result<UnitOfWork<'_>, IngestError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| {
                if is_busy(&e) {
                    IngestError::RunInProgress
                } else {
                    IngestError::from(e)
                }
            })?;
        Ok(UnitOfWork { tx })
    }

    pub fn watermark(&self) -> Result<Option<NaiveDate>, IngestError> {
        max_trending_date(&self.conn)
    }

    pub fn category_count(&self) -> Result<usize, IngestError> {
        count_rows(&self.conn, "categories")
    }

    pub fn observation_count(&self) -> Result<usize, IngestError> {
        count_rows(&self.conn, "trending_videos")
    }

    pub fn category_title(&self, id: &str) -> Result<Option<String>, IngestError> {
        Ok(self
            .conn
            .query_row("SELECT title FROM categories WHERE id = ?1", [id], |r| r.get(0))
            .optional()?)
    }

    pub fn observation(
        &self,
        video_id: &str,
        trending_date: NaiveDate,
    ) -> Result<Option<StoredObservation>, IngestError> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_OBSERVATION} WHERE video_id = ?1 AND trending_date = ?2"
        ))?;
        Ok(stmt
            .query_row(
                rusqlite::params![video_id, date_to_store(trending_date)],
                read_observation,
            )
            .optional()?)
    }

    /// Every persisted observation, ordered by natural key.
    pub fn observations(&self) -> Result<Vec<StoredObservation>, IngestError> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_OBSERVATION} ORDER BY video_id, trending_date"
        ))?;
        let rows = stmt.query_map([], read_observation)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Raw connection access for tooling and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// One pipeline run's writes. Dropping it without `commit` rolls back.
pub struct UnitOfWork<'c> {
    tx: Transaction<'c>,
}

impl UnitOfWork<'_> {
    pub fn max_trending_date(&self) -> Result<Option<NaiveDate>, IngestError> {
        max_trending_date(&self.tx)
    }

    pub fn category_ids(&self) -> Result<HashSet<String>, IngestError> {
        let mut stmt = self.tx.prepare("SELECT id FROM categories")?;
        let ids = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for id in ids {
            out.insert(id?);
        }
        Ok(out)
    }

    /// Highest surrogate id handed out so far (0 for a fresh table).
    pub fn last_observation_id(&self) -> Result<i64, IngestError> {
        Ok(self.tx.query_row(
            "SELECT COALESCE(MAX(id), 0) FROM trending_videos",
            [],
            |r| r.get(0),
        )?)
    }

    /// Rows created after `id`. Ids are AUTOINCREMENT, so this is a range
    /// scan over the rows of the current run only.
    pub fn observations_created_after(&self, id: i64) -> Result<usize, IngestError> {
        let n: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM trending_videos WHERE id > ?1",
            [id],
            |r| r.get(0),
        )?;
        Ok(n.max(0) as usize)
    }

    pub fn upsert<R: UpsertRow>(
        &self,
        spec: &UpsertSpec,
        rows: &[R],
        chunk_rows: usize,
    ) -> Result<usize, IngestError> {
        upsert(&self.tx, spec, rows, chunk_rows)
    }

    pub fn commit(self) -> Result<(), IngestError> {
        self.tx
            .commit()
            .map_err(|e| IngestError::StoreUnavailable(format!("commit failed: {e}")))
    }

    pub fn rollback(self) -> Result<(), IngestError> {
        Ok(self.tx.rollback()?)
    }
}

const SELECT_OBSERVATION: &str = "SELECT id, video_id, trending_date, title, channel_title, \
     category_id, publish_time, views, likes, dislikes, comment_count FROM trending_videos";

fn read_observation(r: &rusqlite::Row<'_>) -> rusqlite::Result<StoredObservation> {
    Ok(StoredObservation {
        id: r.get(0)?,
        video_id: r.get(1)?,
        trending_date: r.get(2)?,
        title: r.get(3)?,
        channel_title: r.get(4)?,
        category_id: r.get(5)?,
        publish_time: r.get(6)?,
        views: r.get(7)?,
        likes: r.get(8)?,
        dislikes: r.get(9)?,
        comment_count: r.get(10)?,
    })
}

fn max_trending_date(conn: &Connection) -> Result<Option<NaiveDate>, IngestError> {
    let raw: Option<String> =
        conn.query_row("SELECT MAX(trending_date) FROM trending_videos", [], |r| r.get(0))?;
    match raw {
        None => Ok(None),
        Some(s) => date_from_store(&s).map(Some).ok_or_else(|| {
            IngestError::StoreUnavailable(format!("stored trending_date {s:?} is not a date"))
        }),
    }
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize, IngestError> {
    let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
    Ok(n.max(0) as usize)
}
