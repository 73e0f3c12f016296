// src/pipeline/observations.rs
use chrono::NaiveDate;
use rusqlite::types::Value;
use std::collections::HashMap;

use crate::error::IngestError;
use crate::model::{date_to_store, Observation};
use crate::pipeline::RunContext;
use crate::store::upsert::{OnConflict, UpsertRow, UpsertSpec};
use crate::store::UnitOfWork;

/// Facts are keyed by (video, day). On conflict the measures and the title are
/// refreshed; identity, channel, category and publish time stay as first seen.
pub const OBSERVATION_UPSERT: UpsertSpec = UpsertSpec {
    table: "trending_videos",
    columns: &[
        "video_id",
        "trending_date",
        "title",
        "channel_title",
        "category_id",
        "publish_time",
        "views",
        "likes",
        "dislikes",
        "comment_count",
    ],
    conflict_key: &["video_id", "trending_date"],
    on_conflict: OnConflict::Overwrite(&["title", "views", "likes", "dislikes", "comment_count"]),
};

fn opt_text(v: &Option<String>) -> Value {
    v.clone().map(Value::Text).unwrap_or(Value::Null)
}

fn opt_int(v: Option<i64>) -> Value {
    v.map(Value::Integer).unwrap_or(Value::Null)
}

impl UpsertRow for Observation {
    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.video_id.clone()),
            Value::Text(date_to_store(self.trending_date)),
            opt_text(&self.title),
            opt_text(&self.channel_title),
            Value::Text(self.category_id.clone()),
            self.publish_time
                .map(|t| Value::Text(t.to_rfc3339()))
                .unwrap_or(Value::Null),
            opt_int(self.views),
            opt_int(self.likes),
            opt_int(self.dislikes),
            opt_int(self.comment_count),
        ]
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub upserted: usize,
    pub inserted: usize,
    pub updated: usize,
    pub duplicates_collapsed: usize,
}

/// Collapses repeated (video, day) keys, last occurrence wins. The surviving
/// row sits where the key first appeared.
pub fn collapse_duplicates(rows: Vec<Observation>) -> (Vec<Observation>, usize) {
    let mut slot: HashMap<(String, NaiveDate), usize> = HashMap::with_capacity(rows.len());
    let mut out: Vec<Observation> = Vec::with_capacity(rows.len());
    let mut collapsed = 0usize;

    for row in rows {
        let key = (row.video_id.clone(), row.trending_date);
        match slot.get(&key) {
            Some(&i) => {
                out[i] = row;
                collapsed += 1;
            }
            None => {
                slot.insert(key, out.len());
                out.push(row);
            }
        }
    }
    (out, collapsed)
}

pub fn write(
    uow: &UnitOfWork<'_>,
    ctx: &RunContext,
    rows: Vec<Observation>,
) -> Result<WriteOutcome, IngestError> {
    let (rows, duplicates_collapsed) = collapse_duplicates(rows);
    if duplicates_collapsed > 0 {
        tracing::info!(
            target: "ingest",
            run_id = %ctx.run_id,
            duplicates_collapsed,
            "collapsed repeated (video, day) rows, last wins"
        );
    }
    if rows.is_empty() {
        return Ok(WriteOutcome {
            duplicates_collapsed,
            ..WriteOutcome::default()
        });
    }

    let last_id = uow.last_observation_id()?;
    let upserted = uow.upsert(&OBSERVATION_UPSERT, &rows, ctx.settings.batch_rows)?;
    let inserted = uow.observations_created_after(last_id)?;

    let outcome = WriteOutcome {
        upserted,
        inserted,
        updated: upserted.saturating_sub(inserted),
        duplicates_collapsed,
    };
    tracing::info!(
        target: "ingest",
        run_id = %ctx.run_id,
        upserted = outcome.upserted,
        inserted = outcome.inserted,
        updated = outcome.updated,
        "video records ingested"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pipeline::PipelineSettings;
    use crate::store::Store;

    fn row(video_id: &str, views: Option<i64>) -> Observation {
        Observation {
            video_id: video_id.into(),
            trending_date: NaiveDate::from_ymd_opt(2017, 11, 14).unwrap(),
            title: Some(format!("title {video_id}")),
            channel_title: Some("chan".into()),
            category_id: "1".into(),
            publish_time: None,
            views,
            likes: Some(1),
            dislikes: Some(0),
            comment_count: Some(2),
        }
    }

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .connection()
            .execute("INSERT INTO categories (id, title) VALUES ('1', 'Film')", [])
            .unwrap();
        store
    }

    #[test]
    fn upsert_columns_match_row_values() {
        OBSERVATION_UPSERT.validate().unwrap();
        assert_eq!(row("a", None).values().len(), OBSERVATION_UPSERT.columns.len());
    }

    #[test]
    fn collapse_keeps_last_values_at_first_position() {
        let (rows, n) = collapse_duplicates(vec![
            row("a", Some(1)),
            row("b", Some(5)),
            row("a", Some(3)),
        ]);
        assert_eq!(n, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].video_id, "a");
        assert_eq!(rows[0].views, Some(3));
    }

    #[test]
    fn second_write_updates_and_null_overwrites() {
        let mut store = seeded_store();
        let ctx = RunContext::new("t", PipelineSettings { batch_rows: 1 });
        {
            let uow = store.begin().unwrap();
            let out = write(&uow, &ctx, vec![row("a", Some(10)), row("b", Some(20))]).unwrap();
            assert_eq!((out.inserted, out.updated), (2, 0));
            uow.commit().unwrap();
        }
        let id_before = store
            .observation("a", NaiveDate::from_ymd_opt(2017, 11, 14).unwrap())
            .unwrap()
            .unwrap()
            .id;
        {
            let uow = store.begin().unwrap();
            let out = write(&uow, &ctx, vec![row("a", None), row("c", Some(1))]).unwrap();
            assert_eq!((out.upserted, out.inserted, out.updated), (2, 1, 1));
            uow.commit().unwrap();
        }
        let a = store
            .observation("a", NaiveDate::from_ymd_opt(2017, 11, 14).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(a.id, id_before);
        assert_eq!(a.views, None);
        assert_eq!(store.observation_count().unwrap(), 3);
    }

    #[test]
    fn unknown_category_surfaces_as_constraint_violation() {
        let mut store = seeded_store();
        let ctx = RunContext::new("t", PipelineSettings::default());
        let uow = store.begin().unwrap();
        let mut bad = row("x", Some(1));
        bad.category_id = "404".into();
        let err = write(&uow, &ctx, vec![bad]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }
}
