// tests/common/mod.rs
#![allow(dead_code)]

use chrono::NaiveDate;
use std::path::Path;
use std::time::Duration;

use trending_ingest::store::{Store, StoreOptions};
use trending_ingest::{Category, Observation, PipelineSettings, RunContext};

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn cat(id: &str, title: &str) -> Category {
    Category {
        id: id.to_string(),
        title: title.to_string(),
    }
}

pub fn film_and_autos() -> Vec<Category> {
    vec![cat("1", "Film"), cat("2", "Autos")]
}

pub fn obs(video_id: &str, date: NaiveDate, category_id: &str, views: Option<i64>) -> Observation {
    Observation {
        video_id: video_id.to_string(),
        trending_date: date,
        title: Some(format!("{video_id} title")),
        channel_title: Some("channel".to_string()),
        category_id: category_id.to_string(),
        publish_time: None,
        views,
        likes: views.map(|v| v / 10),
        dislikes: Some(0),
        comment_count: Some(1),
    }
}

pub fn ctx(run_id: &str) -> RunContext {
    RunContext::new(run_id, PipelineSettings { batch_rows: 7 })
}

pub fn open_file_store(path: &Path, busy_ms: u64) -> Store {
    Store::open(
        path,
        StoreOptions {
            busy_timeout: Duration::from_millis(busy_ms),
        },
    )
    .expect("open store")
}
