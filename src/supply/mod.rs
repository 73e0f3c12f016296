// src/supply/mod.rs
pub mod export;
pub mod files;

use serde::Deserialize;
use std::io::Read;

use crate::error::IngestError;
use crate::model::{parse_publish_time, parse_trending_date, Category, Observation};

/// Both inputs of one run, fully materialized before the unit of work starts.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub categories: Vec<Category>,
    pub observations: Vec<Observation>,
    /// Publish times that could not be parsed and were stored as null.
    pub publish_times_coerced: usize,
}

/// Parsed fact stream plus its lenient-parse tally.
#[derive(Debug, Clone, Default)]
pub struct ParsedObservations {
    pub rows: Vec<Observation>,
    pub publish_times_coerced: usize,
}

#[async_trait::async_trait]
pub trait RawSupplier: Send + Sync {
    async fn categories(&self) -> Result<Vec<Category>, IngestError>;
    async fn observations(&self) -> Result<ParsedObservations, IngestError>;
    fn name(&self) -> &'static str;

    /// Materializes the dimension first: without it no fact can be validated.
    async fn fetch(&self) -> Result<RawBatch, IngestError> {
        let categories = self.categories().await?;
        let parsed = self.observations().await?;
        Ok(RawBatch {
            categories,
            observations: parsed.rows,
            publish_times_coerced: parsed.publish_times_coerced,
        })
    }
}

// --- category dimension (JSON) ---

#[derive(Debug, Deserialize)]
struct CategoryFile {
    items: Vec<CategoryItem>,
}
#[derive(Debug, Deserialize)]
struct CategoryItem {
    id: Option<String>,
    snippet: Option<Snippet>,
}
#[derive(Debug, Deserialize)]
struct Snippet {
    title: Option<String>,
}

pub fn parse_categories(bytes: &[u8]) -> Result<Vec<Category>, IngestError> {
    let file: CategoryFile = serde_json::from_slice(bytes)
        .map_err(|e| IngestError::malformed("category file", e.to_string()))?;

    let mut out = Vec::with_capacity(file.items.len());
    for (i, item) in file.items.into_iter().enumerate() {
        let id = item.id.map(|s| s.trim().to_string()).unwrap_or_default();
        if id.is_empty() {
            return Err(IngestError::malformed(
                "category file",
                format!("item {i} has an empty id"),
            ));
        }
        let title = item.snippet.and_then(|s| s.title).ok_or_else(|| {
            IngestError::malformed("category file", format!("category {id} has no title"))
        })?;
        out.push(Category { id, title });
    }
    Ok(out)
}

// --- trending fact stream (CSV) ---

#[derive(Debug, Deserialize)]
struct VideoRecord {
    video_id: String,
    trending_date: String,
    title: Option<String>,
    channel_title: Option<String>,
    category_id: Option<String>,
    publish_time: Option<String>,
    views: Option<String>,
    likes: Option<String>,
    dislikes: Option<String>,
    comment_count: Option<String>,
}

/// Parses the trending CSV. A bad `trending_date` fails the whole batch (the
/// watermark comparison depends on it); a bad `publish_time` becomes null.
pub fn parse_observations<R: Read>(reader: R) -> Result<ParsedObservations, IngestError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let csv_err = |e: csv::Error| IngestError::malformed("video file", e.to_string());
    let headers = rdr.headers().map_err(csv_err)?.clone();
    let mut record = csv::StringRecord::new();

    let mut parsed = ParsedObservations::default();
    while rdr.read_record(&mut record).map_err(csv_err)? {
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let at = |detail: String| IngestError::malformed("video file", format!("line {line}: {detail}"));
        let rec: VideoRecord = record
            .deserialize(Some(&headers))
            .map_err(|e| at(e.to_string()))?;

        let video_id = rec.video_id.trim().to_string();
        if video_id.is_empty() {
            return Err(at("empty video_id".into()));
        }
        let trending_date =
            parse_trending_date(&rec.trending_date).map_err(|e| at(e.to_string()))?;

        let publish_time = match rec.publish_time.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let t = parse_publish_time(raw);
                if t.is_none() {
                    parsed.publish_times_coerced += 1;
                    tracing::debug!(target: "ingest", line, raw, "unparseable publish_time stored as null");
                }
                t
            }
        };

        parsed.rows.push(Observation {
            video_id,
            trending_date,
            title: rec.title,
            channel_title: rec.channel_title,
            category_id: rec.category_id.map(|s| s.trim().to_string()).unwrap_or_default(),
            publish_time,
            views: parse_measure("views", rec.views.as_deref()).map_err(at)?,
            likes: parse_measure("likes", rec.likes.as_deref()).map_err(at)?,
            dislikes: parse_measure("dislikes", rec.dislikes.as_deref()).map_err(at)?,
            comment_count: parse_measure("comment_count", rec.comment_count.as_deref())
                .map_err(at)?,
        });
    }
    Ok(parsed)
}

fn parse_measure(column: &str, raw: Option<&str>) -> Result<Option<i64>, String> {
    let s = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(s) => s,
    };
    match s.parse::<i64>() {
        Ok(v) if v >= 0 => Ok(Some(v)),
        Ok(v) => Err(format!("{column} is negative ({v})")),
        Err(_) => Err(format!("{column} is not an integer ({s:?})")),
    }
}

/// In-memory supplier for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySupplier {
    pub categories: Vec<Category>,
    pub observations: Vec<Observation>,
}

impl MemorySupplier {
    pub fn new(categories: Vec<Category>, observations: Vec<Observation>) -> Self {
        Self {
            categories,
            observations,
        }
    }
}

#[async_trait::async_trait]
impl RawSupplier for MemorySupplier {
    async fn categories(&self) -> Result<Vec<Category>, IngestError> {
        Ok(self.categories.clone())
    }
    async fn observations(&self) -> Result<ParsedObservations, IngestError> {
        Ok(ParsedObservations {
            rows: self.observations.clone(),
            publish_times_coerced: 0,
        })
    }
    fn name(&self) -> &'static str {
        "memory"
    }
}
