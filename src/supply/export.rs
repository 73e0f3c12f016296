// src/supply/export.rs
//! Cleaned CSV export: the fact stream joined with category titles, dates in
//! ISO form. Independent of the store.

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::{date_to_store, Category, Observation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub rows: usize,
    pub unmapped: usize,
}

#[derive(Serialize)]
struct CleanedRow<'a> {
    video_id: &'a str,
    trending_date: String,
    title: Option<&'a str>,
    channel_title: Option<&'a str>,
    category_id: &'a str,
    category_title: Option<&'a str>,
    publish_time: Option<String>,
    views: Option<i64>,
    likes: Option<i64>,
    dislikes: Option<i64>,
    comment_count: Option<i64>,
}

pub fn write_cleaned_to<W: std::io::Write>(
    categories: &[Category],
    observations: &[Observation],
    out: W,
) -> Result<ExportSummary> {
    let titles: HashMap<&str, &str> = categories
        .iter()
        .map(|c| (c.id.as_str(), c.title.as_str()))
        .collect();

    let mut wtr = csv::Writer::from_writer(out);
    let mut summary = ExportSummary {
        rows: 0,
        unmapped: 0,
    };

    for o in observations {
        let category_title = titles.get(o.category_id.as_str()).copied();
        if category_title.is_none() {
            summary.unmapped += 1;
        }
        wtr.serialize(CleanedRow {
            video_id: &o.video_id,
            trending_date: date_to_store(o.trending_date),
            title: o.title.as_deref(),
            channel_title: o.channel_title.as_deref(),
            category_id: &o.category_id,
            category_title,
            publish_time: o.publish_time.map(|t| t.to_rfc3339()),
            views: o.views,
            likes: o.likes,
            dislikes: o.dislikes,
            comment_count: o.comment_count,
        })
        .context("writing cleaned csv row")?;
        summary.rows += 1;
    }
    wtr.flush().context("flushing cleaned csv")?;

    if summary.unmapped > 0 {
        tracing::warn!(target: "ingest", unmapped = summary.unmapped, "rows have unmapped categories");
    } else {
        tracing::info!(target: "ingest", "all categories mapped");
    }
    Ok(summary)
}

/// Writes the cleaned CSV to `path`, creating its parent directory.
pub fn write_cleaned(
    categories: &[Category],
    observations: &[Observation],
    path: &Path,
) -> Result<ExportSummary> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let summary = write_cleaned_to(categories, observations, std::io::BufWriter::new(file))?;
    tracing::info!(target: "ingest", path = %path.display(), rows = summary.rows, "cleaned export written");
    Ok(summary)
}
