// src/supply/files.rs
use std::path::PathBuf;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::model::Category;
use crate::supply::{parse_categories, parse_observations, ParsedObservations, RawSupplier};

/// Reads the dimension JSON and the trending CSV from the raw data directory.
#[derive(Debug, Clone)]
pub struct FileSupplier {
    categories_path: PathBuf,
    videos_path: PathBuf,
}

impl FileSupplier {
    pub fn new(categories_path: impl Into<PathBuf>, videos_path: impl Into<PathBuf>) -> Self {
        Self {
            categories_path: categories_path.into(),
            videos_path: videos_path.into(),
        }
    }

    pub fn from_config(cfg: &IngestConfig) -> Self {
        Self::new(cfg.categories_path(), cfg.videos_path())
    }
}

#[async_trait::async_trait]
impl RawSupplier for FileSupplier {
    async fn categories(&self) -> Result<Vec<Category>, IngestError> {
        tracing::info!(target: "ingest", path = %self.categories_path.display(), "reading category file");
        let bytes = tokio::fs::read(&self.categories_path)
            .await
            .map_err(|e| IngestError::from_read("category file", self.categories_path.clone(), e))?;
        parse_categories(&bytes)
    }

    async fn observations(&self) -> Result<ParsedObservations, IngestError> {
        tracing::info!(target: "ingest", path = %self.videos_path.display(), "reading video file");
        let bytes = tokio::fs::read(&self.videos_path)
            .await
            .map_err(|e| IngestError::from_read("video file", self.videos_path.clone(), e))?;
        parse_observations(bytes.as_slice())
    }

    fn name(&self) -> &'static str {
        "files"
    }
}
