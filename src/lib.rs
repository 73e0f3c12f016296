// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod model;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod supply;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::config::IngestConfig;
pub use crate::error::{ErrorKind, IngestError};
pub use crate::model::{Category, Observation};
pub use crate::pipeline::{execute, Pipeline, PipelineSettings, RunContext, RunOutcome, RunReport};
pub use crate::store::Store;
