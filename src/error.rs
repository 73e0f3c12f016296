// src/error.rs
//! Error taxonomy for an ingest run.
//!
//! Every fatal condition aborts the run and rolls back its unit of work. A fact
//! row that references an unknown category is not an error at all: it is
//! dropped and counted by the referential filter.

use rusqlite::ErrorCode;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{what} not found at {}", path.display())]
    InputMissing { what: &'static str, path: PathBuf },

    #[error("malformed {what}: {detail}")]
    InputMalformed { what: &'static str, detail: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("another ingest run is in progress")]
    RunInProgress,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Stable, serializable discriminant of [`IngestError`], used in run reports
/// and as the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputMissing,
    InputMalformed,
    StoreUnavailable,
    ConstraintViolation,
    RunInProgress,
    Config,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::InputMissing => 2,
            ErrorKind::InputMalformed => 3,
            ErrorKind::StoreUnavailable => 4,
            ErrorKind::ConstraintViolation => 5,
            ErrorKind::RunInProgress => 6,
            ErrorKind::Config => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InputMissing => "input_missing",
            ErrorKind::InputMalformed => "input_malformed",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::ConstraintViolation => "constraint_violation",
            ErrorKind::RunInProgress => "run_in_progress",
            ErrorKind::Config => "config",
        }
    }
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::InputMissing { .. } => ErrorKind::InputMissing,
            IngestError::InputMalformed { .. } => ErrorKind::InputMalformed,
            IngestError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            IngestError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            IngestError::RunInProgress => ErrorKind::RunInProgress,
            IngestError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        IngestError::InputMalformed {
            what,
            detail: detail.into(),
        }
    }

    /// Reads a supplier file, mapping "not found" to `InputMissing`.
    pub(crate) fn from_read(what: &'static str, path: PathBuf, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            IngestError::InputMissing { what, path }
        } else {
            IngestError::malformed(what, format!("reading {}: {err}", path.display()))
        }
    }
}

/// Constraint failures signal a filter defect; everything else the store
/// reports means it cannot serve the run.
impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        match sqlite_code(&err) {
            Some(ErrorCode::ConstraintViolation) => IngestError::ConstraintViolation(err.to_string()),
            _ => IngestError::StoreUnavailable(err.to_string()),
        }
    }
}

pub(crate) fn sqlite_code(err: &rusqlite::Error) -> Option<ErrorCode> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => Some(e.code),
        _ => None,
    }
}

pub(crate) fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        sqlite_code(err),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn constraint_failures_are_distinct_from_outages() {
        let e: IngestError = failure(rusqlite::ffi::SQLITE_CONSTRAINT).into();
        assert_eq!(e.kind(), ErrorKind::ConstraintViolation);

        let e: IngestError = failure(rusqlite::ffi::SQLITE_CANTOPEN).into();
        assert_eq!(e.kind(), ErrorKind::StoreUnavailable);

        let e: IngestError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(e.kind(), ErrorKind::StoreUnavailable);
    }

    #[test]
    fn busy_detection() {
        assert!(is_busy(&failure(rusqlite::ffi::SQLITE_BUSY)));
        assert!(!is_busy(&failure(rusqlite::ffi::SQLITE_CONSTRAINT)));
    }

    #[test]
    fn missing_file_maps_to_input_missing() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let e = IngestError::from_read("category file", PathBuf::from("x.json"), io);
        assert_eq!(e.kind(), ErrorKind::InputMissing);
        assert!(e.to_string().contains("x.json"));
    }

    #[test]
    fn exit_codes_are_unique() {
        let kinds = [
            ErrorKind::InputMissing,
            ErrorKind::InputMalformed,
            ErrorKind::StoreUnavailable,
            ErrorKind::ConstraintViolation,
            ErrorKind::RunInProgress,
            ErrorKind::Config,
        ];
        let codes: std::collections::HashSet<u8> = kinds.iter().map(|k| k.exit_code()).collect();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&0));
    }
}
