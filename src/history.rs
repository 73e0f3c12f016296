//! history.rs: capped in-memory log of finished runs for the status surface.

use std::sync::Mutex;

use crate::pipeline::RunReport;

#[derive(Debug)]
pub struct RunHistory {
    inner: Mutex<Vec<RunReport>>,
    cap: usize,
}

impl RunHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(Vec::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, report: RunReport) {
        let Ok(mut v) = self.inner.lock() else {
            return;
        };
        v.push(report);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    /// Newest last.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<RunReport> {
        let Ok(v) = self.inner.lock() else {
            return Vec::new();
        };
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }

    pub fn last(&self) -> Option<RunReport> {
        self.snapshot_last_n(1).pop()
    }
}
