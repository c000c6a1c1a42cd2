//! Upload progress accounting.

use super::UploadArtifact;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a [`ProgressCounter`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_count: u64,
    pub done_count: u64,
    pub total_bytes: u64,
    pub done_bytes: u64,
}

impl ProgressSnapshot {
    /// Completed fraction by bytes, clamped to `0.0..=1.0`.
    pub fn ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.total_count == 0 { 1.0 } else { 0.0 };
        }
        (self.done_bytes as f64 / self.total_bytes as f64).clamp(0.0, 1.0)
    }
}

/// Totals fixed at session start; completions are counted atomically.
///
/// The totals are never recomputed while a session runs, so
/// [`ratio`](Self::ratio) only ever grows.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    total_count: u64,
    total_bytes: u64,
    done_count: AtomicU64,
    done_bytes: AtomicU64,
}

impl ProgressCounter {
    /// Sums the files still to upload across `pending`.
    pub fn from_artifacts<'a>(
        pending: impl IntoIterator<Item = &'a UploadArtifact>,
        manifest_upload: bool,
    ) -> Self {
        let mut counter = ProgressCounter::default();
        for artifact in pending {
            counter.total_count += 1;
            counter.total_bytes += artifact.data_size;
            if artifact.manifest_required(manifest_upload) {
                counter.total_count += 1;
                counter.total_bytes += artifact.manifest_data_size;
            }
        }
        counter
    }

    pub fn with_totals(total_count: u64, total_bytes: u64) -> Self {
        Self {
            total_count,
            total_bytes,
            ..Default::default()
        }
    }

    /// Records one finished file of `bytes` bytes.
    pub fn complete(&self, bytes: u64) {
        self.done_count.fetch_add(1, Ordering::Relaxed);
        self.done_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_count: self.total_count,
            done_count: self.done_count.load(Ordering::Relaxed).min(self.total_count),
            total_bytes: self.total_bytes,
            done_bytes: self.done_bytes.load(Ordering::Relaxed).min(self.total_bytes),
        }
    }

    pub fn ratio(&self) -> f64 {
        self.snapshot().ratio()
    }

    /// False when there is nothing to transfer.
    pub fn is_upload_necessary(&self) -> bool {
        self.total_bytes > 0
    }
}
