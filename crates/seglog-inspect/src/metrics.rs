//! Inspection and repair counters.
//!
//! Global `AtomicU64` counters, updated with `Ordering::Relaxed` by the
//! inspector and the repair executor. Lock-free and safe to bump from every
//! worker thread.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::repair::RepairOutcome;

// ---------------------------------------------------------------------------
// Metric counters
// ---------------------------------------------------------------------------

/// Global inspection metrics singleton.
pub static GLOBAL_INSPECT_METRICS: InspectMetrics = InspectMetrics::new();

/// Atomic counters tracking inspection and repair activity.
pub struct InspectMetrics {
    pub scans_total: AtomicU64,
    pub partial_scans_total: AtomicU64,
    /// Streams fully inspected.
    pub streams_scanned_total: AtomicU64,
    pub streams_flagged_total: AtomicU64,
    pub segments_checked_total: AtomicU64,
    pub ledger_checks_total: AtomicU64,
    pub ledger_mismatches_total: AtomicU64,
    /// Workers that aborted, hit the deadline, or panicked.
    pub worker_aborts_total: AtomicU64,
    pub repairs_attempted_total: AtomicU64,
    pub repairs_applied_total: AtomicU64,
    pub repairs_unchanged_total: AtomicU64,
    pub repairs_declined_total: AtomicU64,
    pub repairs_skipped_total: AtomicU64,
    pub repairs_failed_total: AtomicU64,
}

impl InspectMetrics {
    /// Create a zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            scans_total: AtomicU64::new(0),
            partial_scans_total: AtomicU64::new(0),
            streams_scanned_total: AtomicU64::new(0),
            streams_flagged_total: AtomicU64::new(0),
            segments_checked_total: AtomicU64::new(0),
            ledger_checks_total: AtomicU64::new(0),
            ledger_mismatches_total: AtomicU64::new(0),
            worker_aborts_total: AtomicU64::new(0),
            repairs_attempted_total: AtomicU64::new(0),
            repairs_applied_total: AtomicU64::new(0),
            repairs_unchanged_total: AtomicU64::new(0),
            repairs_declined_total: AtomicU64::new(0),
            repairs_skipped_total: AtomicU64::new(0),
            repairs_failed_total: AtomicU64::new(0),
        }
    }

    /// Record one inspected stream and its segment count.
    pub fn record_stream(&self, segments: u64, flagged: bool) {
        self.streams_scanned_total.fetch_add(1, Ordering::Relaxed);
        self.segments_checked_total
            .fetch_add(segments, Ordering::Relaxed);
        if flagged {
            self.streams_flagged_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_ledger_check(&self, matches: bool) {
        self.ledger_checks_total.fetch_add(1, Ordering::Relaxed);
        if !matches {
            self.ledger_mismatches_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_worker_abort(&self) {
        self.worker_aborts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished scan.
    pub fn record_scan(&self, complete: bool) {
        self.scans_total.fetch_add(1, Ordering::Relaxed);
        if !complete {
            self.partial_scans_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one segment repair attempt by its outcome.
    pub fn record_repair(&self, outcome: &RepairOutcome) {
        self.repairs_attempted_total.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            RepairOutcome::Repaired { .. } => &self.repairs_applied_total,
            RepairOutcome::Unchanged { .. } => &self.repairs_unchanged_total,
            RepairOutcome::Declined => &self.repairs_declined_total,
            RepairOutcome::Skipped { .. } => &self.repairs_skipped_total,
            RepairOutcome::Conflict { .. }
            | RepairOutcome::DecodeFailed { .. }
            | RepairOutcome::Failed { .. } => &self.repairs_failed_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> InspectMetricsSnapshot {
        InspectMetricsSnapshot {
            scans_total: self.scans_total.load(Ordering::Relaxed),
            partial_scans_total: self.partial_scans_total.load(Ordering::Relaxed),
            streams_scanned_total: self.streams_scanned_total.load(Ordering::Relaxed),
            streams_flagged_total: self.streams_flagged_total.load(Ordering::Relaxed),
            segments_checked_total: self.segments_checked_total.load(Ordering::Relaxed),
            ledger_checks_total: self.ledger_checks_total.load(Ordering::Relaxed),
            ledger_mismatches_total: self.ledger_mismatches_total.load(Ordering::Relaxed),
            worker_aborts_total: self.worker_aborts_total.load(Ordering::Relaxed),
            repairs_attempted_total: self.repairs_attempted_total.load(Ordering::Relaxed),
            repairs_applied_total: self.repairs_applied_total.load(Ordering::Relaxed),
            repairs_unchanged_total: self.repairs_unchanged_total.load(Ordering::Relaxed),
            repairs_declined_total: self.repairs_declined_total.load(Ordering::Relaxed),
            repairs_skipped_total: self.repairs_skipped_total.load(Ordering::Relaxed),
            repairs_failed_total: self.repairs_failed_total.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.scans_total,
            &self.partial_scans_total,
            &self.streams_scanned_total,
            &self.streams_flagged_total,
            &self.segments_checked_total,
            &self.ledger_checks_total,
            &self.ledger_mismatches_total,
            &self.worker_aborts_total,
            &self.repairs_attempted_total,
            &self.repairs_applied_total,
            &self.repairs_unchanged_total,
            &self.repairs_declined_total,
            &self.repairs_skipped_total,
            &self.repairs_failed_total,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for InspectMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of [`InspectMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectMetricsSnapshot {
    pub scans_total: u64,
    pub partial_scans_total: u64,
    pub streams_scanned_total: u64,
    pub streams_flagged_total: u64,
    pub segments_checked_total: u64,
    pub ledger_checks_total: u64,
    pub ledger_mismatches_total: u64,
    pub worker_aborts_total: u64,
    pub repairs_attempted_total: u64,
    pub repairs_applied_total: u64,
    pub repairs_unchanged_total: u64,
    pub repairs_declined_total: u64,
    pub repairs_skipped_total: u64,
    pub repairs_failed_total: u64,
}

impl fmt::Display for InspectMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scans={} partial_scans={} streams_scanned={} streams_flagged={} \
             segments_checked={} ledger_checks={} ledger_mismatches={} worker_aborts={} \
             repairs_attempted={} repairs_applied={} repairs_unchanged={} \
             repairs_declined={} repairs_skipped={} repairs_failed={}",
            self.scans_total,
            self.partial_scans_total,
            self.streams_scanned_total,
            self.streams_flagged_total,
            self.segments_checked_total,
            self.ledger_checks_total,
            self.ledger_mismatches_total,
            self.worker_aborts_total,
            self.repairs_attempted_total,
            self.repairs_applied_total,
            self.repairs_unchanged_total,
            self.repairs_declined_total,
            self.repairs_skipped_total,
            self.repairs_failed_total,
        )
    }
}
