//! Inspection and reporting options.

use std::time::Duration;

use seglog_error::{Result, SeglogError};
use serde::{Deserialize, Serialize};

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 1;
/// Upper bound on worker threads.
pub const MAX_WORKERS: usize = 1024;
/// Default number of tail entries dumped per segment.
pub const DEFAULT_DUMP_ENTRY_COUNT: u32 = 10;
/// Upper bound on dumped entries per segment.
pub const MAX_DUMP_ENTRY_COUNT: u32 = 1000;

/// Which structural check the sequence validator runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceMode {
    /// Sequence numbers must increase by exactly one.
    #[default]
    Contiguity,
    /// No sealed segment may share a sequence number with an in-progress one.
    InProgressOverlap,
}

/// What to do when some streams were never inspected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialScanPolicy {
    /// Return the report, marked partial.
    #[default]
    Report,
    /// Turn a partial scan into an error.
    Fail,
}

/// Options for one inspection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InspectConfig {
    pub workers: usize,
    /// Only inspect streams whose name starts with this prefix.
    pub prefix: Option<String>,
    pub sequence_mode: SequenceMode,
    /// Compare each segment's ledger LAC against a quorum forward read.
    pub check_ledgers: bool,
    /// Restrict ledger checks to in-progress segments.
    pub ledgers_in_progress_only: bool,
    /// Re-order reported segments by completion time.
    pub order_by_completion_time: bool,
    /// Decode the tail entries of every segment of a flagged stream.
    pub dump_entries: bool,
    pub dump_entry_count: u32,
    /// Overall scan deadline, checked by workers between streams.
    pub deadline_ms: Option<u64>,
    pub partial_scan_policy: PartialScanPolicy,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            prefix: None,
            sequence_mode: SequenceMode::default(),
            check_ledgers: true,
            ledgers_in_progress_only: false,
            order_by_completion_time: false,
            dump_entries: false,
            dump_entry_count: DEFAULT_DUMP_ENTRY_COUNT,
            deadline_ms: None,
            partial_scan_policy: PartialScanPolicy::default(),
        }
    }
}

impl InspectConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(SeglogError::invalid_config(format!(
                "workers must be in 1..={MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        if self.dump_entry_count == 0 || self.dump_entry_count > MAX_DUMP_ENTRY_COUNT {
            return Err(SeglogError::invalid_config(format!(
                "dump_entry_count must be in 1..={MAX_DUMP_ENTRY_COUNT}, got {}",
                self.dump_entry_count
            )));
        }
        if self.prefix.as_deref() == Some("") {
            return Err(SeglogError::invalid_config(
                "prefix must be non-empty when present",
            ));
        }
        if self.deadline_ms == Some(0) {
            return Err(SeglogError::invalid_config("deadline_ms must be positive"));
        }
        Ok(())
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_sequence_mode(mut self, mode: SequenceMode) -> Self {
        self.sequence_mode = mode;
        self
    }

    #[must_use]
    pub fn with_dump_entries(mut self, count: u32) -> Self {
        self.dump_entries = true;
        self.dump_entry_count = count;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn with_partial_scan_policy(mut self, policy: PartialScanPolicy) -> Self {
        self.partial_scan_policy = policy;
        self
    }
}

/// Rendering options for [`crate::report::InspectionReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportOptions {
    /// Print flagged stream names only.
    pub streams_only: bool,
    /// In the detailed view, show in-progress segments only.
    pub in_progress_only: bool,
}
