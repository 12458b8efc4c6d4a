//! Inspection findings and their renderings.
//!
//! Workers build [`CorruptionCandidate`]s locally; the coordinator merges
//! them into an [`InspectionReport`] once every worker has been joined. The
//! report is plain data: it renders as a list of stream names, as a full
//! per-segment listing, or as JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use seglog_error::Result;
use seglog_types::{EntryId, LedgerId, LogSegmentMetadata, StreamName};
use serde::{Deserialize, Serialize};

use crate::config::ReportOptions;
use crate::consistency::LedgerConsistencyResult;
use crate::dump::EntryDump;
use crate::sequence::SequenceViolation;

/// Schema identifier carried in the JSON rendering.
pub const REPORT_SCHEMA_VERSION: &str = "seglog-inspect-report/v1";

/// Why a stream was flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CorruptionReason {
    Sequence(SequenceViolation),
    LedgerInconsistent {
        seq_no: u64,
        ledger_id: LedgerId,
        stored_last_confirmed: EntryId,
        observed_last_entry_id: Option<EntryId>,
    },
}

impl CorruptionReason {
    #[must_use]
    pub fn ledger_inconsistent(result: &LedgerConsistencyResult) -> Self {
        Self::LedgerInconsistent {
            seq_no: result.seq_no,
            ledger_id: result.ledger_id,
            stored_last_confirmed: result.stored_last_confirmed,
            observed_last_entry_id: result.observed_last_entry_id,
        }
    }
}

impl fmt::Display for CorruptionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence(violation) => fmt::Display::fmt(violation, f),
            Self::LedgerInconsistent {
                seq_no,
                ledger_id,
                stored_last_confirmed,
                observed_last_entry_id,
            } => {
                write!(
                    f,
                    "segment {seq_no} ledger {ledger_id}: stored lac {stored_last_confirmed}, observed "
                )?;
                match observed_last_entry_id {
                    Some(observed) => write!(f, "{observed}"),
                    None => f.write_str("none"),
                }
            }
        }
    }
}

/// One segment of a flagged stream with everything learned about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentFinding {
    pub segment: LogSegmentMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerConsistencyResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump: Option<EntryDump>,
}

impl SegmentFinding {
    #[must_use]
    pub fn new(segment: LogSegmentMetadata) -> Self {
        Self {
            segment,
            ledger: None,
            dump: None,
        }
    }

    /// Whether the ledger check ran and found a mismatch.
    #[must_use]
    pub fn ledger_mismatch(&self) -> bool {
        self.ledger.as_ref().is_some_and(|ledger| !ledger.matches)
    }
}

/// A stream with at least one finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptionCandidate {
    pub stream: StreamName,
    pub reasons: Vec<CorruptionReason>,
    /// Every segment of the stream, in report order.
    pub segments: Vec<SegmentFinding>,
}

impl CorruptionCandidate {
    /// Sealed segments whose ledger check failed; the ones repair can act on.
    pub fn repairable_segments(&self) -> impl Iterator<Item = &SegmentFinding> {
        self.segments
            .iter()
            .filter(|finding| finding.segment.is_sealed() && finding.ledger_mismatch())
    }

    /// In-progress segments whose ledger check failed.
    pub fn in_progress_mismatches(&self) -> impl Iterator<Item = &SegmentFinding> {
        self.segments
            .iter()
            .filter(|finding| finding.segment.in_progress && finding.ledger_mismatch())
    }
}

/// How one worker's slice ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerStatus {
    Completed,
    /// An error on `stream` abandoned the rest of the slice.
    Aborted { stream: StreamName, error: String },
    DeadlineExceeded,
    /// The worker panicked; its findings are lost.
    Panicked { detail: String },
}

/// Accounting for one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub worker: usize,
    /// Index range into the selected stream list.
    pub range: Range<usize>,
    pub status: WorkerStatus,
    pub processed: Vec<StreamName>,
    /// Streams of the slice that were never fully inspected, including the
    /// one that failed.
    pub unprocessed: Vec<StreamName>,
}

impl WorkerOutcome {
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self.status, WorkerStatus::Completed)
    }
}

/// Whether every selected stream was inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "completeness", rename_all = "snake_case")]
pub enum ScanCompleteness {
    Complete,
    Partial {
        unscanned: Vec<StreamName>,
        failed_workers: Vec<usize>,
    },
}

/// Merged result of one inspection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionReport {
    pub schema_version: String,
    pub selected: usize,
    pub scanned: usize,
    pub completeness: ScanCompleteness,
    pub workers: Vec<WorkerOutcome>,
    /// Flagged streams keyed (and so ordered) by name.
    pub candidates: BTreeMap<StreamName, CorruptionCandidate>,
    pub elapsed_ms: u64,
}

impl InspectionReport {
    /// Merge joined worker outcomes and their candidates.
    #[must_use]
    pub fn merge(
        selected: usize,
        workers: Vec<WorkerOutcome>,
        candidates: Vec<CorruptionCandidate>,
        elapsed_ms: u64,
    ) -> Self {
        let scanned = workers.iter().map(|worker| worker.processed.len()).sum();
        let unscanned: Vec<StreamName> = workers
            .iter()
            .flat_map(|worker| worker.unprocessed.iter().cloned())
            .collect();
        let failed_workers: Vec<usize> = workers
            .iter()
            .filter(|worker| !worker.is_clean())
            .map(|worker| worker.worker)
            .collect();
        let completeness = if failed_workers.is_empty() && unscanned.is_empty() {
            ScanCompleteness::Complete
        } else {
            ScanCompleteness::Partial {
                unscanned,
                failed_workers,
            }
        };
        let candidates = candidates
            .into_iter()
            .map(|candidate| (candidate.stream.clone(), candidate))
            .collect();
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_owned(),
            selected,
            scanned,
            completeness,
            workers,
            candidates,
            elapsed_ms,
        }
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.completeness, ScanCompleteness::Complete)
    }

    pub fn flagged_streams(&self) -> impl Iterator<Item = &StreamName> {
        self.candidates.keys()
    }

    #[must_use]
    pub fn candidate(&self, stream: &StreamName) -> Option<&CorruptionCandidate> {
        self.candidates.get(stream)
    }

    #[must_use]
    pub fn failed_worker_count(&self) -> usize {
        match &self.completeness {
            ScanCompleteness::Complete => 0,
            ScanCompleteness::Partial { failed_workers, .. } => failed_workers.len(),
        }
    }

    /// One flagged stream name per line.
    #[must_use]
    pub fn render_stream_names(&self) -> String {
        StreamNamesView { report: self }.to_string()
    }

    /// Reasons, segments, ledger results and dumped entries per stream.
    #[must_use]
    pub fn render_full(&self, options: &ReportOptions) -> String {
        FullView {
            report: self,
            in_progress_only: options.in_progress_only,
        }
        .to_string()
    }

    /// Render according to `options`.
    #[must_use]
    pub fn render(&self, options: &ReportOptions) -> String {
        if options.streams_only {
            self.render_stream_names()
        } else {
            self.render_full(options)
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    fn write_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "inspected {} of {} streams, {} flagged, {} ms",
            self.scanned,
            self.selected,
            self.candidates.len(),
            self.elapsed_ms
        )?;
        if let ScanCompleteness::Partial {
            unscanned,
            failed_workers,
        } = &self.completeness
        {
            writeln!(
                f,
                "PARTIAL SCAN: {} stream(s) not inspected, worker(s) {failed_workers:?} did not complete",
                unscanned.len()
            )?;
            for worker in self.workers.iter().filter(|worker| !worker.is_clean()) {
                match &worker.status {
                    WorkerStatus::Aborted { stream, error } => {
                        writeln!(f, "  worker {} aborted at {stream}: {error}", worker.worker)?;
                    }
                    WorkerStatus::DeadlineExceeded => {
                        writeln!(f, "  worker {} stopped at the deadline", worker.worker)?;
                    }
                    WorkerStatus::Panicked { detail } => {
                        writeln!(f, "  worker {} panicked: {detail}", worker.worker)?;
                    }
                    WorkerStatus::Completed => {}
                }
            }
        }
        Ok(())
    }
}

struct StreamNamesView<'a> {
    report: &'a InspectionReport,
}

impl fmt::Display for StreamNamesView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.report.is_complete() {
            self.report.write_summary(f)?;
        }
        for stream in self.report.flagged_streams() {
            writeln!(f, "{stream}")?;
        }
        Ok(())
    }
}

struct FullView<'a> {
    report: &'a InspectionReport,
    in_progress_only: bool,
}

impl fmt::Display for FullView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.report.write_summary(f)?;
        for candidate in self.report.candidates.values() {
            writeln!(f)?;
            writeln!(f, "stream {}", candidate.stream)?;
            for reason in &candidate.reasons {
                writeln!(f, "  ! {reason}")?;
            }
            for finding in candidate
                .segments
                .iter()
                .filter(|finding| !self.in_progress_only || finding.segment.in_progress)
            {
                writeln!(f, "  {}", finding.segment)?;
                if let Some(ledger) = &finding.ledger {
                    writeln!(f, "    {ledger}")?;
                }
                if let Some(dump) = &finding.dump {
                    if let Some(error) = &dump.error {
                        writeln!(f, "    dump failed: {error}")?;
                    }
                    for entry in &dump.entries {
                        match &entry.error {
                            Some(error) => writeln!(
                                f,
                                "    entry {} ({} bytes): undecodable: {error}",
                                entry.entry_id, entry.raw_len
                            )?,
                            None => {
                                writeln!(
                                    f,
                                    "    entry {} ({} bytes): {} record(s)",
                                    entry.entry_id,
                                    entry.raw_len,
                                    entry.records.len()
                                )?;
                                for (slot, record) in entry.records.iter().enumerate() {
                                    writeln!(
                                        f,
                                        "      [{slot}] txid={} flags={:#x} {} bytes",
                                        record.tx_id,
                                        record.flags,
                                        record.payload.len()
                                    )?;
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
