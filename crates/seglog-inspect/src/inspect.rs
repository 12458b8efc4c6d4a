//! Inspection orchestration.
//!
//! [`Inspector::run`] selects streams, fans them out over scoped worker
//! threads and merges the per-worker results into an [`InspectionReport`]
//! after every worker has been joined. Each worker owns its findings until
//! the join; nothing is shared or locked while streams are inspected.
//!
//! A worker that hits an error, panics or runs past the deadline abandons
//! the rest of its slice without affecting its siblings. Streams it already
//! finished keep their findings. The report then says exactly which streams
//! were never inspected.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use seglog_error::{Result, SeglogError};
use seglog_types::StreamName;
use tracing::{debug, error, info, warn};

use crate::backend::{EntryCodec, LedgerStorage, Namespace, OpenLog, QuorumReader};
use crate::config::{InspectConfig, PartialScanPolicy};
use crate::consistency;
use crate::dump::dump_tail;
use crate::envelope::EnvelopeCodec;
use crate::metrics::GLOBAL_INSPECT_METRICS;
use crate::partition::{fan_out, panic_message, partition};
use crate::report::{
    CorruptionCandidate, CorruptionReason, InspectionReport, SegmentFinding, WorkerOutcome,
    WorkerStatus,
};
use crate::selector::select_streams;
use crate::sequence;
use crate::telemetry::{InspectEvent, InspectObserver, NoOpObserver, monotonic_ns};

/// What one worker hands back at join.
struct WorkerRun {
    outcome: WorkerOutcome,
    candidates: Vec<CorruptionCandidate>,
}

/// Read-only inspection over a namespace.
pub struct Inspector<'a> {
    config: InspectConfig,
    namespace: &'a dyn Namespace,
    storage: &'a dyn LedgerStorage,
    quorum: &'a dyn QuorumReader,
    codec: &'a dyn EntryCodec,
    observer: &'a dyn InspectObserver,
}

impl<'a> Inspector<'a> {
    #[must_use]
    pub fn new(
        config: InspectConfig,
        namespace: &'a dyn Namespace,
        storage: &'a dyn LedgerStorage,
        quorum: &'a dyn QuorumReader,
    ) -> Self {
        Self {
            config,
            namespace,
            storage,
            quorum,
            codec: &EnvelopeCodec,
            observer: &NoOpObserver,
        }
    }

    /// Decode dumped entries with `codec` instead of [`EnvelopeCodec`].
    #[must_use]
    pub fn with_codec(mut self, codec: &'a dyn EntryCodec) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn InspectObserver) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &InspectConfig {
        &self.config
    }

    /// Select streams from the namespace and inspect them.
    ///
    /// Configuration is validated before the namespace is listed.
    pub fn run(&self) -> Result<InspectionReport> {
        self.config.validate()?;
        let names = self.namespace.list_streams()?;
        let selected = select_streams(names, self.config.prefix.as_deref())?;
        self.scan(&selected)
    }

    /// Inspect an explicit list of streams.
    pub fn inspect_streams(&self, streams: &[StreamName]) -> Result<InspectionReport> {
        self.config.validate()?;
        self.scan(streams)
    }

    fn scan(&self, streams: &[StreamName]) -> Result<InspectionReport> {
        let started = Instant::now();
        let deadline = self
            .config
            .deadline()
            .and_then(|budget| started.checked_add(budget));

        let workers = partition(streams.len(), self.config.workers).len();
        self.observer.on_event(&InspectEvent::ScanStarted {
            selected: streams.len(),
            workers,
            timestamp_ns: monotonic_ns(),
        });
        info!(
            target: "seglog.inspect",
            streams = streams.len(),
            workers,
            "inspection started"
        );

        let joins = fan_out(streams, self.config.workers, |worker, range, slice| {
            self.run_worker(worker, range, slice, deadline)
        });

        let mut outcomes = Vec::with_capacity(joins.len());
        let mut candidates = Vec::new();
        for join in joins {
            match join.result {
                Ok(run) => {
                    outcomes.push(run.outcome);
                    candidates.extend(run.candidates);
                }
                // Per-stream panics are caught inside the worker; this only
                // sees panics outside stream inspection.
                Err(payload) => {
                    let detail = panic_message(payload.as_ref());
                    error!(
                        target: "seglog.inspect",
                        worker = join.worker,
                        detail = %detail,
                        "worker panicked; its findings are lost"
                    );
                    GLOBAL_INSPECT_METRICS.record_worker_abort();
                    self.observer.on_event(&InspectEvent::WorkerAborted {
                        worker: join.worker,
                        stream: None,
                        detail: detail.clone(),
                        timestamp_ns: monotonic_ns(),
                    });
                    outcomes.push(WorkerOutcome {
                        worker: join.worker,
                        unprocessed: streams[join.range.clone()].to_vec(),
                        range: join.range,
                        status: WorkerStatus::Panicked { detail },
                        processed: Vec::new(),
                    });
                }
            }
        }

        let report = InspectionReport::merge(
            streams.len(),
            outcomes,
            candidates,
            duration_ms(started.elapsed()),
        );
        let complete = report.is_complete();
        GLOBAL_INSPECT_METRICS.record_scan(complete);
        self.observer.on_event(&InspectEvent::ScanCompleted {
            scanned: report.scanned,
            flagged: report.candidates.len(),
            complete,
            elapsed_ms: report.elapsed_ms,
            timestamp_ns: monotonic_ns(),
        });

        if complete {
            info!(
                target: "seglog.inspect",
                scanned = report.scanned,
                flagged = report.candidates.len(),
                elapsed_ms = report.elapsed_ms,
                "inspection complete"
            );
        } else {
            warn!(
                target: "seglog.inspect",
                selected = report.selected,
                scanned = report.scanned,
                failed_workers = report.failed_worker_count(),
                "inspection partial"
            );
            if self.config.partial_scan_policy == PartialScanPolicy::Fail {
                return Err(SeglogError::PartialScan {
                    selected: report.selected,
                    scanned: report.scanned,
                    failed_workers: report.failed_worker_count(),
                });
            }
        }
        Ok(report)
    }

    fn run_worker(
        &self,
        worker: usize,
        range: Range<usize>,
        slice: &[StreamName],
        deadline: Option<Instant>,
    ) -> WorkerRun {
        let mut processed = Vec::with_capacity(slice.len());
        let mut candidates = Vec::new();
        let mut status = WorkerStatus::Completed;
        let mut unprocessed = Vec::new();

        for (offset, stream) in slice.iter().enumerate() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(
                    target: "seglog.inspect",
                    worker,
                    remaining = slice.len() - offset,
                    "deadline passed; worker stopping"
                );
                self.worker_stopped(worker, None, "deadline exceeded".to_owned());
                status = WorkerStatus::DeadlineExceeded;
                unprocessed = slice[offset..].to_vec();
                break;
            }
            let inspected = panic::catch_unwind(AssertUnwindSafe(|| self.inspect_stream(stream)))
                .unwrap_or_else(|payload| {
                    Err(SeglogError::WorkerPanicked {
                        worker,
                        detail: panic_message(payload.as_ref()),
                    })
                });
            match inspected {
                Ok(candidate) => {
                    processed.push(stream.clone());
                    candidates.extend(candidate);
                }
                Err(err) => {
                    error!(
                        target: "seglog.inspect",
                        worker,
                        stream = %stream,
                        error = %err,
                        abandoned = slice.len() - offset,
                        "worker aborted"
                    );
                    self.worker_stopped(worker, Some(stream.clone()), err.to_string());
                    status = match err {
                        SeglogError::WorkerPanicked { detail, .. } => {
                            WorkerStatus::Panicked { detail }
                        }
                        err => WorkerStatus::Aborted {
                            stream: stream.clone(),
                            error: err.to_string(),
                        },
                    };
                    unprocessed = slice[offset..].to_vec();
                    break;
                }
            }
        }

        WorkerRun {
            outcome: WorkerOutcome {
                worker,
                range,
                status,
                processed,
                unprocessed,
            },
            candidates,
        }
    }

    fn worker_stopped(&self, worker: usize, stream: Option<StreamName>, detail: String) {
        GLOBAL_INSPECT_METRICS.record_worker_abort();
        self.observer.on_event(&InspectEvent::WorkerAborted {
            worker,
            stream,
            detail,
            timestamp_ns: monotonic_ns(),
        });
    }

    /// Inspect one stream. `Ok(None)` means nothing was found.
    pub fn inspect_stream(&self, stream: &StreamName) -> Result<Option<CorruptionCandidate>> {
        let log = OpenLog::open(self.namespace, stream)?;
        let segments = log.segments()?;
        if let Err(err) = log.close() {
            warn!(target: "seglog.inspect", stream = %stream, error = %err, "failed to close log");
        }

        let mut check = sequence::validate(segments, self.config.sequence_mode);
        if self.config.order_by_completion_time {
            check = check.ordered_by_completion_time();
        }
        let segment_count = check.segments.len();
        let mut reasons: Vec<CorruptionReason> = check
            .violations
            .into_iter()
            .map(CorruptionReason::Sequence)
            .collect();

        let mut findings = Vec::with_capacity(segment_count);
        for segment in check.segments {
            let mut finding = SegmentFinding::new(segment);
            if self.should_check_ledger(&finding) {
                let result = consistency::check_segment(self.storage, self.quorum, &finding.segment)?;
                GLOBAL_INSPECT_METRICS.record_ledger_check(result.matches);
                if !result.matches {
                    warn!(
                        target: "seglog.inspect",
                        stream = %stream,
                        seq_no = result.seq_no,
                        ledger_id = result.ledger_id,
                        stored = result.stored_last_confirmed,
                        observed = ?result.observed_last_entry_id,
                        "ledger lac mismatch"
                    );
                    reasons.push(CorruptionReason::ledger_inconsistent(&result));
                }
                finding.ledger = Some(result);
            }
            findings.push(finding);
        }

        let flagged = !reasons.is_empty();
        GLOBAL_INSPECT_METRICS.record_stream(segment_count as u64, flagged);
        if !flagged {
            debug!(
                target: "seglog.inspect",
                stream = %stream,
                segments = segment_count,
                "stream clean"
            );
            return Ok(None);
        }

        if self.config.dump_entries {
            for finding in &mut findings {
                let last_entry = finding
                    .ledger
                    .as_ref()
                    .map(consistency::LedgerConsistencyResult::last_entry_id);
                finding.dump = Some(dump_tail(
                    self.storage,
                    self.codec,
                    &finding.segment,
                    last_entry,
                    self.config.dump_entry_count,
                ));
            }
        }

        warn!(
            target: "seglog.inspect",
            stream = %stream,
            reasons = reasons.len(),
            segments = segment_count,
            "stream flagged"
        );
        self.observer.on_event(&InspectEvent::StreamFlagged {
            stream: stream.clone(),
            reasons: reasons.len(),
            timestamp_ns: monotonic_ns(),
        });
        Ok(Some(CorruptionCandidate {
            stream: stream.clone(),
            reasons,
            segments: findings,
        }))
    }

    fn should_check_ledger(&self, finding: &SegmentFinding) -> bool {
        self.config.check_ledgers
            && (!self.config.ledgers_in_progress_only || finding.segment.in_progress)
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
