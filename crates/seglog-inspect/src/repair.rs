//! Last-record pointer repair for sealed segments.
//!
//! Repair recovers the true tail record of a flagged sealed segment and
//! rewrites the segment's last-record pointer to it:
//!
//! 1. open the ledger in recovery mode, which fences it and settles its LAC;
//! 2. read the entry at the fenced LAC and decode it through the envelope
//!    codec; its last record is the recovered tail;
//! 3. show the stored and recovered pointers to the operator and block on
//!    confirmation;
//! 4. on confirmation, hand the recovered record to the metadata updater.
//!
//! The updater call is the only mutation. Ledger content is never written.
//! Running a repair twice recovers the same record and the second update is
//! a no-op.

use std::fmt;

use seglog_error::{Result, SeglogError};
use seglog_types::{
    EntryId, LastRecordPointer, LogSegmentMetadata, RecordPosition, RecoveredRecord, StreamName,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::backend::{
    EntryCodec, LedgerStorage, MetadataUpdater, OpenLedger, OperatorPrompt, UpdateOutcome,
};
use crate::envelope::EnvelopeCodec;
use crate::metrics::GLOBAL_INSPECT_METRICS;
use crate::report::InspectionReport;
use crate::telemetry::{InspectEvent, InspectObserver, NoOpObserver, monotonic_ns};

/// A computed repair, waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPlan {
    pub segment: LogSegmentMetadata,
    pub stored: LastRecordPointer,
    pub recovered: RecoveredRecord,
    /// LAC established by the recovery open.
    pub fenced_last_confirmed: EntryId,
}

impl RepairPlan {
    /// Whether the stored pointer already names the recovered record.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.segment.points_at(&self.recovered)
    }

    /// Question put to the operator.
    #[must_use]
    pub fn confirmation_text(&self) -> String {
        format!(
            "Repair last record of {}:{} (ledger {}, fenced lac {})?\n  stored:    {}\n  recovered: {}",
            self.segment.stream,
            self.segment.seq_no,
            self.segment.ledger_id,
            self.fenced_last_confirmed,
            self.stored,
            self.recovered
        )
    }
}

/// What happened to one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RepairOutcome {
    Repaired {
        recovered: RecoveredRecord,
        metadata_version: u64,
    },
    /// The pointer already named the recovered record.
    Unchanged { recovered: RecoveredRecord },
    Declined,
    Skipped { reason: String },
    /// Metadata changed after it was inspected.
    Conflict { detail: String },
    DecodeFailed { detail: String },
    Failed { detail: String },
}

impl RepairOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Repaired { .. } => "repaired",
            Self::Unchanged { .. } => "unchanged",
            Self::Declined => "declined",
            Self::Skipped { .. } => "skipped",
            Self::Conflict { .. } => "conflict",
            Self::DecodeFailed { .. } => "decode_failed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Tail record the repair recovered, if it got that far and applied.
    #[must_use]
    pub const fn recovered(&self) -> Option<&RecoveredRecord> {
        match self {
            Self::Repaired { recovered, .. } | Self::Unchanged { recovered } => Some(recovered),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::DecodeFailed { .. } | Self::Failed { .. }
        )
    }
}

impl fmt::Display for RepairOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repaired {
                recovered,
                metadata_version,
            } => write!(f, "repaired to {recovered} (metadata version {metadata_version})"),
            Self::Unchanged { recovered } => write!(f, "already at {recovered}"),
            Self::Declined => f.write_str("declined by operator"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
            Self::Conflict { detail } => write!(f, "conflict: {detail}"),
            Self::DecodeFailed { detail } => write!(f, "decode failed: {detail}"),
            Self::Failed { detail } => write!(f, "failed: {detail}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRepair {
    pub stream: StreamName,
    pub seq_no: u64,
    pub outcome: RepairOutcome,
}

/// Per-segment outcomes of a batch repair, in the order they ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSummary {
    pub segments: Vec<SegmentRepair>,
}

impl RepairSummary {
    fn count(&self, predicate: impl Fn(&RepairOutcome) -> bool) -> usize {
        self.segments
            .iter()
            .filter(|repair| predicate(&repair.outcome))
            .count()
    }

    #[must_use]
    pub fn repaired(&self) -> usize {
        self.count(|outcome| matches!(outcome, RepairOutcome::Repaired { .. }))
    }

    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.count(|outcome| matches!(outcome, RepairOutcome::Unchanged { .. }))
    }

    #[must_use]
    pub fn declined(&self) -> usize {
        self.count(|outcome| matches!(outcome, RepairOutcome::Declined))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, RepairOutcome::Skipped { .. }))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(RepairOutcome::is_failure)
    }
}

impl fmt::Display for RepairSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for repair in &self.segments {
            writeln!(f, "{}:{} {}", repair.stream, repair.seq_no, repair.outcome)?;
        }
        write!(
            f,
            "repaired={} unchanged={} declined={} skipped={} failed={}",
            self.repaired(),
            self.unchanged(),
            self.declined(),
            self.skipped(),
            self.failed()
        )
    }
}

/// Plans and applies last-record repairs, one segment at a time.
pub struct RepairExecutor<'a> {
    storage: &'a dyn LedgerStorage,
    updater: &'a dyn MetadataUpdater,
    prompt: &'a dyn OperatorPrompt,
    codec: &'a dyn EntryCodec,
    observer: &'a dyn InspectObserver,
}

impl<'a> RepairExecutor<'a> {
    #[must_use]
    pub fn new(
        storage: &'a dyn LedgerStorage,
        updater: &'a dyn MetadataUpdater,
        prompt: &'a dyn OperatorPrompt,
    ) -> Self {
        Self {
            storage,
            updater,
            prompt,
            codec: &EnvelopeCodec,
            observer: &NoOpObserver,
        }
    }

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

    /// Recover the tail record of a sealed segment.
    ///
    /// Fences the ledger. Mutates no metadata.
    pub fn plan(&self, segment: &LogSegmentMetadata) -> Result<RepairPlan> {
        if segment.in_progress {
            return Err(SeglogError::InvalidRepairTarget {
                stream: segment.stream.to_string(),
                seq_no: segment.seq_no,
                reason: "segment is still in progress".to_owned(),
            });
        }

        let ledger = OpenLedger::open(self.storage, segment.ledger_id, true)?;
        let handle = ledger.handle()?;
        let lac = handle.last_add_confirmed();
        if lac < 0 {
            return Err(SeglogError::decode(format!(
                "ledger {} holds no confirmed entries after recovery",
                segment.ledger_id
            )));
        }
        let entry = handle
            .read_entries(lac, lac)?
            .into_iter()
            .find(|entry| entry.entry_id == lac)
            .ok_or_else(|| {
                SeglogError::decode(format!(
                    "entry {lac} of ledger {} was not returned",
                    segment.ledger_id
                ))
            })?;
        if let Err(err) = ledger.close() {
            warn!(target: "seglog.repair", ledger_id = segment.ledger_id, error = %err, "failed to close ledger");
        }

        let mut records = self.codec.decode(&entry.payload, segment.envelope_version)?;
        let record = records.pop().ok_or_else(|| {
            SeglogError::decode(format!(
                "entry {lac} of ledger {} decoded to zero records",
                segment.ledger_id
            ))
        })?;
        // The popped record sat right after the remaining ones.
        let recovered = RecoveredRecord {
            position: RecordPosition {
                seq_no: segment.seq_no,
                entry_id: lac,
                slot_id: records.len() as u64,
            },
            record,
        };
        debug!(
            target: "seglog.repair",
            stream = %segment.stream,
            seq_no = segment.seq_no,
            fenced_lac = lac,
            recovered = %recovered,
            "tail record recovered"
        );
        Ok(RepairPlan {
            stored: segment.last_record(),
            segment: segment.clone(),
            recovered,
            fenced_last_confirmed: lac,
        })
    }

    /// Plan, confirm and apply the repair of one segment.
    pub fn repair_segment(&self, segment: &LogSegmentMetadata) -> RepairOutcome {
        let outcome = self.attempt(segment);
        GLOBAL_INSPECT_METRICS.record_repair(&outcome);
        self.observer.on_event(&InspectEvent::RepairFinished {
            stream: segment.stream.clone(),
            seq_no: segment.seq_no,
            outcome: outcome.as_str(),
            timestamp_ns: monotonic_ns(),
        });
        if outcome.is_failure() {
            error!(
                target: "seglog.repair",
                stream = %segment.stream,
                seq_no = segment.seq_no,
                outcome = %outcome,
                "repair failed"
            );
        } else {
            info!(
                target: "seglog.repair",
                stream = %segment.stream,
                seq_no = segment.seq_no,
                outcome = %outcome,
                "repair finished"
            );
        }
        outcome
    }

    fn attempt(&self, segment: &LogSegmentMetadata) -> RepairOutcome {
        if segment.in_progress {
            return RepairOutcome::Skipped {
                reason: "segment is still in progress".to_owned(),
            };
        }
        let plan = match self.plan(segment) {
            Ok(plan) => plan,
            Err(SeglogError::Decode { detail }) => return RepairOutcome::DecodeFailed { detail },
            Err(err) => {
                return RepairOutcome::Failed {
                    detail: err.to_string(),
                };
            }
        };
        if !self.prompt.confirm(&plan.confirmation_text()) {
            return RepairOutcome::Declined;
        }
        match self.updater.update_last_record(&plan.segment, &plan.recovered) {
            Ok(UpdateOutcome::Updated { metadata_version }) => RepairOutcome::Repaired {
                recovered: plan.recovered,
                metadata_version,
            },
            Ok(UpdateOutcome::Unchanged) => RepairOutcome::Unchanged {
                recovered: plan.recovered,
            },
            Err(err @ SeglogError::Conflict { .. }) => RepairOutcome::Conflict {
                detail: err.to_string(),
            },
            Err(err) => RepairOutcome::Failed {
                detail: err.to_string(),
            },
        }
    }

    /// Repair every sealed segment of `report` whose ledger check failed,
    /// strictly one at a time. A failure on one segment is recorded and the
    /// walk continues. In-progress mismatches are left out of the batch.
    pub fn repair_flagged(&self, report: &InspectionReport) -> RepairSummary {
        let mut summary = RepairSummary::default();
        for candidate in report.candidates.values() {
            for finding in candidate.repairable_segments() {
                let outcome = self.repair_segment(&finding.segment);
                summary.segments.push(SegmentRepair {
                    stream: candidate.stream.clone(),
                    seq_no: finding.segment.seq_no,
                    outcome,
                });
            }
        }
        info!(
            target: "seglog.repair",
            segments = summary.segments.len(),
            repaired = summary.repaired(),
            failed = summary.failed(),
            "batch repair finished"
        );
        summary
    }
}
