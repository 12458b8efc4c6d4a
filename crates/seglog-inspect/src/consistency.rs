//! Ledger LAC consistency checks.
//!
//! A segment's ledger records a last-add-confirmed id in its own metadata.
//! The checker compares it against the highest entry a quorum of replicas
//! can actually serve when reading forward from that LAC. The ledger is
//! opened without recovery and never mutated.

use std::fmt;

use seglog_error::Result;
use seglog_types::{EntryId, INVALID_ENTRY_ID, LedgerId, LogSegmentMetadata, StreamName};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{LedgerStorage, OpenLedger, QuorumReader};

/// Stored vs. observed LAC for one segment's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConsistencyResult {
    pub stream: StreamName,
    pub seq_no: u64,
    pub ledger_id: LedgerId,
    pub in_progress: bool,
    pub stored_last_confirmed: EntryId,
    /// Highest entry id returned by the quorum read; `None` when nothing was
    /// retrievable.
    pub observed_last_entry_id: Option<EntryId>,
    pub matches: bool,
}

impl LedgerConsistencyResult {
    /// Compare the stored LAC against what the quorum read returned. An empty
    /// read matches only an empty ledger (`LAC == -1`).
    #[must_use]
    pub fn evaluate(
        segment: &LogSegmentMetadata,
        stored_last_confirmed: EntryId,
        observed_last_entry_id: Option<EntryId>,
    ) -> Self {
        let matches = observed_last_entry_id.unwrap_or(INVALID_ENTRY_ID) == stored_last_confirmed;
        Self {
            stream: segment.stream.clone(),
            seq_no: segment.seq_no,
            ledger_id: segment.ledger_id,
            in_progress: segment.in_progress,
            stored_last_confirmed,
            observed_last_entry_id,
            matches,
        }
    }

    /// Best known last entry id: observed if anything was read, else stored.
    #[must_use]
    pub fn last_entry_id(&self) -> EntryId {
        self.observed_last_entry_id
            .unwrap_or(self.stored_last_confirmed)
    }
}

impl fmt::Display for LedgerConsistencyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observed = self
            .observed_last_entry_id
            .map_or_else(|| "none".to_owned(), |id| id.to_string());
        write!(
            f,
            "ledger {}: stored lac {}, observed {} ({})",
            self.ledger_id,
            self.stored_last_confirmed,
            observed,
            if self.matches { "consistent" } else { "inconsistent" }
        )
    }
}

/// Check one segment's ledger.
pub fn check_segment(
    storage: &dyn LedgerStorage,
    quorum: &dyn QuorumReader,
    segment: &LogSegmentMetadata,
) -> Result<LedgerConsistencyResult> {
    let ledger = OpenLedger::open(storage, segment.ledger_id, false)?;
    let handle = ledger.handle()?;
    let stored = handle.last_add_confirmed();
    let entries = quorum.forward_read_from_last_confirmed(handle)?;
    let observed = entries.iter().map(|entry| entry.entry_id).max();
    if let Err(err) = ledger.close() {
        warn!(target: "seglog.inspect", ledger_id = segment.ledger_id, error = %err, "failed to close ledger after check");
    }

    let result = LedgerConsistencyResult::evaluate(segment, stored, observed);
    debug!(
        target: "seglog.inspect",
        stream = %segment.stream,
        seq_no = segment.seq_no,
        ledger_id = segment.ledger_id,
        stored,
        observed = ?observed,
        matches = result.matches,
        "ledger checked"
    );
    Ok(result)
}
