use std::fmt;

use serde::{Deserialize, Serialize};

/// Ledger entry identifier. `-1` means "no entry".
pub type EntryId = i64;

/// Entry id recorded for an empty ledger (nothing confirmed yet).
pub const INVALID_ENTRY_ID: EntryId = -1;

/// One stored ledger entry, as returned by storage reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub entry_id: EntryId,
    pub payload: Vec<u8>,
}

impl Entry {
    #[must_use]
    pub fn new(entry_id: EntryId, payload: Vec<u8>) -> Self {
        Self { entry_id, payload }
    }
}

/// A logical record decoded from an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogRecord {
    /// Writer-assigned transaction id.
    pub tx_id: i64,
    /// Record flags (control records, end-of-stream markers, ...).
    pub flags: u32,
    pub payload: Vec<u8>,
}

impl LogRecord {
    #[must_use]
    pub fn new(tx_id: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tx_id,
            flags: 0,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }
}

/// Address of a record: segment, entry within the ledger, slot within the
/// entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordPosition {
    pub seq_no: u64,
    pub entry_id: EntryId,
    pub slot_id: u64,
}

impl fmt::Display for RecordPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.seq_no, self.entry_id, self.slot_id)
    }
}

/// Tail record recovered from a fenced ledger, ready to become the segment's
/// last-record pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecoveredRecord {
    pub position: RecordPosition,
    pub record: LogRecord,
}

impl fmt::Display for RecoveredRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "txid={} at {} ({} bytes)",
            self.record.tx_id,
            self.position,
            self.record.payload.len()
        )
    }
}
