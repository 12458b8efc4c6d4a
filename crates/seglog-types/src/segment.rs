//! Segment metadata snapshots.
//!
//! A stream is an ordered list of segments. Closed ("sealed") segments carry
//! a completion time and a last-record pointer `(entry_id, slot_id, tx_id)`
//! that readers trust as the segment's end. At most one segment per stream is
//! in progress.

use std::fmt;

use seglog_error::{Result, SeglogError};
use serde::{Deserialize, Serialize};

use crate::record::{EntryId, INVALID_ENTRY_ID, RecordPosition, RecoveredRecord};
use crate::stream::StreamName;

/// Opaque identifier of the ledger backing a segment.
pub type LedgerId = u64;

/// Framing used for entries stored in a segment's ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeVersion {
    /// Records stored back-to-back with no envelope header.
    V0,
    /// Records wrapped in a checksummed envelope.
    #[default]
    V1,
}

impl EnvelopeVersion {
    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::V0),
            1 => Ok(Self::V1),
            other => Err(SeglogError::decode(format!(
                "unsupported envelope version {other}"
            ))),
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::V0 => 0,
            Self::V1 => 1,
        }
    }
}

/// The last-record pointer stored in segment metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRecordPointer {
    pub entry_id: EntryId,
    pub slot_id: u64,
    pub tx_id: i64,
}

impl fmt::Display for LastRecordPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "txid={} at entry {} slot {}",
            self.tx_id, self.entry_id, self.slot_id
        )
    }
}

/// Immutable snapshot of one segment's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSegmentMetadata {
    pub stream: StreamName,
    /// Monotonic ordinal of this segment within its stream.
    pub seq_no: u64,
    pub ledger_id: LedgerId,
    /// Stream-wide offset of the first record in this segment.
    pub start_offset: u64,
    pub in_progress: bool,
    pub first_tx_id: i64,
    pub last_tx_id: i64,
    /// Milliseconds since the Unix epoch; `None` while in progress.
    pub completion_time_ms: Option<u64>,
    pub last_entry_id: EntryId,
    pub last_slot_id: u64,
    pub record_count: u64,
    pub envelope_version: EnvelopeVersion,
    /// Store version used for optimistic concurrency on updates.
    pub metadata_version: u64,
}

impl LogSegmentMetadata {
    /// In-progress segment with no records yet.
    #[must_use]
    pub fn in_progress(stream: StreamName, seq_no: u64, ledger_id: LedgerId) -> Self {
        Self {
            stream,
            seq_no,
            ledger_id,
            start_offset: 0,
            in_progress: true,
            first_tx_id: 0,
            last_tx_id: 0,
            completion_time_ms: None,
            last_entry_id: INVALID_ENTRY_ID,
            last_slot_id: 0,
            record_count: 0,
            envelope_version: EnvelopeVersion::default(),
            metadata_version: 0,
        }
    }

    /// Sealed segment completed at `completion_time_ms`.
    #[must_use]
    pub fn sealed(
        stream: StreamName,
        seq_no: u64,
        ledger_id: LedgerId,
        completion_time_ms: u64,
    ) -> Self {
        Self {
            in_progress: false,
            completion_time_ms: Some(completion_time_ms),
            ..Self::in_progress(stream, seq_no, ledger_id)
        }
    }

    #[must_use]
    pub fn with_last_record(mut self, entry_id: EntryId, slot_id: u64, tx_id: i64) -> Self {
        self.last_entry_id = entry_id;
        self.last_slot_id = slot_id;
        self.last_tx_id = tx_id;
        self
    }

    #[must_use]
    pub fn with_tx_range(mut self, first_tx_id: i64, last_tx_id: i64) -> Self {
        self.first_tx_id = first_tx_id;
        self.last_tx_id = last_tx_id;
        self
    }

    #[must_use]
    pub fn with_start_offset(mut self, start_offset: u64) -> Self {
        self.start_offset = start_offset;
        self
    }

    #[must_use]
    pub fn with_record_count(mut self, record_count: u64) -> Self {
        self.record_count = record_count;
        self
    }

    #[must_use]
    pub fn with_envelope(mut self, envelope_version: EnvelopeVersion) -> Self {
        self.envelope_version = envelope_version;
        self
    }

    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        !self.in_progress
    }

    #[must_use]
    pub const fn last_record(&self) -> LastRecordPointer {
        LastRecordPointer {
            entry_id: self.last_entry_id,
            slot_id: self.last_slot_id,
            tx_id: self.last_tx_id,
        }
    }

    #[must_use]
    pub const fn last_record_position(&self) -> RecordPosition {
        RecordPosition {
            seq_no: self.seq_no,
            entry_id: self.last_entry_id,
            slot_id: self.last_slot_id,
        }
    }

    /// Whether the last-record pointer already names `recovered`.
    #[must_use]
    pub fn points_at(&self, recovered: &RecoveredRecord) -> bool {
        self.last_record_position() == recovered.position
            && self.last_tx_id == recovered.record.tx_id
    }

    /// Copy of this snapshot with its last-record pointer moved to
    /// `recovered`. `metadata_version` is left to the store.
    #[must_use]
    pub fn with_recovered_tail(&self, recovered: &RecoveredRecord) -> Self {
        let mut updated = self.clone();
        updated.last_entry_id = recovered.position.entry_id;
        updated.last_slot_id = recovered.position.slot_id;
        updated.last_tx_id = recovered.record.tx_id;
        updated
    }
}

impl fmt::Display for LogSegmentMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.in_progress {
            "in-progress"
        } else {
            "sealed"
        };
        write!(
            f,
            "{}:{} [ledger {}, {state}, txid {}..={}, last {}]",
            self.stream,
            self.seq_no,
            self.ledger_id,
            self.first_tx_id,
            self.last_tx_id,
            self.last_record()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogRecord;

    fn stream() -> StreamName {
        StreamName::new("orders").unwrap()
    }

    #[test]
    fn sealed_and_in_progress_constructors() {
        let sealed = LogSegmentMetadata::sealed(stream(), 3, 30, 1_000);
        assert!(sealed.is_sealed());
        assert_eq!(sealed.completion_time_ms, Some(1_000));

        let open = LogSegmentMetadata::in_progress(stream(), 4, 40);
        assert!(!open.is_sealed());
        assert_eq!(open.completion_time_ms, None);
        assert_eq!(open.last_entry_id, INVALID_ENTRY_ID);
    }

    #[test]
    fn recovered_tail_moves_pointer_only() {
        let segment = LogSegmentMetadata::sealed(stream(), 3, 30, 1_000)
            .with_tx_range(10, 19)
            .with_last_record(4, 0, 18);
        let recovered = RecoveredRecord {
            position: RecordPosition {
                seq_no: 3,
                entry_id: 5,
                slot_id: 1,
            },
            record: LogRecord::new(19, b"tail".to_vec()),
        };
        assert!(!segment.points_at(&recovered));

        let updated = segment.with_recovered_tail(&recovered);
        assert!(updated.points_at(&recovered));
        assert_eq!(updated.first_tx_id, 10);
        assert_eq!(updated.ledger_id, 30);
        assert_eq!(updated.metadata_version, segment.metadata_version);
    }

    #[test]
    fn envelope_version_round_trip_and_reject() {
        assert_eq!(EnvelopeVersion::from_u8(0).unwrap(), EnvelopeVersion::V0);
        assert_eq!(EnvelopeVersion::V1.as_u8(), 1);
        assert!(EnvelopeVersion::from_u8(9).is_err());
    }

    #[test]
    fn display_names_stream_and_state() {
        let segment = LogSegmentMetadata::in_progress(stream(), 7, 70);
        let text = segment.to_string();
        assert!(text.starts_with("orders:7 [ledger 70, in-progress"));
    }
}
