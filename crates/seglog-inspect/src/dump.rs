//! Tail-entry dumps for flagged streams.

use seglog_types::{EntryId, LogRecord, LogSegmentMetadata};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{EntryCodec, LedgerStorage, OpenLedger};

/// One dumped entry: either its decoded records or why decoding failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpedEntry {
    pub entry_id: EntryId,
    pub raw_len: usize,
    pub records: Vec<LogRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Dumped tail of one segment. `error` is set when the ledger itself could
/// not be read; per-entry decode failures live on the entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDump {
    pub entries: Vec<DumpedEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read and decode the last `count` entries of `segment` ending at
/// `last_entry` (defaults to the ledger's LAC).
///
/// Never fails: read errors are captured in the returned dump.
#[must_use]
pub fn dump_tail(
    storage: &dyn LedgerStorage,
    codec: &dyn EntryCodec,
    segment: &LogSegmentMetadata,
    last_entry: Option<EntryId>,
    count: u32,
) -> EntryDump {
    let read = || -> seglog_error::Result<Vec<DumpedEntry>> {
        let ledger = OpenLedger::open(storage, segment.ledger_id, false)?;
        let handle = ledger.handle()?;
        let last = last_entry.unwrap_or_else(|| handle.last_add_confirmed());
        if last < 0 || count == 0 {
            return Ok(Vec::new());
        }
        let first = last.saturating_sub(i64::from(count) - 1).max(0);
        let entries = handle.read_entries(first, last)?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                let raw_len = entry.payload.len();
                match codec.decode(&entry.payload, segment.envelope_version) {
                    Ok(records) => DumpedEntry {
                        entry_id: entry.entry_id,
                        raw_len,
                        records,
                        error: None,
                    },
                    Err(err) => DumpedEntry {
                        entry_id: entry.entry_id,
                        raw_len,
                        records: Vec::new(),
                        error: Some(err.to_string()),
                    },
                }
            })
            .collect())
    };

    match read() {
        Ok(entries) => {
            debug!(
                target: "seglog.inspect",
                stream = %segment.stream,
                seq_no = segment.seq_no,
                entries = entries.len(),
                "dumped segment tail"
            );
            EntryDump {
                entries,
                error: None,
            }
        }
        Err(err) => EntryDump {
            entries: Vec::new(),
            error: Some(err.to_string()),
        },
    }
}
