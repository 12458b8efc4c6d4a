//! Cluster fixtures shared by the integration tests.

#![allow(dead_code)]

use seglog_inspect::MemoryCluster;
use seglog_types::{EntryId, EnvelopeVersion, LedgerId, LogRecord, LogSegmentMetadata, StreamName};

pub const REPLICAS: usize = 3;
pub const READ_QUORUM: usize = 2;
/// Records packed into every fixture entry.
pub const RECORDS_PER_ENTRY: i64 = 2;

pub fn name(raw: &str) -> StreamName {
    StreamName::new(raw).expect("valid stream name")
}

/// Transaction id of `slot` in `entry` of segment `seq_no`.
pub fn tx_id(seq_no: u64, entry: EntryId, slot: i64) -> i64 {
    i64::try_from(seq_no).expect("small seq") * 1_000 + entry * RECORDS_PER_ENTRY + slot
}

/// Create a ledger holding `entries` V1 entries for segment `seq_no`.
/// Returns the last entry id (`-1` when empty).
pub fn fill_ledger(cluster: &MemoryCluster, ledger_id: LedgerId, seq_no: u64, entries: i64) -> EntryId {
    cluster
        .create_ledger(ledger_id, REPLICAS, READ_QUORUM)
        .expect("create ledger");
    let mut last = -1;
    for entry in 0..entries {
        let records: Vec<LogRecord> = (0..RECORDS_PER_ENTRY)
            .map(|slot| LogRecord::new(tx_id(seq_no, entry, slot), format!("e{entry}s{slot}")))
            .collect();
        last = cluster
            .append_records(ledger_id, &records, EnvelopeVersion::V1)
            .expect("append");
    }
    last
}

/// Healthy sealed segment: ledger LAC, data and last-record pointer agree.
pub fn sealed(
    cluster: &MemoryCluster,
    stream: &str,
    seq_no: u64,
    ledger_id: LedgerId,
    entries: i64,
) -> LogSegmentMetadata {
    let last = fill_ledger(cluster, ledger_id, seq_no, entries);
    let segment = LogSegmentMetadata::sealed(name(stream), seq_no, ledger_id, 10_000 + seq_no)
        .with_tx_range(tx_id(seq_no, 0, 0), tx_id(seq_no, last, RECORDS_PER_ENTRY - 1))
        .with_last_record(last, (RECORDS_PER_ENTRY - 1) as u64, tx_id(seq_no, last, RECORDS_PER_ENTRY - 1))
        .with_record_count((entries * RECORDS_PER_ENTRY) as u64);
    cluster.put_segment(segment.clone());
    segment
}

/// Healthy in-progress segment.
pub fn in_progress(
    cluster: &MemoryCluster,
    stream: &str,
    seq_no: u64,
    ledger_id: LedgerId,
    entries: i64,
) -> LogSegmentMetadata {
    fill_ledger(cluster, ledger_id, seq_no, entries);
    let segment = LogSegmentMetadata::in_progress(name(stream), seq_no, ledger_id);
    cluster.put_segment(segment.clone());
    segment
}

/// Sealed segment whose ledger metadata claims `ahead` more entries than
/// were ever written, and whose last-record pointer follows that claim.
pub fn sealed_with_lac_ahead(
    cluster: &MemoryCluster,
    stream: &str,
    seq_no: u64,
    ledger_id: LedgerId,
    entries: i64,
    ahead: i64,
) -> LogSegmentMetadata {
    let last = fill_ledger(cluster, ledger_id, seq_no, entries);
    let claimed = last + ahead;
    cluster
        .set_last_add_confirmed(ledger_id, claimed)
        .expect("set lac");
    let segment = LogSegmentMetadata::sealed(name(stream), seq_no, ledger_id, 10_000 + seq_no)
        .with_tx_range(tx_id(seq_no, 0, 0), tx_id(seq_no, claimed, 0))
        .with_last_record(claimed, 0, tx_id(seq_no, claimed, 0));
    cluster.put_segment(segment.clone());
    segment
}

/// A stream of `count` healthy sealed segments numbered from 1.
pub fn healthy_stream(cluster: &MemoryCluster, stream: &str, first_ledger: LedgerId, count: u64) {
    for seq_no in 1..=count {
        sealed(cluster, stream, seq_no, first_ledger + seq_no, 3);
    }
}
