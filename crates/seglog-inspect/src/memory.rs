//! Replicated in-memory backend.
//!
//! [`MemoryCluster`] implements every collaborator contract the engine
//! consumes. Ledgers keep one entry map per replica; an entry is readable
//! when at least `read_quorum` replicas hold it. The LAC recorded in a
//! ledger's metadata is tracked separately from its data so metadata
//! corruption can be modelled directly, and segment metadata carries an
//! optimistic version that every update checks.
//!
//! Failure injection covers unreachable listings, streams and ledgers.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use seglog_error::{Result, SeglogError};
use seglog_types::{
    Entry, EntryId, EnvelopeVersion, INVALID_ENTRY_ID, LedgerId, LogRecord, LogSegmentMetadata,
    RecoveredRecord, StreamName,
};
use tracing::debug;

use crate::backend::{
    LedgerHandle, LedgerStorage, LogHandle, MetadataUpdater, Namespace, QuorumReader, StreamIter,
    UpdateOutcome,
};
use crate::envelope::encode_entry;

struct MemoryLedger {
    replicas: Vec<BTreeMap<EntryId, Vec<u8>>>,
    read_quorum: usize,
    last_add_confirmed: EntryId,
    next_entry_id: EntryId,
    fenced: bool,
}

impl MemoryLedger {
    fn readable(&self, entry_id: EntryId) -> Option<&[u8]> {
        let mut holders = self
            .replicas
            .iter()
            .filter_map(|replica| replica.get(&entry_id));
        let first = holders.next()?;
        (1 + holders.count() >= self.read_quorum).then_some(first.as_slice())
    }

    /// Highest id reachable from entry 0 without a quorum gap.
    fn recoverable_last_entry(&self) -> EntryId {
        let mut last = INVALID_ENTRY_ID;
        while self.readable(last + 1).is_some() {
            last += 1;
        }
        last
    }
}

#[derive(Default)]
struct ClusterState {
    streams: BTreeMap<StreamName, Vec<LogSegmentMetadata>>,
    ledgers: HashMap<LedgerId, MemoryLedger>,
    listing_unreachable: bool,
    unreachable_streams: HashSet<StreamName>,
    unreachable_ledgers: HashSet<LedgerId>,
    update_calls: u64,
    open_handles: usize,
}

impl ClusterState {
    fn ledger(&self, ledger_id: LedgerId) -> Result<&MemoryLedger> {
        if self.unreachable_ledgers.contains(&ledger_id) {
            return Err(SeglogError::connectivity(format!(
                "ledger {ledger_id}: no replica answered"
            )));
        }
        self.ledgers
            .get(&ledger_id)
            .ok_or(SeglogError::LedgerNotFound { ledger_id })
    }

    fn ledger_mut(&mut self, ledger_id: LedgerId) -> Result<&mut MemoryLedger> {
        self.ledgers
            .get_mut(&ledger_id)
            .ok_or(SeglogError::LedgerNotFound { ledger_id })
    }

    fn check_stream(&self, stream: &StreamName) -> Result<()> {
        if self.unreachable_streams.contains(stream) {
            return Err(SeglogError::connectivity(format!(
                "metadata store unreachable for stream {stream}"
            )));
        }
        Ok(())
    }
}

/// In-memory namespace, ledger storage, quorum reader and metadata store.
///
/// Cloning shares the same cluster.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty ledger with `replicas` copies, readable from
    /// `read_quorum` of them.
    pub fn create_ledger(
        &self,
        ledger_id: LedgerId,
        replicas: usize,
        read_quorum: usize,
    ) -> Result<()> {
        if replicas == 0 || read_quorum == 0 || read_quorum > replicas {
            return Err(SeglogError::invalid_config(format!(
                "ledger {ledger_id}: read quorum {read_quorum} invalid for {replicas} replicas"
            )));
        }
        let mut state = self.state.lock();
        if state.ledgers.contains_key(&ledger_id) {
            return Err(SeglogError::invalid_config(format!(
                "ledger {ledger_id} already exists"
            )));
        }
        state.ledgers.insert(
            ledger_id,
            MemoryLedger {
                replicas: vec![BTreeMap::new(); replicas],
                read_quorum,
                last_add_confirmed: INVALID_ENTRY_ID,
                next_entry_id: 0,
                fenced: false,
            },
        );
        Ok(())
    }

    /// Append a raw entry to every replica and advance the LAC.
    pub fn add_entry(&self, ledger_id: LedgerId, payload: Vec<u8>) -> Result<EntryId> {
        let mut state = self.state.lock();
        let ledger = state.ledger_mut(ledger_id)?;
        if ledger.fenced {
            return Err(SeglogError::LedgerFenced { ledger_id });
        }
        let entry_id = ledger.next_entry_id;
        for replica in &mut ledger.replicas {
            replica.insert(entry_id, payload.clone());
        }
        ledger.next_entry_id += 1;
        ledger.last_add_confirmed = entry_id;
        Ok(entry_id)
    }

    /// Encode `records` as one entry and append it.
    pub fn append_records(
        &self,
        ledger_id: LedgerId,
        records: &[LogRecord],
        version: EnvelopeVersion,
    ) -> Result<EntryId> {
        let payload = encode_entry(records, version)?;
        self.add_entry(ledger_id, payload)
    }

    /// Remove an entry from one replica, as if the write never landed there.
    pub fn drop_entry_from_replica(
        &self,
        ledger_id: LedgerId,
        replica: usize,
        entry_id: EntryId,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let ledger = state.ledger_mut(ledger_id)?;
        let copy = ledger.replicas.get_mut(replica).ok_or_else(|| {
            SeglogError::invalid_config(format!("ledger {ledger_id} has no replica {replica}"))
        })?;
        copy.remove(&entry_id);
        Ok(())
    }

    /// Overwrite the LAC in the ledger's metadata without touching data.
    pub fn set_last_add_confirmed(&self, ledger_id: LedgerId, lac: EntryId) -> Result<()> {
        self.state.lock().ledger_mut(ledger_id)?.last_add_confirmed = lac;
        Ok(())
    }

    pub fn last_add_confirmed(&self, ledger_id: LedgerId) -> Result<EntryId> {
        Ok(self.state.lock().ledger_mut(ledger_id)?.last_add_confirmed)
    }

    pub fn is_fenced(&self, ledger_id: LedgerId) -> Result<bool> {
        Ok(self.state.lock().ledger_mut(ledger_id)?.fenced)
    }

    /// Register a stream with no segments.
    pub fn add_stream(&self, stream: StreamName) {
        self.state.lock().streams.entry(stream).or_default();
    }

    /// Append segment metadata to its stream's retrieval order.
    pub fn put_segment(&self, segment: LogSegmentMetadata) {
        self.state
            .lock()
            .streams
            .entry(segment.stream.clone())
            .or_default()
            .push(segment);
    }

    /// Current metadata of the first segment of `stream` numbered `seq_no`.
    #[must_use]
    pub fn segment(&self, stream: &StreamName, seq_no: u64) -> Option<LogSegmentMetadata> {
        self.state
            .lock()
            .streams
            .get(stream)?
            .iter()
            .find(|segment| segment.seq_no == seq_no)
            .cloned()
    }

    /// Mutate a stored segment as a concurrent writer would; bumps its
    /// metadata version.
    pub fn modify_segment(
        &self,
        stream: &StreamName,
        seq_no: u64,
        change: impl FnOnce(&mut LogSegmentMetadata),
    ) -> Result<()> {
        let mut state = self.state.lock();
        let segment = state
            .streams
            .get_mut(stream)
            .and_then(|segments| segments.iter_mut().find(|segment| segment.seq_no == seq_no))
            .ok_or_else(|| SeglogError::StreamNotFound {
                stream: stream.to_string(),
            })?;
        change(segment);
        segment.metadata_version += 1;
        Ok(())
    }

    pub fn set_listing_unreachable(&self, unreachable: bool) {
        self.state.lock().listing_unreachable = unreachable;
    }

    pub fn set_stream_unreachable(&self, stream: &StreamName, unreachable: bool) {
        let mut state = self.state.lock();
        if unreachable {
            state.unreachable_streams.insert(stream.clone());
        } else {
            state.unreachable_streams.remove(stream);
        }
    }

    pub fn set_ledger_unreachable(&self, ledger_id: LedgerId, unreachable: bool) {
        let mut state = self.state.lock();
        if unreachable {
            state.unreachable_ledgers.insert(ledger_id);
        } else {
            state.unreachable_ledgers.remove(&ledger_id);
        }
    }

    /// Number of `update_last_record` calls received.
    #[must_use]
    pub fn update_calls(&self) -> u64 {
        self.state.lock().update_calls
    }

    /// Log and ledger handles opened and not yet closed.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.state.lock().open_handles
    }
}

impl Namespace for MemoryCluster {
    fn list_streams(&self) -> Result<StreamIter<'_>> {
        let state = self.state.lock();
        if state.listing_unreachable {
            return Err(SeglogError::connectivity("namespace listing unreachable"));
        }
        let names: Vec<StreamName> = state.streams.keys().cloned().collect();
        Ok(Box::new(names.into_iter().map(Ok)))
    }

    fn open_log(&self, stream: &StreamName) -> Result<Box<dyn LogHandle>> {
        let mut state = self.state.lock();
        state.check_stream(stream)?;
        if !state.streams.contains_key(stream) {
            return Err(SeglogError::StreamNotFound {
                stream: stream.to_string(),
            });
        }
        state.open_handles += 1;
        Ok(Box::new(MemoryLog {
            state: Arc::clone(&self.state),
            stream: stream.clone(),
            open: true,
        }))
    }
}

struct MemoryLog {
    state: Arc<Mutex<ClusterState>>,
    stream: StreamName,
    open: bool,
}

impl LogHandle for MemoryLog {
    fn stream(&self) -> &StreamName {
        &self.stream
    }

    fn segments(&self) -> Result<Vec<LogSegmentMetadata>> {
        let state = self.state.lock();
        state.check_stream(&self.stream)?;
        state
            .streams
            .get(&self.stream)
            .cloned()
            .ok_or_else(|| SeglogError::StreamNotFound {
                stream: self.stream.to_string(),
            })
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.state.lock().open_handles -= 1;
        }
        Ok(())
    }
}

impl LedgerStorage for MemoryCluster {
    fn open_for_read(&self, ledger_id: LedgerId, recovery: bool) -> Result<Box<dyn LedgerHandle>> {
        let mut state = self.state.lock();
        state.ledger(ledger_id)?;
        let ledger = state.ledger_mut(ledger_id)?;
        if recovery {
            let recovered = ledger.recoverable_last_entry();
            debug!(
                target: "seglog.inspect",
                ledger_id,
                recorded = ledger.last_add_confirmed,
                recovered,
                "ledger recovered and fenced"
            );
            ledger.last_add_confirmed = recovered;
            ledger.fenced = true;
        }
        let last_add_confirmed = ledger.last_add_confirmed;
        state.open_handles += 1;
        Ok(Box::new(MemoryLedgerHandle {
            state: Arc::clone(&self.state),
            ledger_id,
            last_add_confirmed,
            open: true,
        }))
    }
}

struct MemoryLedgerHandle {
    state: Arc<Mutex<ClusterState>>,
    ledger_id: LedgerId,
    last_add_confirmed: EntryId,
    open: bool,
}

impl LedgerHandle for MemoryLedgerHandle {
    fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    fn last_add_confirmed(&self) -> EntryId {
        self.last_add_confirmed
    }

    fn read_entries(&self, from: EntryId, to: EntryId) -> Result<Vec<Entry>> {
        let state = self.state.lock();
        let ledger = state.ledger(self.ledger_id)?;
        (from.max(0)..=to)
            .map(|entry_id| {
                ledger
                    .readable(entry_id)
                    .map(|payload| Entry::new(entry_id, payload.to_vec()))
                    .ok_or_else(|| {
                        SeglogError::connectivity(format!(
                            "ledger {}: entry {entry_id} not readable from a quorum",
                            self.ledger_id
                        ))
                    })
            })
            .collect()
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.state.lock().open_handles -= 1;
        }
        Ok(())
    }
}

impl QuorumReader for MemoryCluster {
    fn forward_read_from_last_confirmed(&self, ledger: &dyn LedgerHandle) -> Result<Vec<Entry>> {
        let state = self.state.lock();
        let stored = state.ledger(ledger.ledger_id())?;
        let mut entries = Vec::new();
        let mut entry_id = ledger.last_add_confirmed().max(0);
        while let Some(payload) = stored.readable(entry_id) {
            entries.push(Entry::new(entry_id, payload.to_vec()));
            entry_id += 1;
        }
        Ok(entries)
    }
}

impl MetadataUpdater for MemoryCluster {
    fn update_last_record(
        &self,
        segment: &LogSegmentMetadata,
        recovered: &RecoveredRecord,
    ) -> Result<UpdateOutcome> {
        let mut state = self.state.lock();
        state.update_calls += 1;
        state.check_stream(&segment.stream)?;
        let stored = state
            .streams
            .get_mut(&segment.stream)
            .and_then(|segments| {
                segments.iter_mut().find(|stored| {
                    stored.seq_no == segment.seq_no && stored.ledger_id == segment.ledger_id
                })
            })
            .ok_or_else(|| SeglogError::InvalidRepairTarget {
                stream: segment.stream.to_string(),
                seq_no: segment.seq_no,
                reason: format!("no segment backed by ledger {}", segment.ledger_id),
            })?;
        if stored.points_at(recovered) {
            return Ok(UpdateOutcome::Unchanged);
        }
        if stored.metadata_version != segment.metadata_version {
            return Err(SeglogError::Conflict {
                stream: segment.stream.to_string(),
                seq_no: segment.seq_no,
                expected: segment.metadata_version,
                actual: stored.metadata_version,
            });
        }
        let metadata_version = stored.metadata_version + 1;
        *stored = stored.with_recovered_tail(recovered);
        stored.metadata_version = metadata_version;
        Ok(UpdateOutcome::Updated { metadata_version })
    }
}
