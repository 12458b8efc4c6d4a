//! Collaborator contracts consumed by the engine.
//!
//! The engine never talks to a transport directly. Every backend interaction
//! goes through one of these traits, and every call blocks the calling worker
//! until the collaborator answers, whatever its internal mechanism.
//!
//! Handles are scoped resources: [`OpenLog`] and [`OpenLedger`] close the
//! underlying handle on every exit path, success or failure.

use seglog_error::Result;
use seglog_types::{
    Entry, EntryId, EnvelopeVersion, LedgerId, LogRecord, LogSegmentMetadata, RecoveredRecord,
    StreamName,
};
use tracing::warn;

/// Lazy, fallible enumeration of stream names.
pub type StreamIter<'a> = Box<dyn Iterator<Item = Result<StreamName>> + 'a>;

/// Namespace of streams.
pub trait Namespace: Send + Sync {
    /// Enumerate every stream in the namespace.
    fn list_streams(&self) -> Result<StreamIter<'_>>;

    /// Open a stream's log for metadata reads.
    fn open_log(&self, stream: &StreamName) -> Result<Box<dyn LogHandle>>;
}

/// An open stream.
pub trait LogHandle: Send {
    fn stream(&self) -> &StreamName;

    /// Segment metadata in retrieval order.
    fn segments(&self) -> Result<Vec<LogSegmentMetadata>>;

    fn close(&mut self) -> Result<()>;
}

/// Replicated ledger storage.
pub trait LedgerStorage: Send + Sync {
    /// Open a ledger for reading. With `recovery` the open fences the ledger
    /// against further writes and establishes an authoritative LAC; without
    /// it the ledger is left untouched.
    fn open_for_read(&self, ledger_id: LedgerId, recovery: bool) -> Result<Box<dyn LedgerHandle>>;
}

/// An open ledger.
pub trait LedgerHandle: Send {
    fn ledger_id(&self) -> LedgerId;

    /// LAC recorded in the ledger's own metadata at open time.
    fn last_add_confirmed(&self) -> EntryId;

    /// Read entries `from..=to`.
    fn read_entries(&self, from: EntryId, to: EntryId) -> Result<Vec<Entry>>;

    fn close(&mut self) -> Result<()>;
}

/// Distributed quorum reads across a ledger's replicas.
pub trait QuorumReader: Send + Sync {
    /// Read forward from the handle's LAC, returning every entry a quorum of
    /// replicas can still serve. Empty when nothing is retrievable.
    fn forward_read_from_last_confirmed(&self, ledger: &dyn LedgerHandle) -> Result<Vec<Entry>>;
}

/// Result of a last-record update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Pointer rewritten; the store now holds `metadata_version`.
    Updated { metadata_version: u64 },
    /// Pointer already named the recovered record; nothing written.
    Unchanged,
}

/// Segment metadata store.
pub trait MetadataUpdater: Send + Sync {
    /// Atomically rewrite the segment's last-record pointer.
    ///
    /// Fails with [`seglog_error::SeglogError::Conflict`] when the stored
    /// segment no longer matches `segment.metadata_version`.
    fn update_last_record(
        &self,
        segment: &LogSegmentMetadata,
        recovered: &RecoveredRecord,
    ) -> Result<UpdateOutcome>;
}

/// Entry decoder.
pub trait EntryCodec: Send + Sync {
    /// Decode one stored entry into its ordered logical records.
    fn decode(&self, raw: &[u8], version: EnvelopeVersion) -> Result<Vec<LogRecord>>;
}

/// Blocking operator confirmation.
pub trait OperatorPrompt {
    fn confirm(&self, text: &str) -> bool;
}

/// Scoped [`LogHandle`]: closed on drop unless closed explicitly.
pub struct OpenLog {
    handle: Option<Box<dyn LogHandle>>,
}

impl OpenLog {
    pub fn open(namespace: &dyn Namespace, stream: &StreamName) -> Result<Self> {
        let handle = namespace.open_log(stream)?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    pub fn segments(&self) -> Result<Vec<LogSegmentMetadata>> {
        match &self.handle {
            Some(handle) => handle.segments(),
            None => Err(seglog_error::SeglogError::internal("log handle already closed")),
        }
    }

    /// Close now and surface the close error.
    pub fn close(mut self) -> Result<()> {
        match self.handle.take() {
            Some(mut handle) => handle.close(),
            None => Ok(()),
        }
    }
}

impl Drop for OpenLog {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(err) = handle.close() {
                warn!(target: "seglog.inspect", stream = %handle.stream(), error = %err, "failed to close log handle");
            }
        }
    }
}

/// Scoped [`LedgerHandle`]: closed on drop unless closed explicitly.
pub struct OpenLedger {
    handle: Option<Box<dyn LedgerHandle>>,
}

impl OpenLedger {
    pub fn open(storage: &dyn LedgerStorage, ledger_id: LedgerId, recovery: bool) -> Result<Self> {
        let handle = storage.open_for_read(ledger_id, recovery)?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    pub fn handle(&self) -> Result<&dyn LedgerHandle> {
        self.handle
            .as_deref()
            .ok_or_else(|| seglog_error::SeglogError::internal("ledger handle already closed"))
    }

    pub fn close(mut self) -> Result<()> {
        match self.handle.take() {
            Some(mut handle) => handle.close(),
            None => Ok(()),
        }
    }
}

impl Drop for OpenLedger {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(err) = handle.close() {
                warn!(target: "seglog.inspect", ledger_id = handle.ledger_id(), error = %err, "failed to close ledger handle");
            }
        }
    }
}
