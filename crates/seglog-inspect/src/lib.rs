//! Integrity inspection and last-record repair for segmented, replicated logs.

pub mod backend;
pub mod config;
pub mod consistency;
pub mod dump;
pub mod envelope;
pub mod inspect;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod partition;
pub mod prompt;
pub mod repair;
pub mod report;
pub mod selector;
pub mod sequence;
pub mod telemetry;

pub use backend::{
    EntryCodec, LedgerHandle, LedgerStorage, LogHandle, MetadataUpdater, Namespace, OpenLedger,
    OpenLog, OperatorPrompt, QuorumReader, StreamIter, UpdateOutcome,
};
pub use config::{
    DEFAULT_DUMP_ENTRY_COUNT, DEFAULT_WORKERS, InspectConfig, MAX_DUMP_ENTRY_COUNT, MAX_WORKERS,
    PartialScanPolicy, ReportOptions, SequenceMode,
};
pub use consistency::{LedgerConsistencyResult, check_segment};
pub use dump::{DumpedEntry, EntryDump, dump_tail};
pub use envelope::{EnvelopeCodec, decode_entry, encode_entry};
pub use inspect::Inspector;
pub use logging::{LogFormat, init_tracing};
pub use memory::MemoryCluster;
pub use metrics::{GLOBAL_INSPECT_METRICS, InspectMetrics, InspectMetricsSnapshot};
pub use partition::{WorkerJoin, effective_workers, fan_out, partition};
pub use prompt::{AlwaysConfirm, LinePrompt, NeverConfirm};
pub use repair::{RepairExecutor, RepairOutcome, RepairPlan, RepairSummary, SegmentRepair};
pub use report::{
    CorruptionCandidate, CorruptionReason, InspectionReport, REPORT_SCHEMA_VERSION,
    ScanCompleteness, SegmentFinding, WorkerOutcome, WorkerStatus,
};
pub use selector::select_streams;
pub use sequence::{
    SequenceCheck, SequenceViolation, order_by_completion_time, validate as validate_sequence,
};
pub use telemetry::{InspectEvent, InspectEventRingBuffer, InspectObserver, NoOpObserver};
