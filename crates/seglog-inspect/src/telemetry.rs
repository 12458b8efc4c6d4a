//! Structured inspection events.
//!
//! Observers receive one [`InspectEvent`] per scan milestone, flagged stream,
//! worker failure and repair outcome. Observers are called from worker
//! threads and must not block or perform I/O.

use std::sync::OnceLock;
use std::time::Instant;

use seglog_types::StreamName;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Event schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InspectEvent {
    ScanStarted {
        selected: usize,
        workers: usize,
        timestamp_ns: u64,
    },
    ScanCompleted {
        scanned: usize,
        flagged: usize,
        complete: bool,
        elapsed_ms: u64,
        timestamp_ns: u64,
    },
    StreamFlagged {
        stream: StreamName,
        reasons: usize,
        timestamp_ns: u64,
    },
    /// A worker stopped before finishing its slice.
    WorkerAborted {
        worker: usize,
        stream: Option<StreamName>,
        detail: String,
        timestamp_ns: u64,
    },
    RepairFinished {
        stream: StreamName,
        seq_no: u64,
        outcome: &'static str,
        timestamp_ns: u64,
    },
}

impl InspectEvent {
    #[must_use]
    pub const fn timestamp_ns(&self) -> u64 {
        match self {
            Self::ScanStarted { timestamp_ns, .. }
            | Self::ScanCompleted { timestamp_ns, .. }
            | Self::StreamFlagged { timestamp_ns, .. }
            | Self::WorkerAborted { timestamp_ns, .. }
            | Self::RepairFinished { timestamp_ns, .. } => *timestamp_ns,
        }
    }

    /// Short classification label for this event kind.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::ScanStarted { .. } => "scan_started",
            Self::ScanCompleted { .. } => "scan_completed",
            Self::StreamFlagged { .. } => "stream_flagged",
            Self::WorkerAborted { .. } => "worker_aborted",
            Self::RepairFinished { .. } => "repair_finished",
        }
    }
}

/// Nanoseconds since the first event of this process.
#[must_use]
pub fn monotonic_ns() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let elapsed = EPOCH.get_or_init(Instant::now).elapsed();
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

pub trait InspectObserver: Send + Sync {
    fn on_event(&self, event: &InspectEvent);
}

/// Observer that drops every event.
pub struct NoOpObserver;

impl InspectObserver for NoOpObserver {
    #[inline(always)]
    fn on_event(&self, _event: &InspectEvent) {}
}

/// Keeps the last `capacity` events for diagnostic queries.
pub struct InspectEventRingBuffer {
    events: parking_lot::Mutex<RingInner>,
}

struct RingInner {
    buf: Vec<InspectEvent>,
    capacity: usize,
    write_pos: usize,
    count: usize,
}

impl InspectEventRingBuffer {
    /// Create a ring buffer holding up to `capacity` events (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: parking_lot::Mutex::new(RingInner {
                buf: Vec::with_capacity(capacity),
                capacity,
                write_pos: 0,
                count: 0,
            }),
        }
    }

    /// Stored events, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<InspectEvent> {
        let inner = self.events.lock();
        let n = inner.count.min(inner.capacity);
        let start = if inner.count >= inner.capacity {
            inner.write_pos
        } else {
            0
        };
        (0..n)
            .map(|i| inner.buf[(start + i) % inner.capacity].clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.events.lock();
        inner.count.min(inner.capacity)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events of one kind, oldest first.
    #[must_use]
    pub fn of_kind(&self, kind: &str) -> Vec<InspectEvent> {
        self.drain()
            .into_iter()
            .filter(|event| event.kind_str() == kind)
            .collect()
    }
}

impl InspectObserver for InspectEventRingBuffer {
    fn on_event(&self, event: &InspectEvent) {
        let mut inner = self.events.lock();
        let pos = inner.write_pos;
        if inner.buf.len() < inner.capacity {
            inner.buf.push(event.clone());
        } else {
            inner.buf[pos] = event.clone();
        }
        inner.write_pos = (pos + 1) % inner.capacity;
        inner.count += 1;
    }
}
