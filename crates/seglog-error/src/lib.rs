use thiserror::Error;

/// Primary error type for log inspection and repair.
///
/// Inspection *findings* (sequence gaps, LAC mismatches) are values, not
/// errors. The variants below are the conditions that stop an operation:
/// unreachable backends, undecodable entries, concurrent metadata changes and
/// misuse of the engine.
#[derive(Error, Debug)]
pub enum SeglogError {
    // === Backend Errors ===
    /// Backend (namespace, ledger storage or quorum) could not be reached.
    #[error("backend unreachable: {detail}")]
    Connectivity { detail: String },

    /// Stream does not exist in the namespace.
    #[error("no such stream: {stream}")]
    StreamNotFound { stream: String },

    /// Ledger does not exist in ledger storage.
    #[error("no such ledger: {ledger_id}")]
    LedgerNotFound { ledger_id: u64 },

    /// Ledger was fenced by a recovery open and refuses further writes.
    #[error("ledger {ledger_id} is fenced")]
    LedgerFenced { ledger_id: u64 },

    // === Repair Errors ===
    /// Stored entry could not be decoded into logical records.
    #[error("malformed entry: {detail}")]
    Decode { detail: String },

    /// Segment metadata changed between inspection and repair.
    #[error(
        "segment {stream}:{seq_no} changed concurrently: expected version {expected}, found {actual}"
    )]
    Conflict {
        stream: String,
        seq_no: u64,
        expected: u64,
        actual: u64,
    },

    /// Segment is not eligible for repair (e.g. still in progress).
    #[error("segment {stream}:{seq_no} cannot be repaired: {reason}")]
    InvalidRepairTarget {
        stream: String,
        seq_no: u64,
        reason: String,
    },

    // === Scan Errors ===
    /// Scan did not cover every selected stream and the policy forbids
    /// partial results.
    #[error("partial scan: {scanned} of {selected} streams inspected ({failed_workers} worker(s) aborted)")]
    PartialScan {
        selected: usize,
        scanned: usize,
        failed_workers: usize,
    },

    /// Worker thread panicked while inspecting a stream.
    #[error("worker {worker} panicked: {detail}")]
    WorkerPanicked { worker: usize, detail: String },

    /// Configuration value rejected during validation.
    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    // === I/O and serialization ===
    /// File or terminal I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Numeric result codes, usable as process exit codes by embedding tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Successful result.
    Ok = 0,
    /// Generic error.
    Error = 1,
    /// Internal logic error.
    Internal = 2,
    /// Backend unreachable.
    Unavailable = 3,
    /// Requested object does not exist.
    NotFound = 4,
    /// Stored data is malformed.
    Corrupt = 5,
    /// Concurrent modification detected.
    Conflict = 6,
    /// Operation refused for this target.
    Refused = 7,
    /// Scan did not complete.
    Partial = 8,
    /// Bad configuration or usage.
    Misuse = 9,
    /// Local I/O failure.
    IoErr = 10,
}

impl SeglogError {
    /// Map this error to its result code.
    #[allow(clippy::match_same_arms)]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connectivity { .. } => ErrorCode::Unavailable,
            Self::StreamNotFound { .. } | Self::LedgerNotFound { .. } => ErrorCode::NotFound,
            Self::LedgerFenced { .. } | Self::InvalidRepairTarget { .. } => ErrorCode::Refused,
            Self::Decode { .. } => ErrorCode::Corrupt,
            Self::Conflict { .. } => ErrorCode::Conflict,
            Self::PartialScan { .. } => ErrorCode::Partial,
            Self::WorkerPanicked { .. } | Self::Internal(_) => ErrorCode::Internal,
            Self::InvalidConfig { .. } => ErrorCode::Misuse,
            Self::Io(_) => ErrorCode::IoErr,
            Self::Json(_) => ErrorCode::Error,
        }
    }

    /// Whether this is a transient error that may succeed on retry.
    ///
    /// Retrying is the caller's decision; the engine never retries.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Conflict { .. })
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Connectivity { .. } => Some("Check backend availability and rerun the inspection"),
            Self::Conflict { .. } => {
                Some("Re-inspect the stream; its metadata changed since it was scanned")
            }
            Self::Decode { .. } => {
                Some("Dump the entry and check the segment's envelope version")
            }
            Self::PartialScan { .. } => {
                Some("Rerun with the failing streams, or accept a partial report")
            }
            Self::InvalidConfig { .. } => Some("Fix the configuration value and retry"),
            _ => None,
        }
    }

    /// Get the process exit code for this error.
    pub const fn exit_code(&self) -> i32 {
        self.error_code() as i32
    }

    /// Create a connectivity error.
    pub fn connectivity(detail: impl Into<String>) -> Self {
        Self::Connectivity {
            detail: detail.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(detail: impl Into<String>) -> Self {
        Self::Decode {
            detail: detail.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `SeglogError`.
pub type Result<T> = std::result::Result<T, SeglogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_conflict() {
        let err = SeglogError::Conflict {
            stream: "orders".to_owned(),
            seq_no: 3,
            expected: 4,
            actual: 5,
        };
        assert_eq!(
            err.to_string(),
            "segment orders:3 changed concurrently: expected version 4, found 5"
        );
    }

    #[test]
    fn error_display_decode() {
        let err = SeglogError::decode("zero records");
        assert_eq!(err.to_string(), "malformed entry: zero records");
    }

    #[test]
    fn error_code_mapping() {
        assert_eq!(
            SeglogError::connectivity("down").error_code(),
            ErrorCode::Unavailable
        );
        assert_eq!(SeglogError::decode("x").error_code(), ErrorCode::Corrupt);
        assert_eq!(
            SeglogError::LedgerNotFound { ledger_id: 7 }.error_code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            SeglogError::PartialScan {
                selected: 3,
                scanned: 2,
                failed_workers: 1
            }
            .error_code(),
            ErrorCode::Partial
        );
        assert_eq!(SeglogError::internal("bug").error_code(), ErrorCode::Internal);
    }

    #[test]
    fn is_transient() {
        assert!(SeglogError::connectivity("timeout").is_transient());
        assert!(!SeglogError::decode("bad").is_transient());
        assert!(!SeglogError::invalid_config("workers").is_transient());
    }

    #[test]
    fn suggestions() {
        assert!(SeglogError::connectivity("x").suggestion().is_some());
        assert!(SeglogError::decode("x").suggestion().is_some());
        assert!(SeglogError::internal("x").suggestion().is_none());
    }

    #[test]
    fn io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "prompt closed");
        let err: SeglogError = io_err.into();
        assert!(matches!(err, SeglogError::Io(_)));
        assert_eq!(err.error_code(), ErrorCode::IoErr);
    }

    #[test]
    fn exit_code() {
        assert_eq!(SeglogError::internal("x").exit_code(), 2);
        assert_eq!(SeglogError::connectivity("x").exit_code(), 3);
        assert_eq!(ErrorCode::Ok as i32, 0);
    }

    #[test]
    fn worker_panic_is_internal() {
        let err = SeglogError::WorkerPanicked {
            worker: 1,
            detail: "index out of bounds".to_owned(),
        };
        assert_eq!(err.to_string(), "worker 1 panicked: index out of bounds");
        assert_eq!(err.error_code(), ErrorCode::Internal);
        assert!(!err.is_transient());
    }
}
