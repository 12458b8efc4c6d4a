//! Per-stream segment sequence validation.

use std::fmt;

use seglog_types::LogSegmentMetadata;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SequenceMode;

/// A structural defect in a stream's segment list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceViolation {
    /// The segment at `index` (retrieval order) broke contiguity.
    Gap {
        index: usize,
        expected: u64,
        actual: u64,
    },
    /// Sealed segments reuse sequence numbers held by in-progress segments.
    ContestedSequence { seq_nos: Vec<u64> },
    /// More than one segment is in progress.
    MultipleInProgress { seq_nos: Vec<u64> },
}

impl fmt::Display for SequenceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gap {
                index,
                expected,
                actual,
            } => write!(
                f,
                "sequence gap at segment index {index}: expected {expected}, found {actual}"
            ),
            Self::ContestedSequence { seq_nos } => write!(
                f,
                "sealed segments share sequence numbers with in-progress segments: {seq_nos:?}"
            ),
            Self::MultipleInProgress { seq_nos } => {
                write!(f, "multiple in-progress segments: {seq_nos:?}")
            }
        }
    }
}

/// Outcome of validating one stream's segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCheck {
    pub corrupted: bool,
    pub violations: Vec<SequenceViolation>,
    /// Every segment, in retrieval order unless re-ordered.
    pub segments: Vec<LogSegmentMetadata>,
}

impl SequenceCheck {
    /// Stable re-order by completion time; in-progress segments go last.
    #[must_use]
    pub fn ordered_by_completion_time(mut self) -> Self {
        order_by_completion_time(&mut self.segments);
        self
    }
}

/// Validate `segments` (retrieval order) under `mode`.
#[must_use]
pub fn validate(segments: Vec<LogSegmentMetadata>, mode: SequenceMode) -> SequenceCheck {
    let mut violations = Vec::new();
    match mode {
        SequenceMode::Contiguity => {
            if let Some(gap) = first_gap(&segments) {
                violations.push(gap);
            }
        }
        SequenceMode::InProgressOverlap => {
            if let Some(contested) = contested_sequence(&segments) {
                violations.push(contested);
            }
        }
    }

    let in_progress: Vec<u64> = segments
        .iter()
        .filter(|segment| segment.in_progress)
        .map(|segment| segment.seq_no)
        .collect();
    if in_progress.len() > 1 {
        violations.push(SequenceViolation::MultipleInProgress {
            seq_nos: in_progress,
        });
    }

    let corrupted = !violations.is_empty();
    if corrupted {
        debug!(
            target: "seglog.inspect",
            segments = segments.len(),
            violations = violations.len(),
            ?mode,
            "sequence violations found"
        );
    }
    SequenceCheck {
        corrupted,
        violations,
        segments,
    }
}

fn first_gap(segments: &[LogSegmentMetadata]) -> Option<SequenceViolation> {
    let mut last = segments.first()?.seq_no;
    for (index, segment) in segments.iter().enumerate().skip(1) {
        let expected = last.wrapping_add(1);
        if segment.seq_no != expected {
            return Some(SequenceViolation::Gap {
                index,
                expected,
                actual: segment.seq_no,
            });
        }
        last = segment.seq_no;
    }
    None
}

fn contested_sequence(segments: &[LogSegmentMetadata]) -> Option<SequenceViolation> {
    let held: Vec<u64> = segments
        .iter()
        .filter(|segment| segment.in_progress)
        .map(|segment| segment.seq_no)
        .collect();
    let mut seq_nos: Vec<u64> = segments
        .iter()
        .filter(|segment| segment.is_sealed() && held.contains(&segment.seq_no))
        .map(|segment| segment.seq_no)
        .collect();
    seq_nos.sort_unstable();
    seq_nos.dedup();
    (!seq_nos.is_empty()).then_some(SequenceViolation::ContestedSequence { seq_nos })
}

/// Stable sort by completion time with in-progress segments last.
pub fn order_by_completion_time(segments: &mut [LogSegmentMetadata]) {
    segments.sort_by_key(|segment| {
        (
            segment.completion_time_ms.is_none(),
            segment.completion_time_ms,
        )
    });
}
