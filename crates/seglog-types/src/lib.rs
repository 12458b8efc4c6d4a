//! Data model shared by the inspection engine and its collaborators.
//!
//! Every metadata value here is an immutable snapshot taken at inspection
//! time. Nothing in this crate performs I/O.

pub mod record;
pub mod segment;
pub mod stream;

pub use record::{Entry, EntryId, INVALID_ENTRY_ID, LogRecord, RecordPosition, RecoveredRecord};
pub use segment::{EnvelopeVersion, LastRecordPointer, LedgerId, LogSegmentMetadata};
pub use stream::StreamName;
