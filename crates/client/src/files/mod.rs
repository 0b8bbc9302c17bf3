//! Remote entry operations.
//!
//! This module provides:
//! - Directory listing with classification and collated ordering
//! - Create, delete, rename, copy and move
//! - Whole-object reads, text decoding, and buffered upload/download

pub mod catalog;
pub mod collation;
pub mod ops;
pub mod transfer;

pub use catalog::{sort_entries, DirectoryEntry, EntryCatalog};
pub use collation::CollationKey;
pub use ops::{FileOps, MoveOutcome};
pub use transfer::{decode_text, TransferEngine, TransferReport, DEFAULT_BUFFER_SIZE};
