//! Random access over remote files for media decoders.

pub mod cursor;

pub use cursor::{MediaCursor, RandomAccessSource, RemoteSource, DEFAULT_REOPEN_THRESHOLD};
