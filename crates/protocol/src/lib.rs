//! # smbova Protocol Library
//!
//! Boundary types shared between the smbova core and the collaborators that
//! drive it (command dispatchers, presentation layers).
//!
//! ## Overview
//!
//! - **Entry schema**: [`FileEntry`] with the integer-coded [`EntryType`]
//! - **Commands**: the closed [`Command`] set a dispatcher may issue
//! - **Responses**: [`Response`] payloads and [`ErrorMessage`] failures
//! - **Envelope**: versioned, sequenced wrapper encodable as JSON or MessagePack
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{Command, Envelope, Message};
//!
//! let command = Command::List { path: "smb://nas/public/".to_string() };
//! let envelope = Envelope::new(1, Message::Request(command));
//!
//! let bytes = envelope.to_msgpack().unwrap();
//! let decoded = Envelope::from_msgpack(&bytes).unwrap();
//! assert_eq!(decoded, envelope);
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Entry schema, commands, responses, envelope
//! - [`error`]: Codec error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{
    Command, EntryType, Envelope, ErrorCode, ErrorMessage, FileEntry, Message, Progress, Response,
    TextEncoding, PROTOCOL_VERSION,
};
