//! Boundary message definitions for smbova.
//!
//! This module defines the directory entry schema handed to presentation
//! collaborators, the closed set of commands a dispatcher may issue, and the
//! responses it gets back. Messages can travel as JSON or MessagePack.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Envelope wrapper for all boundary messages.
///
/// The envelope provides versioning and sequence numbers so a dispatcher can
/// pair responses with the commands that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version for compatibility checking.
    pub version: u8,
    /// Sequence number for request/response pairing.
    pub sequence: u64,
    /// The actual message payload.
    pub payload: Message,
}

impl Envelope {
    /// Create a new envelope with the current protocol version.
    pub fn new(sequence: u64, payload: Message) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sequence,
            payload,
        }
    }

    fn check_version(self) -> Result<Self> {
        if self.version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: self.version,
            });
        }
        Ok(self)
    }
}

/// Top-level message enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    /// A command issued by the dispatcher.
    Request(Command),
    /// Successful result of a command.
    Response(Response),
    /// Transfer progress for the command with the same sequence number.
    Progress(Progress),
    /// Failed result of a command.
    Error(ErrorMessage),
}

// ============================================================================
// Directory entries
// ============================================================================

/// Type of a directory entry.
///
/// On the wire the type is an integer: `0` file, `1` directory, `4` server,
/// `5` share. Codes 2 and 3 belong to protocol subtypes that never appear in
/// listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EntryType {
    /// Plain file.
    File,
    /// Directory inside a share.
    Directory,
    /// Server on the network.
    Server,
    /// Share exported by a server.
    Share,
}

impl EntryType {
    /// Wire code for this type.
    pub fn code(self) -> u8 {
        match self {
            EntryType::File => 0,
            EntryType::Directory => 1,
            EntryType::Server => 4,
            EntryType::Share => 5,
        }
    }

    /// Whether entries of this type can be listed like a directory.
    pub fn is_directory_like(self) -> bool {
        !matches!(self, EntryType::File)
    }
}

impl From<EntryType> for u8 {
    fn from(value: EntryType) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for EntryType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(EntryType::File),
            1 => Ok(EntryType::Directory),
            4 => Ok(EntryType::Server),
            5 => Ok(EntryType::Share),
            other => Err(ProtocolError::UnknownEntryType(other)),
        }
    }
}

/// A single directory entry as seen by presentation collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Entry name without trailing separator.
    pub name: String,
    /// Entry type.
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Full remote address of the entry.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch milliseconds).
    pub last_modified: i64,
}

// ============================================================================
// Commands
// ============================================================================

/// Text encodings accepted by `readText`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    /// UTF-8, with an optional byte order mark.
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    /// UTF-16 little endian.
    #[serde(rename = "utf-16le", alias = "UTF-16LE")]
    Utf16Le,
    /// UTF-16 big endian.
    #[serde(rename = "utf-16be", alias = "UTF-16BE")]
    Utf16Be,
    /// ISO-8859-1.
    #[serde(rename = "latin1", alias = "iso-8859-1", alias = "ISO-8859-1")]
    Latin1,
}

impl std::str::FromStr for TextEncoding {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "utf-16le" | "utf16le" => Ok(TextEncoding::Utf16Le),
            "utf-16be" | "utf16be" => Ok(TextEncoding::Utf16Be),
            "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            other => Err(ProtocolError::Deserialization(format!(
                "unsupported text encoding: {other}"
            ))),
        }
    }
}

/// Closed set of operations a dispatcher can request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "camelCase")]
pub enum Command {
    /// Set or clear the session credential.
    Auth { username: String, password: String },
    /// List a directory.
    List { path: String },
    /// Read a remote file as text.
    ReadText {
        path: String,
        #[serde(default)]
        encoding: TextEncoding,
    },
    /// Read a remote file as raw bytes.
    ReadByteArray { path: String },
    /// Create an empty file.
    CreateFile { path: String },
    /// Create an empty directory.
    CreateDirectory { path: String },
    /// Delete a file or directory tree.
    Delete { path: String },
    /// Rename an entry.
    #[serde(rename_all = "camelCase")]
    Rename { path: String, new_path: String },
    /// Copy an entry.
    #[serde(rename_all = "camelCase")]
    Copy { path: String, new_path: String },
    /// Copy an entry, then delete the source.
    #[serde(rename_all = "camelCase")]
    Move { path: String, new_path: String },
    /// Upload a local file to a remote address.
    #[serde(rename_all = "camelCase")]
    Upload {
        local_path: String,
        remote_path: String,
    },
    /// Download a remote file to a local path.
    #[serde(rename_all = "camelCase")]
    Download {
        remote_path: String,
        local_path: String,
    },
}

impl Command {
    /// Name of the command as spelled on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Auth { .. } => "auth",
            Command::List { .. } => "list",
            Command::ReadText { .. } => "readText",
            Command::ReadByteArray { .. } => "readByteArray",
            Command::CreateFile { .. } => "createFile",
            Command::CreateDirectory { .. } => "createDirectory",
            Command::Delete { .. } => "delete",
            Command::Rename { .. } => "rename",
            Command::Copy { .. } => "copy",
            Command::Move { .. } => "move",
            Command::Upload { .. } => "upload",
            Command::Download { .. } => "download",
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Successful command results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Response {
    /// Command completed with nothing to return.
    Done,
    /// A single entry (create operations).
    Entry(FileEntry),
    /// A directory listing; `None` when the directory does not exist.
    Entries(Option<Vec<FileEntry>>),
    /// Decoded text content.
    Text(String),
    /// Raw file content.
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Result of a move. `complete` is false when the copy succeeded but the
    /// source could not be deleted.
    Moved {
        complete: bool,
        detail: Option<String>,
    },
    /// Result of an upload or download.
    Transferred { bytes: u64, sha256: String },
}

/// Transfer progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Fraction of the transfer completed, in `[0, 1]`.
    pub fraction: f64,
}

/// Error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code for programmatic handling.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Optional context (e.g., the command or path).
    pub context: Option<String>,
    /// Whether resubmitting the same command may succeed.
    pub recoverable: bool,
}

/// Error codes for the failure kinds of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The address could not be parsed.
    MalformedAddress,
    /// Target does not exist.
    NotFound,
    /// Credentials were rejected.
    AuthenticationFailure,
    /// Insufficient permissions.
    PermissionDenied,
    /// Transient network failure.
    NetworkError,
    /// Unexpected remote response, e.g. target already exists.
    ProtocolError,
    /// Text could not be decoded.
    EncodingError,
    /// Malformed command.
    InvalidRequest,
    /// Failure inside the dispatcher itself.
    InternalError,
}

// ============================================================================
// Serialization helpers
// ============================================================================

impl Envelope {
    /// Serialize the envelope to MessagePack bytes.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Deserialize an envelope from MessagePack bytes.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope = rmp_serde::from_slice(bytes)?;
        envelope.check_version()
    }

    /// Serialize the envelope to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize an envelope from a JSON string.
    pub fn from_json(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        envelope.check_version()
    }
}
