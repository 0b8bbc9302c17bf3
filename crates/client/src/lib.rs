//! # smbova Core Library
//!
//! This crate provides access to network file shares addressed as
//! `smb://host/share/path`: browsing, file mutations, streamed transfers,
//! seekable media reads and a paging image gallery.
//!
//! ## Overview
//!
//! - **Session**: Holds the active credential and resolves addresses into handles
//! - **Files**: Sorted directory listings, CRUD and move, streamed upload/download
//! - **Stream**: Random access over forward-only remote streams
//! - **Gallery**: Bounded LRU image cache, cancellable fetch pipeline, view pool
//! - **Playback**: Explicit media playback state machine
//! - **Dispatcher**: Maps boundary commands onto the async client
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Dispatcher                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         ShareClient                             │
//! │              (worker permits + blocking pool)                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐   │
//! │  │ EntryCatalog │  │   FileOps    │  │   TransferEngine     │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────────────────────────────────┐ │
//! │  │ MediaCursor  │  │  Gallery (ImageCache, loader, ViewPool)  │ │
//! │  └──────────────┘  └──────────────────────────────────────────┘ │
//! ├─────────────────────────────────────────────────────────────────┤
//! │               RemoteFs (MountedShares, MemoryShares)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use client::{Config, ShareClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     let client = ShareClient::from_config(&config);
//!     if let Some(entries) = client.list("smb://nas/public/").await? {
//!         for entry in entries {
//!             println!("{} ({} bytes)", entry.name, entry.size);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`error`]: Share error taxonomy
//! - [`session`]: Addresses, credentials, handles
//! - [`backend`]: Remote filesystem contract and its implementations
//! - [`files`]: Listing, mutations, transfers
//! - [`stream`]: Seekable remote reads
//! - [`gallery`]: Image cache and paging gallery
//! - [`playback`]: Playback state machine
//! - [`client`]: Async client
//! - [`router`]: Command dispatcher

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod files;
pub mod gallery;
pub mod playback;
pub mod router;
pub mod session;
pub mod stream;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export error types for convenience
pub use error::{ShareError, ShareResult};

// Re-export session types for convenience
pub use session::{Credential, RemoteAddress, RemoteHandle, SessionContext};

// Re-export backend types for convenience
pub use backend::{Export, MemoryShares, MountedShares, RemoteFs};

// Re-export files types for convenience
pub use files::{DirectoryEntry, EntryCatalog, FileOps, MoveOutcome, TransferEngine, TransferReport};

// Re-export stream types for convenience
pub use stream::{MediaCursor, RandomAccessSource, RemoteSource};

// Re-export gallery types for convenience
pub use gallery::{Gallery, GalleryEvent, GalleryLoader, ImageCache, ViewPool};

// Re-export playback types for convenience
pub use playback::{Effect, Event, Playback, PlaybackError, State};

// Re-export client and dispatcher types for convenience
pub use client::ShareClient;
pub use router::{DispatchError, DispatchResult, Dispatcher};
