//! Session module.
//!
//! This module holds the active credential and resolves address strings into
//! [`RemoteHandle`]s. Every other component works on handles produced here.

pub mod address;
pub mod context;
pub mod credential;

pub use address::{AddressLevel, RemoteAddress, SCHEME};
pub use context::{RemoteHandle, SessionContext};
pub use credential::Credential;
