//! Session credential state and address resolution.

use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};

use super::address::RemoteAddress;
use super::credential::Credential;
use crate::error::ShareResult;

/// An unresolved reference to a remote path bound to a session credential.
///
/// Resolving a handle does not imply the target exists. Handles are created
/// fresh for each operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHandle {
    address: RemoteAddress,
    credential: Option<Credential>,
}

impl RemoteHandle {
    /// Create a handle directly from an address.
    pub fn new(address: RemoteAddress, credential: Option<Credential>) -> Self {
        Self {
            address,
            credential,
        }
    }

    /// Target address.
    pub fn address(&self) -> &RemoteAddress {
        &self.address
    }

    /// Credential captured when the handle was resolved.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Canonical address string.
    pub fn path(&self) -> &str {
        self.address.as_str()
    }

    /// Handle for another address under the same credential.
    pub fn sibling(&self, address: RemoteAddress) -> Self {
        Self {
            address,
            credential: self.credential.clone(),
        }
    }
}

/// Holds the active credential and turns path strings into handles.
///
/// Internally synchronized so a single context can be shared by all workers.
#[derive(Debug, Default)]
pub struct SessionContext {
    credential: RwLock<Option<Credential>>,
}

impl SessionContext {
    /// Create an anonymous session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with an initial credential.
    pub fn with_credential(username: &str, password: &str) -> Self {
        let ctx = Self::new();
        ctx.set_credential(username, password);
        ctx
    }

    /// Replace the active credential.
    ///
    /// A blank username or password clears any previous credential and makes
    /// the session anonymous.
    pub fn set_credential(&self, username: &str, password: &str) {
        let credential = Credential::new(username, password);
        match &credential {
            Some(c) => info!(username = %c.username(), "Session credential set"),
            None => info!("Session credential cleared, using anonymous access"),
        }
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credential;
    }

    /// Snapshot of the active credential.
    pub fn credential(&self) -> Option<Credential> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the session is anonymous.
    pub fn is_anonymous(&self) -> bool {
        self.credential().is_none()
    }

    /// Resolve a path string into a handle bound to the current credential.
    pub fn resolve(&self, path: &str) -> ShareResult<RemoteHandle> {
        let address = RemoteAddress::parse(path)?;
        debug!(path = %address, "Resolved remote address");
        Ok(RemoteHandle::new(address, self.credential()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShareError;

    #[test]
    fn test_anonymous_by_default() {
        let ctx = SessionContext::new();
        assert!(ctx.is_anonymous());
        let handle = ctx.resolve("smb://nas/public/").unwrap();
        assert!(handle.credential().is_none());
    }

    #[test]
    fn test_set_and_clear_credential() {
        let ctx = SessionContext::with_credential("alice", "pw");
        assert_eq!(ctx.credential().unwrap().username(), "alice");

        ctx.set_credential("", "");
        assert!(ctx.is_anonymous());

        ctx.set_credential("bob", "pw2");
        ctx.set_credential("carol", "");
        assert!(ctx.is_anonymous(), "blank password must clear, not keep bob");
    }

    #[test]
    fn test_handle_captures_credential_snapshot() {
        let ctx = SessionContext::with_credential("alice", "pw");
        let handle = ctx.resolve("smb://nas/public/a.txt").unwrap();
        ctx.set_credential("", "");
        assert_eq!(handle.credential().unwrap().username(), "alice");
        assert_eq!(handle.path(), "smb://nas/public/a.txt");
    }

    #[test]
    fn test_resolve_malformed() {
        let ctx = SessionContext::new();
        assert!(matches!(
            ctx.resolve("ftp://nas/public"),
            Err(ShareError::MalformedAddress(_))
        ));
    }

    #[test]
    fn test_resolve_does_not_require_existence() {
        let ctx = SessionContext::new();
        assert!(ctx.resolve("smb://nowhere/none/nothing.txt").is_ok());
    }
}
