//! Username/password pairs presented to a server.

use std::fmt;

/// A username/password pair.
///
/// The password is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    password: String,
}

impl Credential {
    /// Build a credential, or `None` when either field is blank.
    ///
    /// A blank field is an explicit request for an anonymous session.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Option<Self> {
        let username = username.into();
        let password = password.into();
        if username.trim().is_empty() || password.trim().is_empty() {
            return None;
        }
        Some(Self { username, password })
    }

    /// Account name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Secret.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Whether this credential matches the given pair exactly.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
