//! Remote addresses of the form `smb://host/share/dir/file`.
//!
//! A trailing `/` marks a directory-like address. `smb://` addresses the
//! network itself and lists servers; `smb://host/` lists the shares exported
//! by `host`.

use std::fmt;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{ShareError, ShareResult};

/// URL scheme accepted by [`RemoteAddress::parse`].
pub const SCHEME: &str = "smb";

/// How deep into the share hierarchy an address points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressLevel {
    /// `smb://`
    Network,
    /// `smb://host/`
    Server,
    /// `smb://host/share/`
    Share,
    /// Anything below a share.
    Entry,
}

/// A parsed, normalized remote address.
///
/// Segments below the host are kept percent-decoded; [`RemoteAddress::as_str`]
/// renders the canonical encoded form that is used as a cache key and in
/// directory entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteAddress {
    host: Option<String>,
    segments: Vec<String>,
    directory: bool,
    canonical: String,
}

impl RemoteAddress {
    /// Parse an address string.
    pub fn parse(input: &str) -> ShareResult<Self> {
        let malformed = |why: &str| ShareError::MalformedAddress(format!("{input}: {why}"));

        let url = Url::parse(input.trim()).map_err(|e| malformed(&e.to_string()))?;
        if url.scheme() != SCHEME {
            return Err(malformed("scheme must be smb"));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(malformed("credentials belong to the session, not the address"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(malformed("query and fragment are not allowed"));
        }
        if url.port().is_some() {
            return Err(malformed("ports are not supported"));
        }

        // Url silently resolves dot segments, so reject them on the raw text.
        let raw_path = input
            .trim()
            .splitn(4, '/')
            .nth(3)
            .unwrap_or_default();
        for raw in raw_path.split('/') {
            let decoded = percent_decode_str(raw).decode_utf8_lossy();
            if decoded == "." || decoded == ".." {
                return Err(malformed("relative segments are not allowed"));
            }
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| h.to_ascii_lowercase());

        let mut segments = Vec::new();
        if let Some(parts) = url.path_segments() {
            for part in parts.filter(|p| !p.is_empty()) {
                let decoded = percent_decode_str(part)
                    .decode_utf8()
                    .map_err(|_| malformed("segment is not valid UTF-8"))?;
                if !is_plain_name(&decoded) {
                    return Err(malformed("encoded separators and relative segments are not allowed"));
                }
                segments.push(decoded.into_owned());
            }
        }

        if host.is_none() && !segments.is_empty() {
            return Err(malformed("missing host"));
        }

        let directory = segments.len() < 2 || url.path().ends_with('/');
        Ok(Self::build(host, segments, directory))
    }

    fn build(host: Option<String>, segments: Vec<String>, directory: bool) -> Self {
        let mut canonical = format!("{SCHEME}://");
        if let Some(host) = &host {
            canonical.push_str(host);
            canonical.push('/');
        }
        let encoded: Vec<String> = segments.iter().map(|s| encode_segment(s)).collect();
        canonical.push_str(&encoded.join("/"));
        if directory && !segments.is_empty() {
            canonical.push('/');
        }
        Self {
            host,
            segments,
            directory,
            canonical,
        }
    }

    /// Level of this address in the hierarchy.
    pub fn level(&self) -> AddressLevel {
        match (&self.host, self.segments.len()) {
            (None, _) => AddressLevel::Network,
            (Some(_), 0) => AddressLevel::Server,
            (Some(_), 1) => AddressLevel::Share,
            _ => AddressLevel::Entry,
        }
    }

    /// Server name, lowercased.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Share name, if the address points at or below a share.
    pub fn share(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Decoded path segments below the share.
    pub fn entry_segments(&self) -> &[String] {
        self.segments.get(1..).unwrap_or_default()
    }

    /// Whether the address carries a trailing separator.
    pub fn is_directory(&self) -> bool {
        self.directory
    }

    /// Last component of the address without trailing separator.
    ///
    /// Empty for the network root.
    pub fn name(&self) -> &str {
        match self.segments.last() {
            Some(last) => last.as_str(),
            None => self.host.as_deref().unwrap_or_default(),
        }
    }

    /// Canonical encoded form.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Address of a child of this address.
    pub fn child(&self, name: &str, directory: bool) -> ShareResult<Self> {
        if name.is_empty() || !is_plain_name(name) {
            return Err(ShareError::MalformedAddress(format!(
                "{}: invalid child name {name:?}",
                self.canonical
            )));
        }
        match &self.host {
            None => Ok(Self::build(Some(name.to_ascii_lowercase()), Vec::new(), true)),
            Some(host) => {
                let mut segments = self.segments.clone();
                segments.push(name.to_string());
                // shares are always directory-like
                let directory = directory || segments.len() == 1;
                Ok(Self::build(Some(host.clone()), segments, directory))
            }
        }
    }

    /// The enclosing address, or `None` for the network root.
    pub fn parent(&self) -> Option<Self> {
        self.host.as_ref()?;
        if self.segments.is_empty() {
            return Some(Self::build(None, Vec::new(), true));
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self::build(self.host.clone(), segments, true))
    }

    /// Same location with the trailing separator set or cleared.
    pub fn with_directory(&self, directory: bool) -> Self {
        if self.level() != AddressLevel::Entry {
            return self.clone();
        }
        Self::build(self.host.clone(), self.segments.clone(), directory)
    }

    /// Whether `other` is this address or lies below it.
    pub fn contains(&self, other: &RemoteAddress) -> bool {
        match (&self.host, &other.host) {
            (None, _) => true,
            (Some(a), Some(b)) if a == b => other.segments.starts_with(&self.segments),
            _ => false,
        }
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// A single path component: no separators and not a relative segment.
fn is_plain_name(name: &str) -> bool {
    !name.contains(['/', '\\']) && name != "." && name != ".."
}

fn encode_segment(segment: &str) -> String {
    use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
    const SEGMENT: &AsciiSet = &CONTROLS
        .add(b' ')
        .add(b'"')
        .add(b'#')
        .add(b'%')
        .add(b'/')
        .add(b'<')
        .add(b'>')
        .add(b'?')
        .add(b'`')
        .add(b'{')
        .add(b'}');
    utf8_percent_encode(segment, SEGMENT).to_string()
}
