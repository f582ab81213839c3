//! Resource keys
//!
//! A key is the package path a client asks for, e.g. `github.com/user/repo`.
//! Only canonical paths are accepted so that a key always names exactly one
//! directory under the cache root.

use crate::error::{ProxyError, ProxyResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// A validated, canonical package path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Parse a key without a leading separator
    pub fn parse(key: &str) -> ProxyResult<Self> {
        if is_canonical(key) {
            Ok(Self(key.to_string()))
        } else {
            Err(ProxyError::InvalidPath(key.to_string()))
        }
    }

    /// Parse the path component of a request URI (`/github.com/user/repo`)
    pub fn from_request_path(path: &str) -> ProxyResult<Self> {
        let key = path
            .strip_prefix('/')
            .ok_or_else(|| ProxyError::InvalidPath(path.to_string()))?;
        Self::parse(key).map_err(|_| ProxyError::InvalidPath(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments of the key
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Directory for this key under `root`
    pub fn dir_under(&self, root: &Path) -> PathBuf {
        self.segments().fold(root.to_path_buf(), |dir, seg| dir.join(seg))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_canonical(key: &str) -> bool {
    // A leading dash would reach the retriever as a flag.
    if key.is_empty() || key.starts_with('-') || key.contains('\0') {
        return false;
    }
    key.split('/')
        .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}
