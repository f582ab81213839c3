//! Sentinel-based freshness checks
//!
//! A directory is fresh when it, or any ancestor strictly below the cache
//! root, holds a sentinel file modified within the freshness window. A
//! retrieval of `github.com/user` therefore also covers
//! `github.com/user/repo/sub` for the rest of the window.

use crate::cache::key::ResourceKey;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, trace};

/// Default sentinel file name
pub const DEFAULT_SENTINEL: &str = ".go-get-proxy-last";

/// Default freshness window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Decides whether a cached directory can be served without retrieval
#[derive(Debug, Clone)]
pub struct FreshnessOracle {
    root: PathBuf,
    window: Duration,
    sentinel: String,
}

impl FreshnessOracle {
    /// Create an oracle for the cache rooted at `root`
    pub fn new(root: impl Into<PathBuf>, window: Duration) -> Self {
        Self {
            root: root.into(),
            window,
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }

    /// Use a different sentinel file name
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Local directory for a key
    pub fn package_dir(&self, key: &ResourceKey) -> PathBuf {
        key.dir_under(&self.root)
    }

    /// Whether `dir` was refreshed within the window
    pub fn is_fresh(&self, dir: &Path) -> bool {
        self.is_fresh_at(dir, SystemTime::now())
    }

    /// Same as [`is_fresh`](Self::is_fresh) with an explicit clock
    pub fn is_fresh_at(&self, dir: &Path, now: SystemTime) -> bool {
        let mut current = Some(dir);
        while let Some(candidate) = current {
            if !self.is_below_root(candidate) {
                break;
            }
            trace!("is {} new enough?", candidate.display());
            if let Ok(modified) = fs::metadata(candidate.join(&self.sentinel)).and_then(|m| m.modified()) {
                if self.within_window(modified, now) {
                    debug!("{} is fresh (sentinel in {})", dir.display(), candidate.display());
                    return true;
                }
            }
            current = candidate.parent();
        }
        debug!("{} is stale", dir.display());
        false
    }

    /// Whether a timestamp taken at `at` is still inside the window at `now`
    ///
    /// The edge is exclusive: an age equal to the window is stale. Timestamps
    /// from the future count as fresh.
    pub fn within_window(&self, at: SystemTime, now: SystemTime) -> bool {
        match now.duration_since(at) {
            Ok(age) => age < self.window,
            Err(_) => true,
        }
    }

    /// Record a refresh attempt for `dir`, creating it if needed
    pub fn stamp(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        let file = File::create(dir.join(&self.sentinel))?;
        file.set_modified(SystemTime::now())
    }

    fn is_below_root(&self, dir: &Path) -> bool {
        dir != self.root && dir.starts_with(&self.root)
    }
}
