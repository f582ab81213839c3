//! Entry selection and normalization rules

use crate::cache::DEFAULT_SENTINEL;
use crate::config::schema::ArchiveConfig;
use std::fmt;
use std::fs::Metadata;

/// Mode written for entries with any execute bit set
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Mode written for everything else
pub const REGULAR_MODE: u32 = 0o644;

/// Owner name written for every entry
pub const OWNER_NAME: &str = "root";

/// Owner id written for every entry
pub const OWNER_ID: u64 = 0;

/// Node types that can appear in an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

impl EntryKind {
    /// Classify from `symlink_metadata`; `None` for sockets, devices and the like
    pub fn from_metadata(meta: &Metadata) -> Option<Self> {
        let ft = meta.file_type();
        if ft.is_symlink() {
            Some(Self::Symlink)
        } else if ft.is_dir() {
            Some(Self::Dir)
        } else if ft.is_file() {
            Some(Self::File)
        } else {
            None
        }
    }

    pub fn entry_type(&self) -> tar::EntryType {
        match self {
            Self::File => tar::EntryType::Regular,
            Self::Dir => tar::EntryType::Directory,
            Self::Symlink => tar::EntryType::Symlink,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Dir => "directory",
            Self::Symlink => "symlink",
        };
        write!(f, "{}", name)
    }
}

/// Which top-level entries go into an archive
#[derive(Debug, Clone)]
pub struct ArchivePolicy {
    /// Files with this suffix are allowed up to `max_file_size`
    pub source_suffix: String,
    /// Other files above this size are left out
    pub small_file_limit: u64,
    /// Nothing above this size is included
    pub max_file_size: u64,
    /// Freshness marker, never archived
    pub sentinel: String,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            source_suffix: ".go".to_string(),
            small_file_limit: 10 << 10,
            max_file_size: 1 << 20,
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }
}

impl ArchivePolicy {
    pub fn from_config(config: &ArchiveConfig, sentinel: &str) -> Self {
        Self {
            source_suffix: config.source_suffix.clone(),
            small_file_limit: config.small_file_limit,
            max_file_size: config.max_file_size,
            sentinel: sentinel.to_string(),
        }
    }

    /// Whether an entry named `name` of `size` bytes belongs in the archive
    pub fn admits(&self, name: &str, kind: EntryKind, size: u64) -> bool {
        if name == self.sentinel {
            return false;
        }
        if kind == EntryKind::Dir {
            return true;
        }
        if !name.ends_with(&self.source_suffix) && size > self.small_file_limit {
            return false;
        }
        size <= self.max_file_size
    }
}

/// Collapse permission bits to one of the two archived modes
pub fn normalize_mode(mode: u32) -> u32 {
    if mode & 0o111 != 0 {
        EXECUTABLE_MODE
    } else {
        REGULAR_MODE
    }
}
