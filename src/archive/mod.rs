//! Filtered, normalized tar.gz archives of a package directory
//!
//! Only the top level of the directory is archived. Subdirectories show up
//! as empty directory entries and are never listed. Every entry gets fixed
//! ownership and one of two modes, so two archives of the same tree only
//! differ where file contents or timestamps differ.
//!
//! The archive is written straight into the sink as entries are read; the
//! gzip and tar layers buffer at most one block.

pub mod policy;

pub use policy::{normalize_mode, ArchivePolicy, EntryKind};

use crate::error::{ProxyError, ProxyResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use policy::{OWNER_ID, OWNER_NAME};
use std::cell::Cell;
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::UNIX_EPOCH;
use tracing::{debug, error, trace};

/// Write a gzip-compressed tar of the top level of `dir` into `sink`
///
/// On success both trailers are written and the flushed sink is returned.
/// On error the sink has received a prefix of the archive with no tar
/// trailer and no gzip footer, so readers see it as truncated.
pub fn write_archive<W: Write>(sink: W, dir: &Path, policy: &ArchivePolicy) -> ProxyResult<W> {
    let aborted = Rc::new(Cell::new(false));
    let sink = AbortableSink {
        inner: sink,
        aborted: Rc::clone(&aborted),
    };
    let mut builder = tar::Builder::new(GzEncoder::new(sink, Compression::default()));

    let written = match fill_archive(&mut builder, dir, policy) {
        Ok(written) => written,
        Err(e) => {
            // The tar and gzip writers finish themselves on drop; discard that.
            aborted.set(true);
            return Err(e);
        }
    };

    let encoder = builder
        .into_inner()
        .map_err(|e| ProxyError::archive(dir, e))?;
    let mut sink = encoder
        .finish()
        .map_err(|e| ProxyError::archive(dir, e))?
        .inner;
    sink.flush().map_err(|e| ProxyError::archive(dir, e))?;

    debug!("archived {} entries from {}", written, dir.display());
    Ok(sink)
}

/// Append every admitted entry and both trailers; returns the entry count
fn fill_archive<W: Write>(
    builder: &mut tar::Builder<GzEncoder<W>>,
    dir: &Path,
    policy: &ArchivePolicy,
) -> ProxyResult<usize> {
    let mut written = 0usize;
    for path in list_top_level(dir)? {
        match append_entry(builder, &path, policy) {
            Ok(true) => written += 1,
            Ok(false) => {}
            Err(e) => {
                error!("error archiving {}: {}", path.display(), e);
                return Err(e);
            }
        }
    }

    builder.finish().map_err(|e| ProxyError::archive(dir, e))?;
    builder
        .get_mut()
        .try_finish()
        .map_err(|e| ProxyError::archive(dir, e))?;
    Ok(written)
}

/// Sink that swallows everything once the archive has been abandoned
struct AbortableSink<W> {
    inner: W,
    aborted: Rc<Cell<bool>>,
}

impl<W: Write> Write for AbortableSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.aborted.get() {
            return Ok(buf.len());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.aborted.get() {
            return Ok(());
        }
        self.inner.flush()
    }
}

/// Reader that yields exactly `remaining` bytes or fails
///
/// The header size is written before the body is copied, so a file that
/// shrinks in between must not be padded out silently.
struct ExactReader<R> {
    inner: io::Take<R>,
    remaining: u64,
}

impl<R: Read> ExactReader<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner: inner.take(len),
            remaining: len,
        }
    }
}

impl<R: Read> Read for ExactReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && self.remaining > 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shrank while archiving, {} bytes missing", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Immediate children of `dir`, sorted by name
fn list_top_level(dir: &Path) -> ProxyResult<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)
        .and_then(|entries| {
            entries
                .map(|entry| entry.map(|e| e.path()))
                .collect::<io::Result<Vec<_>>>()
        })
        .map_err(|e| {
            error!("error listing {}: {}", dir.display(), e);
            ProxyError::archive(dir, e)
        })?;
    paths.sort();
    Ok(paths)
}

/// Append one entry; `Ok(false)` when the policy leaves it out
fn append_entry<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &Path,
    policy: &ArchivePolicy,
) -> ProxyResult<bool> {
    let name = match path.file_name() {
        Some(name) => PathBuf::from(name),
        None => return Ok(false),
    };
    let name_str = name.to_string_lossy();

    let meta = fs::symlink_metadata(path).map_err(|e| ProxyError::archive(path, e))?;
    let kind = EntryKind::from_metadata(&meta).ok_or_else(|| ProxyError::UnsupportedEntry {
        path: path.to_path_buf(),
        kind: describe_unsupported(&meta),
    })?;

    if !policy.admits(&name_str, kind, meta.len()) {
        trace!("skipping {} ({}, {} bytes)", name_str, kind, meta.len());
        return Ok(false);
    }

    let mut header = normalized_header(&meta, kind).map_err(|e| ProxyError::archive(path, e))?;
    match kind {
        EntryKind::File => {
            header.set_size(meta.len());
            let file = File::open(path).map_err(|e| ProxyError::archive(path, e))?;
            builder
                .append_data(&mut header, &name, ExactReader::new(file, meta.len()))
                .map_err(|e| ProxyError::archive(path, e))?;
        }
        EntryKind::Dir => {
            header.set_size(0);
            builder
                .append_data(&mut header, &name, io::empty())
                .map_err(|e| ProxyError::archive(path, e))?;
        }
        EntryKind::Symlink => {
            let target = resolve_symlink(path)?;
            header.set_size(0);
            builder
                .append_link(&mut header, &name, target)
                .map_err(|e| ProxyError::archive(path, e))?;
        }
    }
    Ok(true)
}

/// Header with fixed ownership and collapsed permissions
fn normalized_header(meta: &Metadata, kind: EntryKind) -> io::Result<tar::Header> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(kind.entry_type());
    header.set_mode(normalize_mode(permission_bits(meta)));
    header.set_uid(OWNER_ID);
    header.set_gid(OWNER_ID);
    header.set_username(OWNER_NAME)?;
    header.set_groupname(OWNER_NAME)?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());
    header.set_mtime(mtime);
    Ok(header)
}

/// Link target, provided the link points at something that exists
fn resolve_symlink(path: &Path) -> ProxyResult<PathBuf> {
    let unresolved = |source| ProxyError::SymlinkUnresolved {
        path: path.to_path_buf(),
        source,
    };
    let target = fs::read_link(path).map_err(unresolved)?;
    fs::metadata(path).map_err(unresolved)?;
    Ok(target)
}

#[cfg(unix)]
fn permission_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(meta: &Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(unix)]
fn describe_unsupported(meta: &Metadata) -> String {
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};
    let ft = meta.file_type();
    let kind = if ft.is_fifo() {
        "fifo"
    } else if ft.is_socket() {
        "socket"
    } else if ft.is_char_device() {
        "character device"
    } else if ft.is_block_device() {
        "block device"
    } else {
        "unknown"
    };
    format!("{} (mode {:o})", kind, meta.permissions().mode())
}

#[cfg(not(unix))]
fn describe_unsupported(_meta: &Metadata) -> String {
    "unknown".to_string()
}
