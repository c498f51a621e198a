//! The capability set implemented once per backing-store kind.
//!
//! Paths handed to a provider are provider-relative, slash-separated and
//! already normalized by [`FileSystemProvider::normalize`]. Absence is a
//! value: `attributes` answers `None`, `length`/`timestamp` answer `0`,
//! `list` answers an empty vector. Errors are reserved for real failures
//! (I/O, cancellation, unsupported mutation).

use std::io::{Cursor, Read};

use crate::archive::ArchiveProvider;
use crate::path::normalize_separators;
use crate::{FileAttributes, VfsError, VfsResult};

pub trait FileSystemProvider: Send + Sync + 'static {
    /// Protocol name used in urls (`protocol://path`).
    fn protocol(&self) -> &'static str;

    fn is_case_sensitive(&self) -> bool {
        true
    }

    fn is_read_only(&self) -> bool {
        false
    }

    /// Precedence when several providers claim the same path; higher wins.
    fn rank(&self) -> i32 {
        0
    }

    /// Convert separators, collapse duplicates and make the path absolute.
    ///
    /// Must not eliminate `.` or `..` segments. `None` marks an invalid path.
    fn normalize(&self, path: &str) -> Option<String> {
        Some(normalize_separators(path))
    }

    /// Root part of a normalized path, or an empty string if there is none.
    fn extract_root_path(&self, normalized: &str) -> String {
        if normalized.starts_with('/') {
            "/".to_string()
        } else {
            String::new()
        }
    }

    fn list(&self, path: &str) -> VfsResult<Vec<String>>;

    /// Combined metadata, `None` if the path does not exist.
    fn attributes(&self, path: &str) -> VfsResult<Option<FileAttributes>>;

    /// Whether one `attributes` call answers existence, size and flags.
    ///
    /// Providers answering `false` are queried per property by nodes that
    /// cache snapshots.
    fn has_combined_attributes(&self) -> bool {
        true
    }

    fn exists(&self, path: &str) -> VfsResult<bool> {
        default_exists(self, path)
    }

    fn is_directory(&self, path: &str) -> VfsResult<bool> {
        default_is_directory(self, path)
    }

    fn length(&self, path: &str) -> VfsResult<u64> {
        default_length(self, path)
    }

    fn timestamp(&self, path: &str) -> VfsResult<u64> {
        default_timestamp(self, path)
    }

    fn has_children(&self, path: &str) -> VfsResult<bool> {
        default_has_children(self, path)
    }

    /// Canonical target of a symlink, `None` when `path` is not a symlink.
    fn resolve_symlink(&self, _path: &str) -> VfsResult<Option<String>> {
        Ok(None)
    }

    fn read(&self, path: &str) -> VfsResult<Vec<u8>>;

    fn open(&self, path: &str) -> VfsResult<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.read(path)?)))
    }

    /// Replace the content of a file, optionally forcing its timestamp.
    fn write(&self, _path: &str, _bytes: &[u8], _timestamp: Option<u64>) -> VfsResult<()> {
        Err(VfsError::not_supported("provider.write"))
    }

    fn create_child_file(&self, _parent: &str, _name: &str) -> VfsResult<()> {
        Err(VfsError::not_supported("provider.create_child_file"))
    }

    fn create_child_directory(&self, _parent: &str, _name: &str) -> VfsResult<()> {
        Err(VfsError::not_supported("provider.create_child_directory"))
    }

    fn delete(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::not_supported("provider.delete"))
    }

    fn rename(&self, _path: &str, _new_name: &str) -> VfsResult<()> {
        Err(VfsError::not_supported("provider.rename"))
    }

    fn move_to(&self, _path: &str, _new_parent: &str) -> VfsResult<()> {
        Err(VfsError::not_supported("provider.move"))
    }

    fn copy(&self, _path: &str, _new_parent: &str, _new_name: &str) -> VfsResult<()> {
        Err(VfsError::not_supported("provider.copy"))
    }

    fn set_writable(&self, _path: &str, _writable: bool) -> VfsResult<()> {
        Err(VfsError::not_supported("provider.set_writable"))
    }

    fn set_timestamp(&self, _path: &str, _timestamp: u64) -> VfsResult<()> {
        Err(VfsError::not_supported("provider.set_timestamp"))
    }

    /// Archive-specific root composition, for archive-backed providers.
    fn as_archive(&self) -> Option<&dyn ArchiveProvider> {
        None
    }
}

pub fn default_exists<P: FileSystemProvider + ?Sized>(provider: &P, path: &str) -> VfsResult<bool> {
    Ok(provider.attributes(path)?.is_some())
}

pub fn default_is_directory<P: FileSystemProvider + ?Sized>(
    provider: &P,
    path: &str,
) -> VfsResult<bool> {
    Ok(provider
        .attributes(path)?
        .is_some_and(|attrs| attrs.is_directory()))
}

pub fn default_length<P: FileSystemProvider + ?Sized>(provider: &P, path: &str) -> VfsResult<u64> {
    Ok(provider.attributes(path)?.map_or(0, |attrs| attrs.length))
}

pub fn default_timestamp<P: FileSystemProvider + ?Sized>(
    provider: &P,
    path: &str,
) -> VfsResult<u64> {
    Ok(provider
        .attributes(path)?
        .map_or(0, |attrs| attrs.last_modified))
}

pub fn default_has_children<P: FileSystemProvider + ?Sized>(
    provider: &P,
    path: &str,
) -> VfsResult<bool> {
    Ok(!provider.list(path)?.is_empty())
}

/// `protocol://path` form of a provider path.
pub fn url_of(provider: &dyn FileSystemProvider, path: &str) -> String {
    format!("{}://{}", provider.protocol(), path)
}

/// Split a `protocol://path` url.
pub fn split_url(url: &str) -> Option<(&str, &str)> {
    let (protocol, path) = url.split_once("://")?;
    if protocol.is_empty() {
        return None;
    }
    Some((protocol, path))
}

/// Address equality of two provider handles.
pub fn same_provider(a: &dyn FileSystemProvider, b: &dyn FileSystemProvider) -> bool {
    std::ptr::addr_eq(a as *const dyn FileSystemProvider, b as *const dyn FileSystemProvider)
}
