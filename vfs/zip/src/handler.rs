//! Decoded index of one zip host.

use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Read};

use parking_lot::Mutex;
use vfs_core::{ArchiveHandler, ArchiveSource, FileAttributes, VfsError, VfsErrorKind, VfsResult};
use zip::ZipArchive;

use crate::zip_error;

#[derive(Clone, Copy, Debug)]
struct ZipEntry {
    /// Position in the central directory; `None` for implicit directories.
    index: Option<usize>,
    directory: bool,
    size: u64,
}

/// Entry paths are relative to the archive root, without leading or
/// trailing separators. Directories that only appear as prefixes of other
/// entries are listed too.
pub struct ZipHandler {
    local_path: String,
    timestamp: u64,
    entries: HashMap<String, ZipEntry>,
    children: HashMap<String, BTreeSet<String>>,
    archive: Mutex<ZipArchive<Cursor<Vec<u8>>>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
}

impl ZipHandler {
    pub fn new(source: ArchiveSource) -> VfsResult<Self> {
        let ArchiveSource {
            local_path,
            bytes,
            timestamp,
        } = source;
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(zip_error("zip.open"))?;

        let mut entries = HashMap::new();
        let mut children: HashMap<String, BTreeSet<String>> = HashMap::new();
        entries.insert(String::new(), implicit_directory());

        for index in 0..archive.len() {
            let file = archive.by_index(index).map_err(zip_error("zip.index"))?;
            let Some(path) = entry_path(file.name()) else {
                tracing::debug!(host = %local_path, name = file.name(), "skipping zip entry");
                continue;
            };
            let entry = ZipEntry {
                index: Some(index),
                directory: file.is_dir(),
                size: file.size(),
            };
            drop(file);

            let mut parent = String::new();
            let segments: Vec<&str> = path.split('/').collect();
            for (depth, segment) in segments.iter().enumerate() {
                children
                    .entry(parent.clone())
                    .or_default()
                    .insert((*segment).to_string());
                if !parent.is_empty() {
                    parent.push('/');
                }
                parent.push_str(segment);
                if depth + 1 < segments.len() {
                    entries.entry(parent.clone()).or_insert_with(implicit_directory);
                }
            }
            entries.insert(path, entry);
        }

        tracing::debug!(host = %local_path, entries = entries.len(), "decoded zip archive");
        Ok(Self {
            local_path,
            timestamp,
            entries,
            children,
            archive: Mutex::new(archive),
            contents: Mutex::new(HashMap::new()),
        })
    }

    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    /// Number of entries, the root and implicit directories included.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries whose bytes are currently decoded.
    pub fn cached_contents(&self) -> usize {
        self.contents.lock().len()
    }
}

impl ArchiveHandler for ZipHandler {
    fn attributes(&self, relative: &str) -> Option<FileAttributes> {
        let entry = self.entries.get(relative)?;
        Some(if entry.directory {
            FileAttributes::directory(self.timestamp)
        } else {
            FileAttributes::file(entry.size, self.timestamp)
        })
    }

    fn list(&self, relative: &str) -> Vec<String> {
        self.children
            .get(relative)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn contents(&self, relative: &str) -> VfsResult<Vec<u8>> {
        let entry = self
            .entries
            .get(relative)
            .ok_or(VfsError::new(VfsErrorKind::NotFound, "zip.contents"))?;
        if entry.directory {
            return Err(VfsError::new(VfsErrorKind::IsDir, "zip.contents"));
        }
        if let Some(bytes) = self.contents.lock().get(relative) {
            return Ok(bytes.clone());
        }
        let index = entry
            .index
            .ok_or(VfsError::new(VfsErrorKind::Internal, "zip.contents.index"))?;

        let bytes = {
            let mut archive = self.archive.lock();
            let mut file = archive.by_index(index).map_err(zip_error("zip.contents"))?;
            let mut bytes = Vec::with_capacity(usize::try_from(entry.size).unwrap_or(0));
            file.read_to_end(&mut bytes)?;
            bytes
        };
        self.contents
            .lock()
            .insert(relative.to_string(), bytes.clone());
        Ok(bytes)
    }

    fn clear_caches(&self) {
        let dropped = {
            let mut contents = self.contents.lock();
            let dropped = contents.len();
            contents.clear();
            dropped
        };
        tracing::trace!(host = %self.local_path, dropped, "cleared zip contents");
    }
}

fn implicit_directory() -> ZipEntry {
    ZipEntry {
        index: None,
        directory: true,
        size: 0,
    }
}

/// Root-relative path of a zip entry name; `None` for names that escape the
/// root or name the root itself.
fn entry_path(name: &str) -> Option<String> {
    let segments: Vec<&str> = name
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.is_empty() || segments.contains(&"..") {
        return None;
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_stored_archive;
    use pretty_assertions::assert_eq;

    fn handler(entries: &[(&str, &[u8])]) -> ZipHandler {
        let bytes = write_stored_archive(entries.iter().copied()).unwrap();
        ZipHandler::new(ArchiveSource {
            local_path: "/lib.zip".to_string(),
            bytes,
            timestamp: 42,
        })
        .unwrap()
    }

    #[test]
    fn implicit_directories_are_listed() {
        let zip = handler(&[("META/info.txt", b"hi"), ("src/a/b.rs", b"fn main() {}")]);

        assert_eq!(zip.list(""), vec!["META".to_string(), "src".to_string()]);
        assert_eq!(zip.list("src"), vec!["a".to_string()]);
        assert!(zip.attributes("src/a").unwrap().is_directory());
        assert_eq!(zip.attributes("src/a/b.rs").unwrap().length, 12);
        assert_eq!(zip.attributes("src/a/b.rs").unwrap().last_modified, 42);
        assert!(zip.attributes("missing").is_none());
    }

    #[test]
    fn explicit_directories_survive() {
        let zip = handler(&[("empty/", b""), ("file", b"x")]);

        assert!(zip.attributes("empty").unwrap().is_directory());
        assert!(zip.list("empty").is_empty());
        assert_eq!(zip.list(""), vec!["empty".to_string(), "file".to_string()]);
    }

    #[test]
    fn contents_are_memoized_until_cleared() {
        let zip = handler(&[("a.txt", b"alpha")]);

        assert_eq!(zip.contents("a.txt").unwrap(), b"alpha".to_vec());
        assert_eq!(zip.cached_contents(), 1);
        zip.clear_caches();
        assert_eq!(zip.cached_contents(), 0);
        assert_eq!(zip.contents("a.txt").unwrap(), b"alpha".to_vec());
    }

    #[test]
    fn directory_contents_are_rejected() {
        let zip = handler(&[("dir/file", b"x")]);
        assert_eq!(zip.contents("dir").unwrap_err().kind(), VfsErrorKind::IsDir);
        assert_eq!(zip.contents("nope").unwrap_err().kind(), VfsErrorKind::NotFound);
    }

    #[test]
    fn escaping_names_are_skipped() {
        assert_eq!(entry_path("../evil"), None);
        assert_eq!(entry_path("./a//b/"), Some("a/b".to_string()));
        assert_eq!(entry_path("/"), None);
    }

    #[test]
    fn garbage_is_invalid_input() {
        let err = ZipHandler::new(ArchiveSource {
            local_path: "/bad.zip".to_string(),
            bytes: b"not a zip".to_vec(),
            timestamp: 0,
        })
        .err()
        .unwrap();
        assert_eq!(err.kind(), VfsErrorKind::InvalidInput);
    }
}
