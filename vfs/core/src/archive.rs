//! Read-only providers whose entries live inside one host file per root.
//!
//! An archive root is addressed as `<host path><separator>`, e.g.
//! `/repo/lib.arc!/`, and an entry as `/repo/lib.arc!/META/info.txt`.
//! Decoding is delegated to an [`ArchiveFormat`]; the decoded index of one
//! host is an [`ArchiveHandler`], memoized in the [`ArchiveHandlerRegistry`].

mod events;
mod registry;

use std::sync::{Arc, Weak};

pub(crate) use events::{ApplyAction, EventOrigin, translate_local_events};
pub use registry::{ArchiveHandlerRegistry, InvalidatedArchive};

use crate::cancel::access_disk_with_check_canceled;
use crate::provider::FileSystemProvider;
use crate::{FileAttributes, VfsError, VfsErrorKind, VfsEvent, VfsResult};

/// Decoded index of one archive. Paths are relative to the archive root,
/// `""` being the root itself.
pub trait ArchiveHandler: Send + Sync {
    fn attributes(&self, relative: &str) -> Option<FileAttributes>;

    fn list(&self, relative: &str) -> Vec<String>;

    fn contents(&self, relative: &str) -> VfsResult<Vec<u8>>;

    /// Drop decoded data; called when the handler is invalidated.
    fn clear_caches(&self);
}

/// Bytes and metadata of a host file handed to an [`ArchiveFormat`].
#[derive(Clone, Debug)]
pub struct ArchiveSource {
    pub local_path: String,
    pub bytes: Vec<u8>,
    pub timestamp: u64,
}

/// A container codec producing handlers.
pub trait ArchiveFormat: Send + Sync + 'static {
    /// Protocol of the archive filesystem built over this format.
    fn protocol(&self) -> &'static str;

    fn open(&self, source: ArchiveSource) -> VfsResult<Arc<dyn ArchiveHandler>>;
}

/// Root composition of archive-backed providers.
///
/// `extract_local_path(compose_root_path(p)) == p` for every host path `p`.
pub trait ArchiveProvider: Send + Sync {
    fn compose_root_path(&self, local_path: &str) -> String;

    fn extract_local_path(&self, root_path: &str) -> String;

    /// Provider hosting the archive files.
    fn local_provider(&self) -> &Arc<dyn FileSystemProvider>;
}

pub struct ArchiveFileSystem {
    this: Weak<ArchiveFileSystem>,
    format: Arc<dyn ArchiveFormat>,
    local: Arc<dyn FileSystemProvider>,
    handlers: Arc<ArchiveHandlerRegistry>,
    separator: String,
}

impl ArchiveFileSystem {
    pub fn new(
        format: Arc<dyn ArchiveFormat>,
        local: Arc<dyn FileSystemProvider>,
        handlers: Arc<ArchiveHandlerRegistry>,
        separator: impl Into<String>,
    ) -> Arc<Self> {
        let separator = separator.into();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            format,
            local,
            handlers,
            separator,
        })
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Split an entry path into host path and root-relative entry path.
    pub fn split_path<'a>(&self, path: &'a str) -> Option<(&'a str, &'a str)> {
        let idx = path.find(&self.separator)?;
        Some((&path[..idx], &path[idx + self.separator.len()..]))
    }

    /// Local-store event implied by an event inside this archive.
    ///
    /// A change to the root stands for the host going away; a change to an
    /// entry means the host's bytes changed.
    pub fn local_event_for(&self, event: &VfsEvent) -> Option<VfsEvent> {
        if event.protocol() != self.format.protocol() {
            return None;
        }
        let (local_path, relative) = self.split_path(event.path())?;
        let protocol = self.local.protocol();
        if relative.is_empty() {
            Some(VfsEvent::delete(protocol, local_path))
        } else {
            Some(VfsEvent::content_change(protocol, local_path))
        }
    }

    /// Handler of the archive containing `path`, with the relative entry path.
    fn handler_for<'a>(&self, path: &'a str) -> VfsResult<(Arc<dyn ArchiveHandler>, &'a str)> {
        let (local_path, relative) = self
            .split_path(path)
            .ok_or(VfsError::new(VfsErrorKind::InvalidInput, "archive.path"))?;
        let this = self
            .this
            .upgrade()
            .ok_or(VfsError::new(VfsErrorKind::Internal, "archive.detached"))?;
        let handler = self
            .handlers
            .get_handler(&this, local_path, |local_path| self.open_handler(local_path))?;
        Ok((handler, relative))
    }

    fn open_handler(&self, local_path: &str) -> VfsResult<Arc<dyn ArchiveHandler>> {
        let host = self.host_attributes(local_path)?.ok_or(VfsError::new(
            VfsErrorKind::NotFound,
            "archive.host_missing",
        ))?;
        if host.is_directory() {
            return Err(VfsError::new(VfsErrorKind::IsDir, "archive.host_is_directory"));
        }
        let bytes = access_disk_with_check_canceled("archive.read_host", || {
            self.local.read(local_path)
        })?;
        self.format.open(ArchiveSource {
            local_path: local_path.to_string(),
            bytes,
            timestamp: host.last_modified,
        })
    }

    fn host_attributes(&self, local_path: &str) -> VfsResult<Option<FileAttributes>> {
        access_disk_with_check_canceled("archive.host_attributes", || {
            self.local.attributes(local_path)
        })
    }
}

/// Missing hosts (or hosts that are directories) read as absent entries.
fn absent_if_missing<T>(result: VfsResult<T>, absent: T) -> VfsResult<T> {
    match result {
        Err(err) if matches!(err.kind(), VfsErrorKind::NotFound | VfsErrorKind::IsDir) => {
            Ok(absent)
        }
        other => other,
    }
}

impl FileSystemProvider for ArchiveFileSystem {
    fn protocol(&self) -> &'static str {
        self.format.protocol()
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn rank(&self) -> i32 {
        self.local.rank() + 1
    }

    fn normalize(&self, path: &str) -> Option<String> {
        let (local_part, entry_part) = match path.find(&self.separator) {
            Some(idx) => (&path[..idx], &path[idx + self.separator.len()..]),
            None => (path, ""),
        };
        let local = self.local.normalize(local_part)?;
        if local == "/" {
            return None;
        }
        let entry: Vec<&str> = entry_part
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty())
            .collect();
        Some(format!("{local}{}{}", self.separator, entry.join("/")))
    }

    fn extract_root_path(&self, normalized: &str) -> String {
        match normalized.find(&self.separator) {
            Some(idx) => normalized[..idx + self.separator.len()].to_string(),
            None => String::new(),
        }
    }

    fn list(&self, path: &str) -> VfsResult<Vec<String>> {
        let handler = absent_if_missing(self.handler_for(path).map(Some), None)?;
        Ok(match handler {
            Some((handler, relative)) => handler.list(relative),
            None => Vec::new(),
        })
    }

    fn attributes(&self, path: &str) -> VfsResult<Option<FileAttributes>> {
        let Some((local_path, relative)) = self.split_path(path) else {
            return Ok(None);
        };
        if relative.is_empty() {
            // The root answers from the host without decoding the archive.
            return Ok(self
                .host_attributes(local_path)?
                .filter(|host| !host.is_directory())
                .map(|host| FileAttributes::directory(host.last_modified).read_only()));
        }
        let handler = absent_if_missing(self.handler_for(path).map(Some), None)?;
        Ok(handler.and_then(|(handler, relative)| {
            handler.attributes(relative).map(FileAttributes::read_only)
        }))
    }

    fn has_combined_attributes(&self) -> bool {
        false
    }

    fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
        let (handler, relative) = self.handler_for(path)?;
        handler.contents(relative)
    }

    fn as_archive(&self) -> Option<&dyn ArchiveProvider> {
        Some(self)
    }
}

impl ArchiveProvider for ArchiveFileSystem {
    fn compose_root_path(&self, local_path: &str) -> String {
        format!("{local_path}{}", self.separator)
    }

    fn extract_local_path(&self, root_path: &str) -> String {
        match self.split_path(root_path) {
            Some((local_path, _)) => local_path.to_string(),
            None => root_path.to_string(),
        }
    }

    fn local_provider(&self) -> &Arc<dyn FileSystemProvider> {
        &self.local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct HostStore {
        protocol: &'static str,
        files: Mutex<HashMap<String, (Vec<u8>, u64)>>,
    }

    impl HostStore {
        fn with(paths: &[&str]) -> Arc<Self> {
            Self::in_store("file", paths)
        }

        fn in_store(protocol: &'static str, paths: &[&str]) -> Arc<Self> {
            let files = paths
                .iter()
                .map(|path| (path.to_string(), (path.as_bytes().to_vec(), 7)))
                .collect();
            Arc::new(Self {
                protocol,
                files: Mutex::new(files),
            })
        }
    }

    impl FileSystemProvider for HostStore {
        fn protocol(&self) -> &'static str {
            self.protocol
        }

        fn list(&self, _path: &str) -> VfsResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn attributes(&self, path: &str) -> VfsResult<Option<FileAttributes>> {
            Ok(self
                .files
                .lock()
                .get(path)
                .map(|(bytes, ts)| FileAttributes::file(bytes.len() as u64, *ts)))
        }

        fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
            self.files
                .lock()
                .get(path)
                .map(|(bytes, _)| bytes.clone())
                .ok_or(VfsError::new(VfsErrorKind::NotFound, "host.read"))
        }
    }

    /// Every archive holds one entry `name` whose content is the host path.
    struct EchoHandler {
        host: String,
        cleared: Arc<AtomicUsize>,
    }

    impl ArchiveHandler for EchoHandler {
        fn attributes(&self, relative: &str) -> Option<FileAttributes> {
            (relative == "name").then(|| FileAttributes::file(self.host.len() as u64, 1))
        }

        fn list(&self, relative: &str) -> Vec<String> {
            if relative.is_empty() {
                vec!["name".to_string()]
            } else {
                Vec::new()
            }
        }

        fn contents(&self, relative: &str) -> VfsResult<Vec<u8>> {
            if relative == "name" {
                Ok(self.host.as_bytes().to_vec())
            } else {
                Err(VfsError::new(VfsErrorKind::NotFound, "echo.contents"))
            }
        }

        fn clear_caches(&self) {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct EchoFormat {
        opened: AtomicUsize,
        cleared: Arc<AtomicUsize>,
    }

    impl ArchiveFormat for EchoFormat {
        fn protocol(&self) -> &'static str {
            "arc"
        }

        fn open(&self, source: ArchiveSource) -> VfsResult<Arc<dyn ArchiveHandler>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoHandler {
                host: source.local_path,
                cleared: self.cleared.clone(),
            }))
        }
    }

    fn archive_fs(hosts: &[&str]) -> (Arc<ArchiveFileSystem>, Arc<EchoFormat>) {
        let format = Arc::new(EchoFormat::default());
        let fs = ArchiveFileSystem::new(
            format.clone(),
            HostStore::with(hosts),
            Arc::new(ArchiveHandlerRegistry::new()),
            "!/",
        );
        (fs, format)
    }

    #[test]
    fn root_composition_round_trips() {
        let (fs, _) = archive_fs(&[]);
        for local in ["/repo/lib.arc", "/a/b/c/y.arc", "/x.arc"] {
            let root = fs.compose_root_path(local);
            assert_eq!(fs.extract_root_path(&root), root);
            assert_eq!(fs.extract_local_path(&root), local);
        }
    }

    #[test]
    fn normalize_appends_root_marker() {
        let (fs, _) = archive_fs(&[]);
        assert_eq!(fs.normalize("/repo//lib.arc").as_deref(), Some("/repo/lib.arc!/"));
        assert_eq!(
            fs.normalize("/repo/lib.arc!//META//info.txt").as_deref(),
            Some("/repo/lib.arc!/META/info.txt")
        );
        assert_eq!(fs.extract_root_path("/repo/lib.arc"), "");
    }

    #[test]
    fn root_attributes_do_not_decode() {
        let (fs, format) = archive_fs(&["/repo/lib.arc"]);
        let root = fs.attributes("/repo/lib.arc!/").unwrap().expect("root exists");
        assert!(root.is_directory());
        assert!(!root.is_writable());
        assert_eq!(root.last_modified, 7);
        assert_eq!(format.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_is_memoized_per_host() {
        let (fs, format) = archive_fs(&["/repo/lib.arc"]);
        assert_eq!(fs.read("/repo/lib.arc!/name").unwrap(), b"/repo/lib.arc");
        assert!(fs.attributes("/repo/lib.arc!/name").unwrap().is_some());
        assert_eq!(fs.list("/repo/lib.arc!/").unwrap(), vec!["name".to_string()]);
        assert_eq!(format.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_host_reads_as_absent_and_leaves_no_entry() {
        let (fs, format) = archive_fs(&[]);
        assert!(fs.attributes("/gone.arc!/name").unwrap().is_none());
        assert!(fs.list("/gone.arc!/").unwrap().is_empty());
        assert_eq!(
            fs.read("/gone.arc!/name").unwrap_err().kind(),
            VfsErrorKind::NotFound
        );
        assert_eq!(format.opened.load(Ordering::SeqCst), 0);
        assert!(fs.handlers.is_empty());
    }

    #[test]
    fn mutations_are_not_supported() {
        let (fs, _) = archive_fs(&["/repo/lib.arc"]);
        let err = fs.delete("/repo/lib.arc!/name").unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::NotSupported);
    }

    #[test]
    fn dominance_invalidation() {
        let (fs, format) = archive_fs(&["/a/b/x.arc", "/a/b/c/y.arc"]);
        fs.read("/a/b/x.arc!/name").unwrap();
        fs.read("/a/b/c/y.arc!/name").unwrap();
        let registry = &fs.handlers;
        assert_eq!(
            registry.dominated_by("file", "/a/b"),
            vec!["/a/b/c/y.arc", "/a/b/x.arc"]
        );

        let dropped = registry.invalidate_dominated("file", "/a/b/c");
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].local_path, "/a/b/c/y.arc");
        assert_eq!(dropped[0].protocol, "file");
        assert_eq!(registry.handler_paths("file"), vec!["/a/b/x.arc".to_string()]);
        assert!(registry.is_consistent());

        fs.read("/a/b/c/y.arc!/name").unwrap();
        let dropped = registry.invalidate_dominated("file", "/a/b");
        assert_eq!(dropped.len(), 2);
        assert!(registry.is_empty());
        assert!(registry.dominated_by("file", "/").is_empty());
        assert_eq!(format.cleared.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn registry_invariant_holds_across_operations() {
        let hosts = ["/a/one.arc", "/a/b/two.arc", "/c/three.arc", "/a/b/d/four.arc"];
        let (fs, _) = archive_fs(&hosts);
        let registry = &fs.handlers;
        let steps: [(&str, bool); 9] = [
            ("/a/one.arc", true),
            ("/a/b/two.arc", true),
            ("/a/one.arc", false),
            ("/c/three.arc", true),
            ("/a/b/d/four.arc", true),
            ("/a/b/two.arc", false),
            ("/missing.arc", false),
            ("/a/one.arc", true),
            ("/c/three.arc", false),
        ];
        for (host, acquire) in steps {
            if acquire {
                fs.read(&format!("{host}!/name")).unwrap();
            } else {
                registry.invalidate("file", host);
            }
            assert!(registry.is_consistent(), "inconsistent after {host}");
        }
        assert_eq!(
            registry.handler_paths("file"),
            vec!["/a/b/d/four.arc".to_string(), "/a/one.arc".to_string()]
        );
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.is_consistent());
    }

    #[test]
    fn equal_host_paths_in_two_stores_keep_separate_handlers() {
        let registry = Arc::new(ArchiveHandlerRegistry::new());
        let format = Arc::new(EchoFormat::default());
        let local = ArchiveFileSystem::new(
            format.clone(),
            HostStore::in_store("file", &["/lib.arc"]),
            registry.clone(),
            "!/",
        );
        let scratch = ArchiveFileSystem::new(
            format.clone(),
            HostStore::in_store("temp", &["/lib.arc"]),
            registry.clone(),
            "!/",
        );

        local.read("/lib.arc!/name").unwrap();
        scratch.read("/lib.arc!/name").unwrap();
        local.read("/lib.arc!/name").unwrap();
        assert_eq!(format.opened.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);

        assert!(registry.invalidate("temp", "/lib.arc").is_some());
        assert!(registry.contains("file", "/lib.arc"));
        assert!(!registry.contains("temp", "/lib.arc"));
        assert!(registry.invalidate_dominated("temp", "/").is_empty());
        assert_eq!(registry.dominated_by("file", "/"), vec!["/lib.arc".to_string()]);
        assert!(registry.is_consistent());
    }

    #[test]
    fn archive_events_map_back_to_the_host() {
        let (fs, _) = archive_fs(&[]);
        assert_eq!(
            fs.local_event_for(&VfsEvent::delete("arc", "/repo/lib.arc!/")),
            Some(VfsEvent::delete("file", "/repo/lib.arc"))
        );
        assert_eq!(
            fs.local_event_for(&VfsEvent::content_change("arc", "/repo/lib.arc!/META")),
            Some(VfsEvent::content_change("file", "/repo/lib.arc"))
        );
        assert_eq!(
            fs.local_event_for(&VfsEvent::content_change("arc", "/repo/lib.arc!/")),
            Some(VfsEvent::delete("file", "/repo/lib.arc"))
        );
        assert_eq!(
            fs.local_event_for(&VfsEvent::delete("arc", "/repo/lib.arc!/META")),
            Some(VfsEvent::content_change("file", "/repo/lib.arc"))
        );
        assert_eq!(fs.local_event_for(&VfsEvent::delete("file", "/repo/lib.arc")), None);
    }
}
