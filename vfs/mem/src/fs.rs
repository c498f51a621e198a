//! The in-memory store.
//!
//! Inodes live in a slab; inode 0 is the root directory. Every entry knows
//! its parent so that paths can be rebuilt and `..` resolved. Timestamps come
//! from a logical clock that ticks once per mutation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use slab::Slab;
use vfs_core::path::{file_name, fold_case, join, parent_path};
use vfs_core::{FileAttributes, NodeFlags, VfsError, VfsErrorKind, VfsResult};

use crate::MemFsConfig;

type Inode = usize;
const ROOT_INODE: Inode = 0;
const MAX_SYMLINK_DEPTH: usize = 40;

#[derive(Clone, Copy, Debug)]
struct Metadata {
    writable: bool,
    special: bool,
    modified: u64,
}

#[derive(Clone, Debug)]
enum NodeKind {
    File(Vec<u8>),
    Directory(Vec<Inode>),
    Symlink(String),
}

#[derive(Debug)]
struct Node {
    parent: Inode,
    name: String,
    metadata: Metadata,
    kind: NodeKind,
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory(_))
    }

    fn data_len(&self) -> u64 {
        match &self.kind {
            NodeKind::File(data) => data.len() as u64,
            _ => 0,
        }
    }
}

/// Provider call counters, for observing how much the cache avoids.
#[derive(Debug, Default)]
pub struct MemFsStats {
    attributes: AtomicU64,
    list: AtomicU64,
    read: AtomicU64,
}

impl MemFsStats {
    pub fn attributes(&self) -> u64 {
        self.attributes.load(Ordering::Relaxed)
    }

    pub fn list(&self) -> u64 {
        self.list.load(Ordering::Relaxed)
    }

    pub fn read(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    pub(crate) fn count_attributes(&self) {
        self.attributes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_list(&self) {
        self.list.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_read(&self) {
        self.read.fetch_add(1, Ordering::Relaxed);
    }
}

pub(crate) struct FileSystemInner {
    case_sensitive: bool,
    max_bytes: Option<u64>,
    max_inodes: Option<u64>,
    deterministic_readdir: bool,
    storage: Slab<Node>,
    clock: u64,
    bytes: u64,
}

impl FileSystemInner {
    fn new(config: &MemFsConfig) -> Self {
        let mut storage = Slab::new();
        let root = storage.insert(Node {
            parent: ROOT_INODE,
            name: String::new(),
            metadata: Metadata {
                writable: true,
                special: false,
                modified: 0,
            },
            kind: NodeKind::Directory(Vec::new()),
        });
        debug_assert_eq!(root, ROOT_INODE);
        Self {
            case_sensitive: config.case_sensitive,
            max_bytes: config.max_bytes,
            max_inodes: config.max_inodes,
            deterministic_readdir: config.deterministic_readdir,
            storage,
            clock: 0,
            bytes: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn child_of(&self, dir: Inode, name: &str) -> Option<Inode> {
        let NodeKind::Directory(children) = &self.storage.get(dir)?.kind else {
            return None;
        };
        let wanted = fold_case(name, self.case_sensitive);
        children.iter().copied().find(|child| {
            self.storage
                .get(*child)
                .is_some_and(|node| fold_case(&node.name, self.case_sensitive) == wanted)
        })
    }

    fn resolve(&self, path: &str, follow_last: bool) -> Option<Inode> {
        self.resolve_from(ROOT_INODE, path, follow_last, 0)
    }

    fn resolve_from(&self, start: Inode, path: &str, follow_last: bool, depth: usize) -> Option<Inode> {
        if depth > MAX_SYMLINK_DEPTH {
            return None;
        }
        let mut current = if path.starts_with('/') { ROOT_INODE } else { start };
        let segments: Vec<&str> = path
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();
        for (idx, segment) in segments.iter().enumerate() {
            current = match *segment {
                ".." => self.storage.get(current)?.parent,
                name => self.child_of(current, name)?,
            };
            if idx + 1 < segments.len() || follow_last {
                current = self.follow(current, depth)?;
            }
        }
        Some(current)
    }

    fn follow(&self, inode: Inode, depth: usize) -> Option<Inode> {
        let node = self.storage.get(inode)?;
        match &node.kind {
            NodeKind::Symlink(target) => self.resolve_from(node.parent, target, true, depth + 1),
            _ => Some(inode),
        }
    }

    fn path_of(&self, mut inode: Inode) -> String {
        let mut names = Vec::new();
        while inode != ROOT_INODE {
            let Some(node) = self.storage.get(inode) else {
                break;
            };
            names.push(node.name.as_str());
            inode = node.parent;
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    fn existing(&self, path: &str, follow_last: bool, context: &'static str) -> VfsResult<Inode> {
        self.resolve(path, follow_last)
            .ok_or(VfsError::new(VfsErrorKind::NotFound, context))
    }

    fn directory(&self, path: &str, context: &'static str) -> VfsResult<Inode> {
        let inode = self.existing(path, true, context)?;
        if !self.storage[inode].is_dir() {
            return Err(VfsError::new(VfsErrorKind::NotDir, context));
        }
        Ok(inode)
    }

    fn attributes(&self, path: &str) -> Option<FileAttributes> {
        let inode = self.resolve(path, false)?;
        let node = &self.storage[inode];
        let mut flags = NodeFlags::empty();
        match &node.kind {
            NodeKind::File(_) => {}
            NodeKind::Directory(_) => flags |= NodeFlags::DIRECTORY,
            NodeKind::Symlink(_) => {
                flags |= NodeFlags::SYMLINK;
                let target_is_dir = self
                    .follow(inode, 0)
                    .and_then(|target| self.storage.get(target))
                    .is_some_and(Node::is_dir);
                if target_is_dir {
                    flags |= NodeFlags::DIRECTORY;
                }
            }
        }
        flags.set(NodeFlags::WRITABLE, node.metadata.writable);
        flags.set(NodeFlags::SPECIAL, node.metadata.special);
        flags.set(NodeFlags::HIDDEN, node.name.starts_with('.'));
        Some(FileAttributes {
            flags,
            length: node.data_len(),
            last_modified: node.metadata.modified,
        })
    }

    fn list(&self, path: &str) -> Vec<String> {
        let Some(inode) = self.resolve(path, true) else {
            return Vec::new();
        };
        let NodeKind::Directory(children) = &self.storage[inode].kind else {
            return Vec::new();
        };
        let mut names: Vec<String> = children
            .iter()
            .filter_map(|child| self.storage.get(*child))
            .map(|node| node.name.clone())
            .collect();
        if self.deterministic_readdir {
            names.sort();
        }
        names
    }

    fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
        let inode = self.existing(path, true, "mem.read")?;
        match &self.storage[inode].kind {
            NodeKind::File(data) => Ok(data.clone()),
            NodeKind::Directory(_) => Err(VfsError::new(VfsErrorKind::IsDir, "mem.read")),
            NodeKind::Symlink(_) => Err(VfsError::new(VfsErrorKind::NotFound, "mem.read.dangling")),
        }
    }

    fn resolve_symlink(&self, path: &str) -> Option<String> {
        let inode = self.resolve(path, false)?;
        let node = &self.storage[inode];
        let NodeKind::Symlink(target) = &node.kind else {
            return None;
        };
        match self.follow(inode, 0) {
            Some(target) => Some(self.path_of(target)),
            // Dangling: answer the target as written, anchored at the parent.
            None if target.starts_with('/') => Some(target.clone()),
            None => Some(join(&self.path_of(node.parent), target)),
        }
    }

    fn reserve_bytes(&self, old_len: u64, new_len: u64) -> VfsResult<()> {
        let Some(max) = self.max_bytes else {
            return Ok(());
        };
        if self.bytes - old_len + new_len > max {
            return Err(VfsError::new(VfsErrorKind::Io, "mem.quota.bytes"));
        }
        Ok(())
    }

    fn insert(&mut self, parent: Inode, name: &str, kind: NodeKind) -> VfsResult<Inode> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "mem.insert.name"));
        }
        if !self.storage[parent].is_dir() {
            return Err(VfsError::new(VfsErrorKind::NotDir, "mem.insert.parent"));
        }
        if self.child_of(parent, name).is_some() {
            return Err(VfsError::new(VfsErrorKind::AlreadyExists, "mem.insert"));
        }
        if self
            .max_inodes
            .is_some_and(|max| self.storage.len() as u64 >= max)
        {
            return Err(VfsError::new(VfsErrorKind::Io, "mem.quota.inodes"));
        }
        let added = match &kind {
            NodeKind::File(data) => data.len() as u64,
            _ => 0,
        };
        self.reserve_bytes(0, added)?;
        let modified = self.tick();
        let inode = self.storage.insert(Node {
            parent,
            name: name.to_string(),
            metadata: Metadata {
                writable: true,
                special: false,
                modified,
            },
            kind,
        });
        self.bytes += added;
        self.attach(parent, inode, modified);
        Ok(inode)
    }

    fn attach(&mut self, parent: Inode, inode: Inode, modified: u64) {
        let parent = &mut self.storage[parent];
        if let NodeKind::Directory(children) = &mut parent.kind {
            children.push(inode);
        }
        parent.metadata.modified = modified;
    }

    fn detach(&mut self, inode: Inode) {
        let parent = self.storage[inode].parent;
        let modified = self.tick();
        let parent = &mut self.storage[parent];
        if let NodeKind::Directory(children) = &mut parent.kind {
            children.retain(|child| *child != inode);
        }
        parent.metadata.modified = modified;
    }

    fn remove(&mut self, inode: Inode) -> VfsResult<()> {
        if inode == ROOT_INODE {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "mem.remove.root"));
        }
        self.detach(inode);
        let mut pending = vec![inode];
        while let Some(current) = pending.pop() {
            let node = self.storage.remove(current);
            match node.kind {
                NodeKind::Directory(children) => pending.extend(children),
                NodeKind::File(data) => self.bytes -= data.len() as u64,
                NodeKind::Symlink(_) => {}
            }
        }
        Ok(())
    }

    fn write(&mut self, inode: Inode, bytes: &[u8], timestamp: Option<u64>) -> VfsResult<()> {
        let old_len = match &self.storage[inode].kind {
            NodeKind::File(data) => data.len() as u64,
            NodeKind::Directory(_) => return Err(VfsError::new(VfsErrorKind::IsDir, "mem.write")),
            NodeKind::Symlink(_) => {
                return Err(VfsError::new(VfsErrorKind::NotFound, "mem.write.dangling"));
            }
        };
        self.reserve_bytes(old_len, bytes.len() as u64)?;
        let modified = match timestamp {
            Some(timestamp) => timestamp,
            None => self.tick(),
        };
        let node = &mut self.storage[inode];
        node.kind = NodeKind::File(bytes.to_vec());
        node.metadata.modified = modified;
        self.bytes = self.bytes - old_len + bytes.len() as u64;
        Ok(())
    }

    fn is_within(&self, mut inode: Inode, ancestor: Inode) -> bool {
        loop {
            if inode == ancestor {
                return true;
            }
            if inode == ROOT_INODE {
                return false;
            }
            inode = self.storage[inode].parent;
        }
    }

    fn move_to(&mut self, inode: Inode, new_parent: Inode, new_name: &str) -> VfsResult<()> {
        if inode == ROOT_INODE || self.is_within(new_parent, inode) {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "mem.move.into_self"));
        }
        if !self.storage[new_parent].is_dir() {
            return Err(VfsError::new(VfsErrorKind::NotDir, "mem.move.parent"));
        }
        if self
            .child_of(new_parent, new_name)
            .is_some_and(|existing| existing != inode)
        {
            return Err(VfsError::new(VfsErrorKind::AlreadyExists, "mem.move"));
        }
        self.detach(inode);
        let modified = self.tick();
        let node = &mut self.storage[inode];
        node.parent = new_parent;
        node.name = new_name.to_string();
        self.attach(new_parent, inode, modified);
        Ok(())
    }

    fn copy(&mut self, inode: Inode, new_parent: Inode, new_name: &str) -> VfsResult<()> {
        if self.is_within(new_parent, inode) {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "mem.copy.into_self"));
        }
        let source = &self.storage[inode];
        let metadata = source.metadata;
        let (kind, children) = match &source.kind {
            NodeKind::Directory(children) => (NodeKind::Directory(Vec::new()), children.clone()),
            other => (other.clone(), Vec::new()),
        };
        let copy = self.insert(new_parent, new_name, kind)?;
        let modified = self.storage[copy].metadata.modified;
        self.storage[copy].metadata = Metadata { modified, ..metadata };
        for child in children {
            let name = self.storage[child].name.clone();
            self.copy(child, copy, &name)?;
        }
        Ok(())
    }
}

/// An in-memory local store. Clones share the same tree.
#[derive(Clone)]
pub struct MemFs {
    pub(crate) config: Arc<MemFsConfig>,
    pub(crate) stats: Arc<MemFsStats>,
    inner: Arc<RwLock<FileSystemInner>>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new(MemFsConfig::default())
    }
}

impl MemFs {
    pub fn new(config: MemFsConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(FileSystemInner::new(&config))),
            config: Arc::new(config),
            stats: Arc::new(MemFsStats::default()),
        }
    }

    pub fn config(&self) -> &MemFsConfig {
        &self.config
    }

    pub fn stats(&self) -> &MemFsStats {
        &self.stats
    }

    /// Current value of the logical clock.
    pub fn now(&self) -> u64 {
        self.inner.read().clock
    }

    /// Create `path` and any missing ancestors as directories.
    pub fn create_dir_all(&self, path: &str) -> VfsResult<()> {
        let mut inner = self.inner.write();
        let mut current = ROOT_INODE;
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            current = match inner.child_of(current, segment) {
                Some(existing) => inner
                    .follow(existing, 0)
                    .filter(|inode| inner.storage[*inode].is_dir())
                    .ok_or(VfsError::new(VfsErrorKind::NotDir, "mem.create_dir_all"))?,
                None => inner.insert(current, segment, NodeKind::Directory(Vec::new()))?,
            };
        }
        Ok(())
    }

    /// Create or replace the file at `path`, creating missing directories.
    pub fn write_file(&self, path: &str, bytes: impl AsRef<[u8]>) -> VfsResult<()> {
        let parent = parent_path(path).ok_or(VfsError::new(
            VfsErrorKind::InvalidInput,
            "mem.write_file.path",
        ))?;
        self.create_dir_all(parent)?;
        let mut inner = self.inner.write();
        let dir = inner.directory(parent, "mem.write_file")?;
        match inner.child_of(dir, file_name(path)) {
            Some(existing) => inner.write(existing, bytes.as_ref(), None),
            None => inner
                .insert(dir, file_name(path), NodeKind::File(bytes.as_ref().to_vec()))
                .map(drop),
        }
    }

    /// Create a symlink at `path` pointing to `target` (absolute, or
    /// relative to the link's directory).
    pub fn symlink(&self, path: &str, target: &str) -> VfsResult<()> {
        let parent = parent_path(path).ok_or(VfsError::new(
            VfsErrorKind::InvalidInput,
            "mem.symlink.path",
        ))?;
        self.create_dir_all(parent)?;
        let mut inner = self.inner.write();
        let dir = inner.directory(parent, "mem.symlink")?;
        inner
            .insert(dir, file_name(path), NodeKind::Symlink(target.to_string()))
            .map(drop)
    }

    pub fn set_special(&self, path: &str, special: bool) -> VfsResult<()> {
        let mut inner = self.inner.write();
        let inode = inner.existing(path, false, "mem.set_special")?;
        inner.storage[inode].metadata.special = special;
        Ok(())
    }

    /// Remove `path` and everything below it, without following a final
    /// symlink.
    pub fn remove(&self, path: &str) -> VfsResult<()> {
        let mut inner = self.inner.write();
        let inode = inner.existing(path, false, "mem.remove")?;
        inner.remove(inode)
    }

    pub fn inode_count(&self) -> usize {
        self.inner.read().storage.len()
    }

    pub fn bytes_used(&self) -> u64 {
        self.inner.read().bytes
    }

    pub(crate) fn stat(&self, path: &str) -> Option<FileAttributes> {
        self.inner.read().attributes(path)
    }

    pub(crate) fn read_dir(&self, path: &str) -> Vec<String> {
        self.inner.read().list(path)
    }

    pub(crate) fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        self.inner.read().read(path)
    }

    pub(crate) fn read_link(&self, path: &str) -> Option<String> {
        self.inner.read().resolve_symlink(path)
    }

    pub(crate) fn overwrite(&self, path: &str, bytes: &[u8], timestamp: Option<u64>) -> VfsResult<()> {
        let mut inner = self.inner.write();
        let inode = inner.existing(path, true, "mem.write")?;
        inner.write(inode, bytes, timestamp)
    }

    pub(crate) fn create_child(&self, parent: &str, name: &str, directory: bool) -> VfsResult<()> {
        let mut inner = self.inner.write();
        let dir = inner.directory(parent, "mem.create_child")?;
        let kind = if directory {
            NodeKind::Directory(Vec::new())
        } else {
            NodeKind::File(Vec::new())
        };
        inner.insert(dir, name, kind).map(drop)
    }

    pub(crate) fn rename_entry(&self, path: &str, new_name: &str) -> VfsResult<()> {
        let mut inner = self.inner.write();
        let inode = inner.existing(path, false, "mem.rename")?;
        let parent = inner.storage[inode].parent;
        inner.move_to(inode, parent, new_name)
    }

    pub(crate) fn move_entry(&self, path: &str, new_parent: &str) -> VfsResult<()> {
        let mut inner = self.inner.write();
        let inode = inner.existing(path, false, "mem.move")?;
        let dir = inner.directory(new_parent, "mem.move.parent")?;
        let name = inner.storage[inode].name.clone();
        inner.move_to(inode, dir, &name)
    }

    pub(crate) fn copy_entry(&self, path: &str, new_parent: &str, new_name: &str) -> VfsResult<()> {
        let mut inner = self.inner.write();
        let inode = inner.existing(path, false, "mem.copy")?;
        let dir = inner.directory(new_parent, "mem.copy.parent")?;
        inner.copy(inode, dir, new_name)
    }

    pub(crate) fn set_writable_flag(&self, path: &str, writable: bool) -> VfsResult<()> {
        let mut inner = self.inner.write();
        let inode = inner.existing(path, false, "mem.set_writable")?;
        inner.storage[inode].metadata.writable = writable;
        Ok(())
    }

    pub(crate) fn touch(&self, path: &str, timestamp: u64) -> VfsResult<()> {
        let mut inner = self.inner.write();
        let inode = inner.existing(path, false, "mem.set_timestamp")?;
        inner.storage[inode].metadata.modified = timestamp;
        Ok(())
    }
}

impl std::fmt::Debug for MemFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemFs")
            .field("protocol", &self.config.protocol)
            .field("inodes", &self.inode_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn write_file_creates_parents() {
        let fs = MemFs::default();
        fs.write_file("/a/b/c.txt", b"hello").unwrap();

        assert_eq!(fs.read_dir("/"), vec!["a".to_string()]);
        assert_eq!(fs.read_dir("/a/b"), vec!["c.txt".to_string()]);
        assert_eq!(fs.read_file("/a/b/c.txt").unwrap(), b"hello".to_vec());
        assert_eq!(fs.bytes_used(), 5);
    }

    #[test]
    fn clock_ticks_on_every_mutation() {
        let fs = MemFs::default();
        fs.write_file("/f", b"1").unwrap();
        let first = fs.stat("/f").unwrap().last_modified;
        fs.write_file("/f", b"2").unwrap();
        let second = fs.stat("/f").unwrap().last_modified;
        assert!(second > first);
        assert_eq!(fs.now(), second);
    }

    #[test]
    fn symlink_attributes_are_lstat_like() {
        let fs = MemFs::default();
        fs.create_dir_all("/x/b").unwrap();
        fs.symlink("/a", "/x/b").unwrap();

        let attrs = fs.stat("/a").unwrap();
        assert!(attrs.is_symlink());
        assert!(attrs.is_directory());
        assert_eq!(fs.read_link("/a"), Some("/x/b".to_string()));
        assert_eq!(fs.read_link("/x"), None);
    }

    #[test]
    fn intermediate_symlinks_are_followed() {
        let fs = MemFs::default();
        fs.write_file("/x/b/file.txt", b"data").unwrap();
        fs.symlink("/a", "x/b").unwrap();

        assert_eq!(fs.read_file("/a/file.txt").unwrap(), b"data".to_vec());
        assert_eq!(fs.read_dir("/a"), vec!["file.txt".to_string()]);
    }

    #[test]
    fn dangling_symlink_reports_its_target() {
        let fs = MemFs::default();
        fs.symlink("/dir/link", "missing").unwrap();

        assert!(!fs.stat("/dir/link").unwrap().is_directory());
        assert_eq!(fs.read_link("/dir/link"), Some("/dir/missing".to_string()));
    }

    #[test]
    fn symlink_cycles_do_not_hang() {
        let fs = MemFs::default();
        fs.symlink("/a", "/b").unwrap();
        fs.symlink("/b", "/a").unwrap();

        assert_eq!(fs.read_link("/a"), Some("/b".to_string()));
        assert!(fs.read_file("/a/x").is_err());
    }

    #[test]
    fn case_insensitive_lookup() {
        let fs = MemFs::new(MemFsConfig {
            case_sensitive: false,
            ..MemFsConfig::default()
        });
        fs.write_file("/Dir/File.TXT", b"x").unwrap();

        assert!(fs.stat("/dir/file.txt").is_some());
        let err = fs.create_child("/DIR", "FILE.txt", false).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::AlreadyExists);
    }

    #[test]
    fn remove_releases_inodes_and_bytes() {
        let fs = MemFs::default();
        fs.write_file("/d/one", b"111").unwrap();
        fs.write_file("/d/sub/two", b"22").unwrap();
        let before = fs.inode_count();

        fs.remove("/d").unwrap();
        assert_eq!(fs.inode_count(), before - 4);
        assert_eq!(fs.bytes_used(), 0);
        assert!(fs.stat("/d/one").is_none());
    }

    #[test]
    fn move_into_own_subtree_is_rejected() {
        let fs = MemFs::default();
        fs.create_dir_all("/a/b").unwrap();
        let err = fs.move_entry("/a", "/a/b").unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::InvalidInput);
    }

    #[test]
    fn copy_is_deep() {
        let fs = MemFs::default();
        fs.write_file("/src/inner/f", b"abc").unwrap();
        fs.create_dir_all("/dst").unwrap();

        fs.copy_entry("/src", "/dst", "copied").unwrap();
        assert_eq!(fs.read_file("/dst/copied/inner/f").unwrap(), b"abc".to_vec());
        fs.write_file("/src/inner/f", b"changed").unwrap();
        assert_eq!(fs.read_file("/dst/copied/inner/f").unwrap(), b"abc".to_vec());
    }

    #[test]
    fn byte_quota_is_enforced() {
        let fs = MemFs::new(MemFsConfig {
            max_bytes: Some(4),
            ..MemFsConfig::default()
        });
        fs.write_file("/small", b"1234").unwrap();
        let err = fs.write_file("/small", b"12345").unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::Io);
        assert_eq!(fs.read_file("/small").unwrap(), b"1234".to_vec());
    }

    #[test]
    fn hidden_flag_follows_dot_prefix() {
        let fs = MemFs::default();
        fs.write_file("/.hidden", b"").unwrap();
        fs.write_file("/shown", b"").unwrap();

        assert!(fs.stat("/.hidden").unwrap().is_hidden());
        assert!(!fs.stat("/shown").unwrap().is_hidden());
        assert!(!fs.stat("/").unwrap().is_hidden());
    }
}
