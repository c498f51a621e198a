//! File node handles.
//!
//! One capability set, three identity contracts:
//! - [`CachedNode`]: registry-owned, equality by id, unique per path;
//! - [`TransientNode`]: minted per access, equality is structural;
//! - [`CacheAvoidingNode`]: a cached node whose traversal never mints new
//!   cached entries.
//!
//! The divergent equality rules live in the `PartialEq` impl below.

mod avoiding;
mod cached;
mod transient;
mod user_data;

use std::any::Any;
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use avoiding::CacheAvoidingNode;
pub use cached::CachedNode;
pub(crate) use cached::CachedEntry;
use cached::{stored_child_name, valid_child_name};
pub use transient::TransientNode;
pub use user_data::{UserDataKey, unstable_user_data_accesses};
use user_data::{UserDataMap, note_unstable_access};

use crate::cancel::access_disk_with_check_canceled;
use crate::path::{fold_case, join};
use crate::provider::{FileSystemProvider, same_provider, url_of};
use crate::{FileAttributes, NodeId, VfsError, VfsErrorKind, VfsEvent, VfsResult};

static NEXT_MODIFICATION_STAMP: AtomicU64 = AtomicU64::new(1);

/// Monotonic in-process modification stamp.
pub fn next_modification_stamp() -> u64 {
    NEXT_MODIFICATION_STAMP.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone, Debug)]
pub enum FileNode {
    Cached(CachedNode),
    Transient(TransientNode),
    CacheAvoiding(CacheAvoidingNode),
}

impl FileNode {
    /// Id of the cached entry behind this node, if any.
    pub fn id(&self) -> Option<NodeId> {
        match self {
            Self::Cached(node) => Some(node.id()),
            Self::CacheAvoiding(node) => Some(node.cached().id()),
            Self::Transient(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Cached(node) => node.name(),
            Self::Transient(node) => node.name(),
            Self::CacheAvoiding(node) => node.cached().name(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Cached(node) => node.path(),
            Self::Transient(node) => node.path(),
            Self::CacheAvoiding(node) => node.cached().path(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn FileSystemProvider> {
        match self {
            Self::Cached(node) => node.provider(),
            Self::Transient(node) => node.provider(),
            Self::CacheAvoiding(node) => node.cached().provider(),
        }
    }

    pub fn url(&self) -> String {
        url_of(self.provider().as_ref(), self.path())
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_cache_avoiding(&self) -> bool {
        matches!(self, Self::CacheAvoiding(_))
    }

    /// The cached entry behind a cached node or a cache-avoiding wrapper.
    pub fn as_cached(&self) -> Option<&CachedNode> {
        match self {
            Self::Cached(node) => Some(node),
            Self::CacheAvoiding(node) => Some(node.cached()),
            Self::Transient(_) => None,
        }
    }

    pub fn parent(&self) -> Option<FileNode> {
        match self {
            Self::Cached(node) => node.parent().map(FileNode::Cached),
            Self::Transient(node) => node.parent().cloned(),
            Self::CacheAvoiding(node) => node
                .cached()
                .parent()
                .map(|parent| FileNode::CacheAvoiding(CacheAvoidingNode::new(parent))),
        }
    }

    /// Wrap this node so traversal below it does not grow the cache.
    ///
    /// # Panics
    ///
    /// Panics when the node already is a cache-avoiding wrapper.
    pub fn cache_avoiding(&self) -> FileNode {
        match self {
            Self::Cached(node) => Self::CacheAvoiding(CacheAvoidingNode::new(node.clone())),
            Self::Transient(_) => self.clone(),
            Self::CacheAvoiding(_) => {
                panic!("{} is already cache-avoiding and cannot be wrapped again", self.url())
            }
        }
    }

    /// Combined metadata; `None` when the node does not exist (any more).
    pub fn attributes(&self) -> VfsResult<Option<FileAttributes>> {
        match self.as_cached() {
            Some(node) => Ok(node.is_valid().then(|| node.snapshot())),
            None => match self {
                Self::Transient(node) => node.attributes(),
                _ => Ok(None),
            },
        }
    }

    pub fn exists(&self) -> bool {
        match self {
            Self::Transient(node) => absent_on_error(node.exists(), "exists"),
            _ => self.as_cached().is_some_and(|node| node.is_valid()),
        }
    }

    pub fn is_directory(&self) -> bool {
        match self {
            Self::Transient(node) => absent_on_error(node.is_directory(), "is_directory"),
            _ => self.has_flag(FileAttributes::is_directory),
        }
    }

    pub fn is_symlink(&self) -> bool {
        self.has_flag(FileAttributes::is_symlink)
    }

    pub fn is_hidden(&self) -> bool {
        self.has_flag(FileAttributes::is_hidden)
    }

    pub fn is_special(&self) -> bool {
        self.has_flag(FileAttributes::is_special)
    }

    pub fn is_writable(&self) -> bool {
        self.has_flag(FileAttributes::is_writable)
    }

    pub fn length(&self) -> u64 {
        match self {
            Self::Transient(node) => absent_on_error(node.length(), "length"),
            _ => self.cached_attributes().map_or(0, |a| a.length),
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Transient(node) => absent_on_error(node.timestamp(), "timestamp"),
            _ => self.cached_attributes().map_or(0, |a| a.last_modified),
        }
    }

    pub fn mod_stamp(&self) -> u64 {
        match self {
            Self::Transient(node) => node.mod_stamp(),
            _ => self.as_cached().map_or(0, |node| node.mod_stamp()),
        }
    }

    fn cached_attributes(&self) -> Option<FileAttributes> {
        self.as_cached()
            .filter(|node| node.is_valid())
            .map(|node| node.snapshot())
    }

    fn has_flag(&self, test: fn(&FileAttributes) -> bool) -> bool {
        match self.attributes() {
            Ok(attributes) => attributes.is_some_and(|a| test(&a)),
            Err(err) => {
                tracing::debug!(url = %self.url(), error = %err, "attribute query failed");
                false
            }
        }
    }

    /// Lazy, restartable listing.
    ///
    /// Cached directories mint every child into the cache and remember that
    /// their children are loaded; the other variants mint nothing.
    pub fn children(&self) -> VfsResult<Children> {
        let names = match self {
            Self::Cached(node) => node.load_children()?,
            Self::Transient(node) => node.list()?,
            Self::CacheAvoiding(node) => node.list()?,
        };
        Ok(Children {
            parent: self.clone(),
            names,
        })
    }

    pub fn has_children(&self) -> VfsResult<bool> {
        if !self.is_directory() {
            return Ok(false);
        }
        if let Self::Cached(node) = self
            && node.children_loaded()
        {
            return Ok(!node.load_children()?.is_empty());
        }
        let provider = self.provider();
        access_disk_with_check_canceled("node.has_children", || {
            provider.has_children(self.path())
        })
    }

    pub fn find_child(&self, name: &str) -> VfsResult<Option<FileNode>> {
        match self {
            Self::Cached(node) => Ok(node.find_child(name)?.map(FileNode::Cached)),
            Self::CacheAvoiding(node) => node.find_child(name),
            Self::Transient(node) => {
                if !valid_child_name(name) || !node.is_directory()? {
                    return Ok(None);
                }
                let provider = node.provider();
                let Some(name) = stored_child_name(provider.as_ref(), node.path(), name)? else {
                    return Ok(None);
                };
                let child_path = join(node.path(), &name);
                let attributes = access_disk_with_check_canceled("transient.find_child", || {
                    provider.attributes(&child_path)
                })?;
                Ok(attributes.map(|attributes| {
                    FileNode::Transient(TransientNode::child(self.clone(), &name, attributes))
                }))
            }
        }
    }

    pub fn read_bytes(&self) -> VfsResult<Vec<u8>> {
        if self.is_directory() {
            return Err(VfsError::new(VfsErrorKind::IsDir, "node.read"));
        }
        let provider = self.provider();
        access_disk_with_check_canceled("node.read", || provider.read(self.path()))
    }

    pub fn open(&self) -> VfsResult<Box<dyn Read + Send>> {
        if self.is_directory() {
            return Err(VfsError::new(VfsErrorKind::IsDir, "node.open"));
        }
        let provider = self.provider();
        access_disk_with_check_canceled("node.open", || provider.open(self.path()))
    }

    /// Byte sink replacing the content once finished or dropped.
    ///
    /// `mod_stamp` overrides the modification stamp assigned on commit and
    /// `time_stamp` the timestamp recorded by the provider.
    pub fn open_for_write(
        &self,
        requestor: &str,
        mod_stamp: Option<u64>,
        time_stamp: Option<u64>,
    ) -> VfsResult<NodeWriter> {
        self.ensure_mutable("node.open_for_write")?;
        if self.is_directory() {
            return Err(VfsError::new(VfsErrorKind::IsDir, "node.open_for_write"));
        }
        Ok(NodeWriter {
            node: self.clone(),
            requestor: requestor.to_string(),
            mod_stamp,
            time_stamp,
            buffer: Vec::new(),
            finished: false,
        })
    }

    /// Resynchronize with the provider.
    ///
    /// Cached nodes go through a refresh session, which runs on the refresh
    /// executor when `asynchronous` is set. Transient nodes only drop their
    /// memo.
    pub fn refresh(&self, asynchronous: bool, recursive: bool) -> VfsResult<()> {
        match self {
            Self::Transient(node) => {
                node.reset();
                Ok(())
            }
            _ => {
                let Some(node) = self.as_cached() else {
                    return Ok(());
                };
                let shared = node.shared()?;
                let mut session = shared.refresh.create_session(asynchronous, recursive, None);
                session.add_file(FileNode::Cached(node.clone()));
                session.launch();
                Ok(())
            }
        }
    }

    pub(crate) fn refresh_internal(
        &self,
        recursive: bool,
        events: &mut Vec<VfsEvent>,
    ) -> VfsResult<()> {
        match self {
            Self::Transient(node) => {
                node.reset();
                Ok(())
            }
            _ => match self.as_cached() {
                Some(node) => node.refresh_internal(recursive, events),
                None => Ok(()),
            },
        }
    }

    pub fn create_child_file(&self, name: &str) -> VfsResult<FileNode> {
        self.create_child(name, false)
    }

    pub fn create_child_directory(&self, name: &str) -> VfsResult<FileNode> {
        self.create_child(name, true)
    }

    fn create_child(&self, name: &str, directory: bool) -> VfsResult<FileNode> {
        let context = if directory {
            "node.create_child_directory"
        } else {
            "node.create_child_file"
        };
        self.ensure_mutable(context)?;
        if !valid_child_name(name) {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, context));
        }
        if directory {
            self.provider().create_child_directory(self.path(), name)?;
        } else {
            self.provider().create_child_file(self.path(), name)?;
        }
        self.notify(vec![VfsEvent::create(
            self.provider().protocol(),
            join(self.path(), name),
            directory,
        )])?;
        self.find_child(name)?
            .ok_or(VfsError::new(VfsErrorKind::NotFound, context))
    }

    pub fn delete(&self) -> VfsResult<()> {
        self.ensure_mutable("node.delete")?;
        self.provider().delete(self.path())?;
        self.notify(vec![VfsEvent::delete(self.provider().protocol(), self.path())])
    }

    pub fn rename(&self, new_name: &str) -> VfsResult<()> {
        self.ensure_mutable("node.rename")?;
        if !valid_child_name(new_name) {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "node.rename"));
        }
        self.provider().rename(self.path(), new_name)?;
        self.notify(vec![VfsEvent::rename(
            self.provider().protocol(),
            self.path(),
            new_name,
        )])
    }

    pub fn move_to(&self, new_parent: &FileNode) -> VfsResult<()> {
        self.ensure_mutable("node.move")?;
        if !same_provider(self.provider().as_ref(), new_parent.provider().as_ref()) {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "node.move.cross_provider"));
        }
        self.provider().move_to(self.path(), new_parent.path())?;
        self.notify(vec![VfsEvent::move_to(
            self.provider().protocol(),
            self.path(),
            new_parent.path(),
        )])
    }

    pub fn copy_to(&self, new_parent: &FileNode, new_name: &str) -> VfsResult<FileNode> {
        new_parent.ensure_mutable("node.copy")?;
        if !valid_child_name(new_name) {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "node.copy"));
        }
        if !same_provider(self.provider().as_ref(), new_parent.provider().as_ref()) {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "node.copy.cross_provider"));
        }
        self.provider()
            .copy(self.path(), new_parent.path(), new_name)?;
        new_parent.notify(vec![VfsEvent::create(
            self.provider().protocol(),
            join(new_parent.path(), new_name),
            self.is_directory(),
        )])?;
        new_parent
            .find_child(new_name)?
            .ok_or(VfsError::new(VfsErrorKind::NotFound, "node.copy"))
    }

    pub fn set_writable(&self, writable: bool) -> VfsResult<()> {
        self.ensure_mutable("node.set_writable")?;
        self.provider().set_writable(self.path(), writable)?;
        self.notify(vec![VfsEvent::property_change(
            self.provider().protocol(),
            self.path(),
        )])
    }

    pub fn set_timestamp(&self, timestamp: u64) -> VfsResult<()> {
        self.ensure_mutable("node.set_timestamp")?;
        self.provider().set_timestamp(self.path(), timestamp)?;
        self.notify(vec![VfsEvent::property_change(
            self.provider().protocol(),
            self.path(),
        )])
    }

    fn ensure_mutable(&self, context: &'static str) -> VfsResult<()> {
        if self.provider().is_read_only() {
            return Err(VfsError::not_supported(context));
        }
        Ok(())
    }

    /// Feed events caused by a mutation through the managing registry.
    fn notify(&self, events: Vec<VfsEvent>) -> VfsResult<()> {
        match self {
            Self::Transient(node) => {
                node.reset();
                Ok(())
            }
            _ => {
                if let Some(node) = self.as_cached() {
                    node.shared()?.process_events(events);
                }
                Ok(())
            }
        }
    }

    pub fn user_data<T: Any + Send + Sync>(&self, key: &UserDataKey<T>) -> Option<Arc<T>> {
        self.user_data_map(key.name()).get(key)
    }

    pub fn put_user_data<T: Any + Send + Sync>(&self, key: &UserDataKey<T>, value: Option<Arc<T>>) {
        self.user_data_map(key.name()).put(key, value)
    }

    /// Compare-and-set: store `new` only if the current value is `expected`.
    pub fn replace_user_data<T: Any + Send + Sync>(
        &self,
        key: &UserDataKey<T>,
        expected: Option<&Arc<T>>,
        new: Option<Arc<T>>,
    ) -> bool {
        self.user_data_map(key.name()).replace(key, expected, new)
    }

    fn user_data_map(&self, key: &'static str) -> &UserDataMap {
        match self {
            Self::Cached(node) => node.user_data(),
            Self::Transient(node) => {
                note_unstable_access("transient", node.path(), key);
                node.user_data()
            }
            Self::CacheAvoiding(node) => {
                note_unstable_access("cache-avoiding", node.cached().path(), key);
                node.user_data()
            }
        }
    }
}

fn absent_on_error<T: Default>(result: VfsResult<T>, query: &'static str) -> T {
    result.unwrap_or_else(|err| {
        tracing::debug!(query, error = %err, "provider query failed, treating as absent");
        T::default()
    })
}

impl PartialEq for FileNode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Transient(a), Self::Transient(b)) => a.structurally_equal(b),
            (Self::Transient(_), _) | (_, Self::Transient(_)) => false,
            _ => self.id() == other.id(),
        }
    }
}

impl Eq for FileNode {}

impl Hash for FileNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Transient(node) => {
                node.provider().protocol().hash(state);
                fold_case(node.name(), node.provider().is_case_sensitive()).hash(state);
            }
            _ => self.id().hash(state),
        }
    }
}

/// Children of one node, resolved lazily on each iteration.
pub struct Children {
    parent: FileNode,
    names: Vec<String>,
}

impl Children {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolve the children; names that vanished since listing are skipped.
    pub fn iter(&self) -> impl Iterator<Item = FileNode> + '_ {
        self.names
            .iter()
            .filter_map(move |name| match self.parent.find_child(name) {
                Ok(child) => child,
                Err(err) => {
                    tracing::debug!(parent = %self.parent.url(), name, error = %err, "child lookup failed");
                    None
                }
            })
    }
}

pub struct NodeWriter {
    node: FileNode,
    requestor: String,
    mod_stamp: Option<u64>,
    time_stamp: Option<u64>,
    buffer: Vec<u8>,
    finished: bool,
}

impl NodeWriter {
    /// Hand the bytes to the provider and publish the content change.
    pub fn finish(mut self) -> VfsResult<()> {
        self.commit()
    }

    fn commit(&mut self) -> VfsResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let node = &self.node;
        tracing::trace!(url = %node.url(), requestor = %self.requestor, len = self.buffer.len(), "writing content");
        node.provider()
            .write(node.path(), &self.buffer, self.time_stamp)?;
        node.notify(vec![VfsEvent::content_change(
            node.provider().protocol(),
            node.path(),
        )])?;
        if let (Some(stamp), Some(cached)) = (self.mod_stamp, node.as_cached()) {
            cached.set_mod_stamp(stamp);
        }
        Ok(())
    }
}

impl Write for NodeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for NodeWriter {
    fn drop(&mut self) {
        if let Err(err) = self.commit() {
            tracing::warn!(url = %self.node.url(), error = %err, "dropped writer failed to commit");
        }
    }
}
