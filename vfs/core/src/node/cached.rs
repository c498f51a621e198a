use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::next_modification_stamp;
use super::user_data::UserDataMap;
use crate::cancel::access_disk_with_check_canceled;
use crate::path::{fold_case, join};
use crate::provider::FileSystemProvider;
use crate::vfs::VfsShared;
use crate::{FileAttributes, NodeId, VfsError, VfsErrorKind, VfsEvent, VfsResult};

/// Registry-owned state of one cached node.
pub(crate) struct CachedEntry {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) provider: Arc<dyn FileSystemProvider>,
    pub(crate) parent: Option<Weak<CachedEntry>>,
    pub(crate) shared: Weak<VfsShared>,
    pub(crate) snapshot: RwLock<FileAttributes>,
    pub(crate) mod_stamp: AtomicU64,
    pub(crate) modification_count: AtomicU64,
    pub(crate) dirty: AtomicBool,
    pub(crate) valid: AtomicBool,
    pub(crate) children_loaded: AtomicBool,
    pub(crate) user_data: UserDataMap,
}

impl CachedEntry {
    pub(crate) fn new(
        id: NodeId,
        name: String,
        path: String,
        provider: Arc<dyn FileSystemProvider>,
        parent: Option<Weak<CachedEntry>>,
        shared: Weak<VfsShared>,
        attributes: FileAttributes,
    ) -> Self {
        Self {
            id,
            name,
            path,
            provider,
            parent,
            shared,
            snapshot: RwLock::new(attributes),
            mod_stamp: AtomicU64::new(next_modification_stamp()),
            modification_count: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
            valid: AtomicBool::new(true),
            children_loaded: AtomicBool::new(false),
            user_data: UserDataMap::default(),
        }
    }
}

/// Identity-stable node, the unique live representative of its path.
#[derive(Clone)]
pub struct CachedNode(pub(crate) Arc<CachedEntry>);

impl CachedNode {
    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn path(&self) -> &str {
        &self.0.path
    }

    pub fn provider(&self) -> &Arc<dyn FileSystemProvider> {
        &self.0.provider
    }

    /// False once the node was removed from the cache.
    pub fn is_valid(&self) -> bool {
        self.0.valid.load(Ordering::Acquire)
    }

    pub fn is_dirty(&self) -> bool {
        self.0.dirty.load(Ordering::Acquire)
    }

    pub fn children_loaded(&self) -> bool {
        self.0.children_loaded.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> FileAttributes {
        *self.0.snapshot.read()
    }

    pub fn mod_stamp(&self) -> u64 {
        self.0.mod_stamp.load(Ordering::Acquire)
    }

    /// Content changes observed on this node since it was cached.
    pub fn modification_count(&self) -> u64 {
        self.0.modification_count.load(Ordering::Acquire)
    }

    pub fn parent(&self) -> Option<CachedNode> {
        self.0.parent.as_ref()?.upgrade().map(CachedNode)
    }

    pub fn mark_dirty(&self) {
        self.0.dirty.store(true, Ordering::Release);
    }

    /// Mark this node and every cached descendant dirty.
    pub fn mark_dirty_recursively(&self) {
        self.mark_dirty();
        if let Ok(shared) = self.shared() {
            for node in shared.table.descendants(self.id()) {
                node.mark_dirty();
            }
        }
    }

    pub(crate) fn invalidate(&self) {
        self.0.valid.store(false, Ordering::Release);
    }

    pub(crate) fn shared(&self) -> VfsResult<Arc<VfsShared>> {
        self.0
            .shared
            .upgrade()
            .ok_or(VfsError::new(VfsErrorKind::Internal, "node.detached"))
    }

    pub(crate) fn set_snapshot(&self, attributes: FileAttributes) {
        *self.0.snapshot.write() = attributes;
    }

    pub(crate) fn content_changed(&self, attributes: FileAttributes) {
        self.set_snapshot(attributes);
        self.0
            .mod_stamp
            .store(next_modification_stamp(), Ordering::Release);
        self.0.modification_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn set_mod_stamp(&self, stamp: u64) {
        self.0.mod_stamp.store(stamp, Ordering::Release);
    }

    pub(crate) fn user_data(&self) -> &UserDataMap {
        &self.0.user_data
    }

    pub(crate) fn child_path(&self, name: &str) -> String {
        join(&self.0.path, name)
    }

    /// Cached child, minting it when the provider knows the name.
    ///
    /// Directories whose children were loaded answer from the cache alone;
    /// a refresh brings in names created since.
    pub(crate) fn find_child(&self, name: &str) -> VfsResult<Option<CachedNode>> {
        if !valid_child_name(name) || !self.is_valid() || !self.snapshot().is_directory() {
            return Ok(None);
        }
        let shared = self.shared()?;
        let child_path = self.child_path(name);
        if let Some(hit) = shared.table.lookup(self.provider().as_ref(), &child_path) {
            return Ok(Some(hit));
        }
        if self.children_loaded() {
            return Ok(None);
        }
        let provider = self.provider();
        let Some(name) = stored_child_name(provider.as_ref(), self.path(), name)? else {
            return Ok(None);
        };
        let child_path = self.child_path(&name);
        let attributes = access_disk_with_check_canceled("node.find_child", || {
            provider.attributes(&child_path)
        })?;
        match attributes {
            Some(attributes) => shared.table.get_or_insert_child(self, &name, attributes),
            None => Ok(None),
        }
    }

    /// Names of the children, minting every child into the cache.
    pub(crate) fn load_children(&self) -> VfsResult<Vec<String>> {
        if !self.is_valid() || !self.snapshot().is_directory() {
            return Ok(Vec::new());
        }
        let shared = self.shared()?;
        if self.children_loaded() {
            let mut names: Vec<String> = shared
                .table
                .children_of(self.id())
                .iter()
                .map(|child| child.name().to_string())
                .collect();
            names.sort();
            return Ok(names);
        }

        let provider = self.provider();
        let names = access_disk_with_check_canceled("node.list", || provider.list(self.path()))?;
        let mut loaded = Vec::with_capacity(names.len());
        for name in names {
            let child_path = self.child_path(&name);
            if let Some(hit) = shared.table.lookup(provider.as_ref(), &child_path) {
                loaded.push(hit.name().to_string());
                continue;
            }
            let attributes = access_disk_with_check_canceled("node.child_attributes", || {
                provider.attributes(&child_path)
            })?;
            let Some(attributes) = attributes else {
                continue;
            };
            if shared.table.get_or_insert_child(self, &name, attributes)?.is_none() {
                return Ok(Vec::new());
            }
            loaded.push(name);
        }
        self.0.children_loaded.store(true, Ordering::Release);
        loaded.sort();
        Ok(loaded)
    }

    /// Compare the cached state with the provider and report differences.
    ///
    /// Children are visited when `recursive` is set or when they are dirty.
    pub(crate) fn refresh_internal(
        &self,
        recursive: bool,
        events: &mut Vec<VfsEvent>,
    ) -> VfsResult<()> {
        if !self.is_valid() {
            return Ok(());
        }
        let provider = self.provider();
        let protocol = provider.protocol();
        let current = access_disk_with_check_canceled("refresh.attributes", || {
            provider.attributes(self.path())
        })?;
        let Some(current) = current else {
            events.push(VfsEvent::delete(protocol, self.path()));
            self.0.dirty.store(false, Ordering::Release);
            return Ok(());
        };

        let previous = self.snapshot();
        if current.content_differs(&previous) {
            events.push(VfsEvent::content_change(protocol, self.path()));
        } else if current.flags != previous.flags {
            events.push(VfsEvent::property_change(protocol, self.path()));
        }

        let shared = self.shared()?;
        let cached_children = shared.table.children_of(self.id());
        let mut vanished = HashSet::new();
        if current.is_directory() && self.children_loaded() {
            let case_sensitive = provider.is_case_sensitive();
            let names =
                access_disk_with_check_canceled("refresh.list", || provider.list(self.path()))?;
            let listed: HashSet<String> = names
                .iter()
                .map(|name| fold_case(name, case_sensitive))
                .collect();
            let known: HashSet<String> = cached_children
                .iter()
                .map(|child| fold_case(child.name(), case_sensitive))
                .collect();

            for name in &names {
                if known.contains(&fold_case(name, case_sensitive)) {
                    continue;
                }
                let child_path = self.child_path(name);
                let attributes = access_disk_with_check_canceled("refresh.child_attributes", || {
                    provider.attributes(&child_path)
                })?;
                if let Some(attributes) = attributes {
                    events.push(VfsEvent::create(
                        protocol,
                        child_path,
                        attributes.is_directory(),
                    ));
                }
            }
            for child in &cached_children {
                if !listed.contains(&fold_case(child.name(), case_sensitive)) {
                    events.push(VfsEvent::delete(protocol, child.path()));
                    vanished.insert(child.id());
                }
            }
        }

        self.0.dirty.store(false, Ordering::Release);

        for child in cached_children {
            if vanished.contains(&child.id()) {
                continue;
            }
            if recursive || child.is_dirty() {
                child.refresh_internal(recursive, events)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CachedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedNode")
            .field("id", &self.id())
            .field("protocol", &self.provider().protocol())
            .field("path", &self.path())
            .finish()
    }
}

/// `name` as the provider spells it inside `parent`.
///
/// Case-insensitive providers are asked for the directory listing so a node
/// never takes the caller's spelling; `None` when no entry matches.
pub(crate) fn stored_child_name(
    provider: &dyn FileSystemProvider,
    parent: &str,
    name: &str,
) -> VfsResult<Option<String>> {
    if provider.is_case_sensitive() {
        return Ok(Some(name.to_string()));
    }
    let wanted = fold_case(name, false);
    let names = access_disk_with_check_canceled("node.stored_name", || provider.list(parent))?;
    Ok(names
        .into_iter()
        .find(|candidate| fold_case(candidate, false) == wanted))
}

pub(crate) fn valid_child_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}
