//! Identity map of cached nodes.
//!
//! The table owns every [`CachedEntry`]; nodes only hold weak references to
//! their parents. One write lock covers the three indexes so that lookup-or-
//! insert is atomic.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::node::{CachedEntry, CachedNode};
use crate::path::{fold_case, parent_path};
use crate::provider::FileSystemProvider;
use crate::records::PersistentRecords;
use crate::vfs::VfsShared;
use crate::{FileAttributes, NodeId, VfsResult};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct PathKey {
    protocol: &'static str,
    path: String,
}

impl PathKey {
    fn new(provider: &dyn FileSystemProvider, path: &str) -> Self {
        Self {
            protocol: provider.protocol(),
            path: fold_case(path, provider.is_case_sensitive()),
        }
    }

    fn record_key(&self) -> String {
        format!("{}://{}", self.protocol, self.path)
    }
}

#[derive(Default)]
struct TableInner {
    by_id: HashMap<NodeId, CachedNode>,
    by_path: HashMap<PathKey, NodeId>,
    children: HashMap<NodeId, BTreeSet<NodeId>>,
    roots: BTreeMap<PathKey, NodeId>,
}

impl TableInner {
    fn insert(&mut self, key: PathKey, node: CachedNode, parent: Option<NodeId>) {
        let id = node.id();
        match parent {
            Some(parent) => {
                self.children.entry(parent).or_default().insert(id);
            }
            None => {
                self.roots.insert(key.clone(), id);
            }
        }
        self.by_path.insert(key, id);
        self.by_id.insert(id, node);
    }
}

pub(crate) struct NodeTable {
    shared: Weak<VfsShared>,
    records: Arc<PersistentRecords>,
    inner: RwLock<TableInner>,
    structure_modification_count: AtomicU64,
}

impl NodeTable {
    pub(crate) fn new(shared: Weak<VfsShared>, records: Arc<PersistentRecords>) -> Self {
        Self {
            shared,
            records,
            inner: RwLock::new(TableInner::default()),
            structure_modification_count: AtomicU64::new(0),
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<CachedNode> {
        self.inner.read().by_id.get(&id).cloned()
    }

    pub(crate) fn lookup(&self, provider: &dyn FileSystemProvider, path: &str) -> Option<CachedNode> {
        let key = PathKey::new(provider, path);
        let inner = self.inner.read();
        let id = inner.by_path.get(&key)?;
        inner.by_id.get(id).cloned()
    }

    /// Cached parent directory of `path`, also trying the root form with a
    /// trailing separator (archive roots end in one).
    pub(crate) fn lookup_parent(
        &self,
        provider: &dyn FileSystemProvider,
        path: &str,
    ) -> Option<CachedNode> {
        let parent = parent_path(path)?;
        self.lookup(provider, parent)
            .or_else(|| self.lookup(provider, &format!("{parent}/")))
    }

    /// Existing root for `root_path`, or a fresh one built from `attributes`.
    ///
    /// The boolean is true when the root was created and the recorded
    /// timestamp of a previous session differs from the current one.
    pub(crate) fn get_or_insert_root(
        &self,
        provider: &Arc<dyn FileSystemProvider>,
        root_path: &str,
        attributes: FileAttributes,
    ) -> VfsResult<(CachedNode, bool)> {
        let key = PathKey::new(provider.as_ref(), root_path);
        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_path.get(&key).and_then(|id| inner.by_id.get(id)) {
            return Ok((existing.clone(), false));
        }
        let record_key = key.record_key();
        let (id, recorded) = self.records.id_for(&record_key)?;
        let stale = recorded.is_some_and(|timestamp| timestamp != attributes.last_modified);
        self.records
            .record_timestamp(&record_key, attributes.last_modified);

        let node = CachedNode(Arc::new(CachedEntry::new(
            id,
            root_path.to_string(),
            root_path.to_string(),
            provider.clone(),
            None,
            self.shared.clone(),
            attributes,
        )));
        if stale {
            node.mark_dirty();
        }
        inner.insert(key, node.clone(), None);
        self.bump_structure();
        tracing::debug!(id = %id, protocol = provider.protocol(), root = root_path, stale, "created root");
        Ok((node, stale))
    }

    /// Existing child, or a fresh one built from `attributes`.
    ///
    /// `None` when `parent` left the table while the caller was querying the
    /// provider; a child is never registered under a removed parent.
    pub(crate) fn get_or_insert_child(
        &self,
        parent: &CachedNode,
        name: &str,
        attributes: FileAttributes,
    ) -> VfsResult<Option<CachedNode>> {
        let provider = parent.provider();
        let path = parent.child_path(name);
        let key = PathKey::new(provider.as_ref(), &path);
        if let Some(hit) = self.lookup(provider.as_ref(), &path) {
            return Ok(Some(hit));
        }

        let mut inner = self.inner.write();
        if !inner.by_id.contains_key(&parent.id()) || !parent.is_valid() {
            tracing::debug!(path = %path, "parent removed before its child was cached");
            return Ok(None);
        }
        if let Some(existing) = inner.by_path.get(&key).and_then(|id| inner.by_id.get(id)) {
            return Ok(Some(existing.clone()));
        }
        let (id, _) = self.records.id_for(&key.record_key())?;
        let node = CachedNode(Arc::new(CachedEntry::new(
            id,
            name.to_string(),
            path,
            provider.clone(),
            Some(Arc::downgrade(&parent.0)),
            self.shared.clone(),
            attributes,
        )));
        inner.insert(key, node.clone(), Some(parent.id()));
        tracing::trace!(id = %id, path = node.path(), "cached node");
        Ok(Some(node))
    }

    pub(crate) fn children_of(&self, id: NodeId) -> Vec<CachedNode> {
        let inner = self.inner.read();
        inner
            .children
            .get(&id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|child| inner.by_id.get(child).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every cached node strictly below `id`.
    pub(crate) fn descendants(&self, id: NodeId) -> Vec<CachedNode> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Some(children) = inner.children.get(&current) {
                for child in children {
                    if let Some(node) = inner.by_id.get(child) {
                        out.push(node.clone());
                    }
                    pending.push(*child);
                }
            }
        }
        out
    }

    /// Remove `id` and its subtree; returns the removed nodes, now invalid.
    pub(crate) fn remove_subtree(&self, id: NodeId) -> Vec<CachedNode> {
        let mut inner = self.inner.write();
        let Some(top) = inner.by_id.get(&id).cloned() else {
            return Vec::new();
        };
        if let Some(parent) = top.parent() {
            if let Some(siblings) = inner.children.get_mut(&parent.id()) {
                siblings.remove(&id);
            }
        } else {
            inner.roots.retain(|_, root| *root != id);
        }

        let mut removed = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Some(children) = inner.children.remove(&current) {
                pending.extend(children);
            }
            if let Some(node) = inner.by_id.remove(&current) {
                let key = PathKey::new(node.provider().as_ref(), node.path());
                inner.by_path.remove(&key);
                node.invalidate();
                removed.push(node);
            }
        }
        drop(inner);
        self.bump_structure();
        removed
    }

    pub(crate) fn roots(&self) -> Vec<CachedNode> {
        let inner = self.inner.read();
        inner
            .roots
            .values()
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub(crate) fn record_key(provider: &dyn FileSystemProvider, path: &str) -> String {
        PathKey::new(provider, path).record_key()
    }

    pub(crate) fn structure_modification_count(&self) -> u64 {
        self.structure_modification_count.load(Ordering::Acquire)
    }

    pub(crate) fn bump_structure(&self) -> u64 {
        self.structure_modification_count
            .fetch_add(1, Ordering::AcqRel)
            + 1
    }
}
