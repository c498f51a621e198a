use std::sync::Arc;

use super::FileNode;
use super::cached::{CachedNode, stored_child_name, valid_child_name};
use super::transient::TransientNode;
use super::user_data::UserDataMap;
use crate::VfsResult;
use crate::cancel::access_disk_with_check_canceled;

pub(crate) struct AvoidingInner {
    inner: CachedNode,
    user_data: UserDataMap,
}

/// Facade over a cached node whose traversal never grows the cache.
///
/// Children already cached come back wrapped; anything else comes back as
/// a transient node parented to this wrapper.
#[derive(Clone)]
pub struct CacheAvoidingNode(pub(crate) Arc<AvoidingInner>);

impl CacheAvoidingNode {
    pub(crate) fn new(inner: CachedNode) -> Self {
        Self(Arc::new(AvoidingInner {
            inner,
            user_data: UserDataMap::default(),
        }))
    }

    /// The wrapped cached node.
    pub fn cached(&self) -> &CachedNode {
        &self.0.inner
    }

    pub(crate) fn user_data(&self) -> &UserDataMap {
        &self.0.user_data
    }

    pub(crate) fn find_child(&self, name: &str) -> VfsResult<Option<FileNode>> {
        let inner = self.cached();
        if !valid_child_name(name) || !inner.is_valid() || !inner.snapshot().is_directory() {
            return Ok(None);
        }
        let shared = inner.shared()?;
        let child_path = inner.child_path(name);
        let provider = inner.provider();
        if let Some(hit) = shared.table.lookup(provider.as_ref(), &child_path) {
            return Ok(Some(FileNode::CacheAvoiding(CacheAvoidingNode::new(hit))));
        }
        let Some(name) = stored_child_name(provider.as_ref(), inner.path(), name)? else {
            return Ok(None);
        };
        let child_path = inner.child_path(&name);
        let attributes = access_disk_with_check_canceled("avoiding.find_child", || {
            provider.attributes(&child_path)
        })?;
        Ok(attributes.map(|attributes| {
            FileNode::Transient(TransientNode::child(
                FileNode::CacheAvoiding(self.clone()),
                &name,
                attributes,
            ))
        }))
    }

    pub(crate) fn list(&self) -> VfsResult<Vec<String>> {
        let inner = self.cached();
        if !inner.is_valid() || !inner.snapshot().is_directory() {
            return Ok(Vec::new());
        }
        let provider = inner.provider();
        access_disk_with_check_canceled("avoiding.list", || provider.list(inner.path()))
    }
}

impl std::fmt::Debug for CacheAvoidingNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CacheAvoidingNode").field(self.cached()).finish()
    }
}
