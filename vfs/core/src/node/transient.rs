use std::sync::Arc;

use parking_lot::Mutex;

use super::user_data::UserDataMap;
use super::{FileNode, next_modification_stamp};
use crate::cancel::access_disk_with_check_canceled;
use crate::path::{fold_case, join};
use crate::provider::FileSystemProvider;
use crate::{FileAttributes, VfsResult};

/// Fetched-or-known-absent memo of a provider answer.
#[derive(Clone, Copy, Debug)]
enum Snapshot {
    Unknown,
    Absent,
    Known(FileAttributes),
}

pub(crate) struct TransientInner {
    name: String,
    path: String,
    provider: Arc<dyn FileSystemProvider>,
    parent: Option<FileNode>,
    snapshot: Mutex<Snapshot>,
    mod_stamp: u64,
    user_data: UserDataMap,
}

/// Node built afresh on every access; equality is structural.
#[derive(Clone)]
pub struct TransientNode(pub(crate) Arc<TransientInner>);

impl TransientNode {
    pub(crate) fn root(provider: Arc<dyn FileSystemProvider>, root_path: &str) -> Self {
        Self::build(root_path.to_string(), root_path.to_string(), provider, None, None)
    }

    pub(crate) fn child(parent: FileNode, name: &str, attributes: FileAttributes) -> Self {
        let path = join(parent.path(), name);
        let provider = parent.provider().clone();
        let known = provider.has_combined_attributes().then_some(attributes);
        Self::build(name.to_string(), path, provider, Some(parent), known)
    }

    fn build(
        name: String,
        path: String,
        provider: Arc<dyn FileSystemProvider>,
        parent: Option<FileNode>,
        known: Option<FileAttributes>,
    ) -> Self {
        let snapshot = match known {
            Some(attributes) => Snapshot::Known(attributes),
            None => Snapshot::Unknown,
        };
        Self(Arc::new(TransientInner {
            name,
            path,
            provider,
            parent,
            snapshot: Mutex::new(snapshot),
            mod_stamp: next_modification_stamp(),
            user_data: UserDataMap::default(),
        }))
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

    pub fn parent(&self) -> Option<&FileNode> {
        self.0.parent.as_ref()
    }

    pub(crate) fn mod_stamp(&self) -> u64 {
        self.0.mod_stamp
    }

    pub(crate) fn user_data(&self) -> &UserDataMap {
        &self.0.user_data
    }

    /// One provider call per node; later queries reuse the memo.
    pub(crate) fn attributes(&self) -> VfsResult<Option<FileAttributes>> {
        let mut snapshot = self.0.snapshot.lock();
        match *snapshot {
            Snapshot::Known(attributes) => return Ok(Some(attributes)),
            Snapshot::Absent => return Ok(None),
            Snapshot::Unknown => {}
        }
        let provider = &self.0.provider;
        let fetched = access_disk_with_check_canceled("transient.attributes", || {
            provider.attributes(&self.0.path)
        })?;
        *snapshot = match fetched {
            Some(attributes) => Snapshot::Known(attributes),
            None => Snapshot::Absent,
        };
        Ok(fetched)
    }

    fn combined(&self) -> bool {
        self.0.provider.has_combined_attributes()
    }

    pub(crate) fn exists(&self) -> VfsResult<bool> {
        if self.combined() {
            return Ok(self.attributes()?.is_some());
        }
        access_disk_with_check_canceled("transient.exists", || self.0.provider.exists(&self.0.path))
    }

    pub(crate) fn is_directory(&self) -> VfsResult<bool> {
        if self.combined() {
            return Ok(self.attributes()?.is_some_and(|a| a.is_directory()));
        }
        access_disk_with_check_canceled("transient.is_directory", || {
            self.0.provider.is_directory(&self.0.path)
        })
    }

    pub(crate) fn length(&self) -> VfsResult<u64> {
        if self.combined() {
            return Ok(self.attributes()?.map_or(0, |a| a.length));
        }
        access_disk_with_check_canceled("transient.length", || self.0.provider.length(&self.0.path))
    }

    pub(crate) fn timestamp(&self) -> VfsResult<u64> {
        if self.combined() {
            return Ok(self.attributes()?.map_or(0, |a| a.last_modified));
        }
        access_disk_with_check_canceled("transient.timestamp", || {
            self.0.provider.timestamp(&self.0.path)
        })
    }

    /// Drop the memo so the next query asks the provider again.
    pub(crate) fn reset(&self) {
        *self.0.snapshot.lock() = Snapshot::Unknown;
    }

    pub(crate) fn list(&self) -> VfsResult<Vec<String>> {
        if !self.is_directory()? {
            return Ok(Vec::new());
        }
        access_disk_with_check_canceled("transient.list", || self.0.provider.list(&self.0.path))
    }

    pub(crate) fn structurally_equal(&self, other: &TransientNode) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if !crate::provider::same_provider(self.provider().as_ref(), other.provider().as_ref()) {
            return false;
        }
        let case_sensitive = self.provider().is_case_sensitive();
        let names_match = fold_case(self.name(), case_sensitive)
            == fold_case(other.name(), case_sensitive);
        if !names_match {
            return false;
        }
        match (self.parent(), other.parent()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.path() == other.path(),
            _ => false,
        }
    }
}

impl std::fmt::Debug for TransientNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientNode")
            .field("protocol", &self.provider().protocol())
            .field("path", &self.path())
            .finish()
    }
}
