//! The managing registry: roots, identity map, counters, attribute I/O,
//! event application and the refresh entry points.
//!
//! A [`Vfs`] is an explicit shared context. Clones share state; the state is
//! torn down by [`Vfs::shutdown`] or when the last clone goes away.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::archive::{
    ApplyAction, ArchiveFileSystem, ArchiveFormat, ArchiveHandlerRegistry, ArchiveProvider,
    EventOrigin, InvalidatedArchive, translate_local_events,
};
use crate::attributes::{AttributeInput, AttributeOutput, AttributeRegistry, FileAttribute};
use crate::cancel::access_disk_with_check_canceled;
use crate::navigator::{Navigation, RootSource, SymlinkPolicy, TransientRoots, navigate};
use crate::node::{CachedNode, FileNode};
use crate::path::file_name;
use crate::provider::{FileSystemProvider, split_url, url_of};
use crate::provider_registry::ProviderRegistry;
use crate::records::PersistentRecords;
use crate::refresh::{Executor, JobMode, RefreshQueue};
use crate::table::NodeTable;
use crate::{NodeId, VfsConfig, VfsError, VfsErrorKind, VfsEvent, VfsResult};

pub(crate) struct VfsShared {
    pub(crate) config: VfsConfig,
    pub(crate) providers: ProviderRegistry,
    archives: RwLock<Vec<Arc<ArchiveFileSystem>>>,
    pub(crate) handlers: Arc<ArchiveHandlerRegistry>,
    pub(crate) records: Arc<PersistentRecords>,
    pub(crate) attributes: AttributeRegistry,
    pub(crate) table: NodeTable,
    pub(crate) refresh: RefreshQueue,
    connected: AtomicBool,
}

impl VfsShared {
    pub(crate) fn archives(&self) -> Vec<Arc<ArchiveFileSystem>> {
        self.archives.read().clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn find_root(
        &self,
        root_path: &str,
        provider: &Arc<dyn FileSystemProvider>,
    ) -> Option<CachedNode> {
        if !self.is_connected() {
            return None;
        }
        let normalized = provider.normalize(root_path)?;
        let root = provider.extract_root_path(&normalized);
        if root.is_empty() || root != normalized {
            tracing::debug!(path = root_path, protocol = provider.protocol(), "not a root path");
            return None;
        }
        if let Some(existing) = self.table.lookup(provider.as_ref(), &root) {
            return Some(existing);
        }
        let attributes = match access_disk_with_check_canceled("vfs.find_root", || {
            provider.attributes(&root)
        }) {
            Ok(Some(attributes)) => attributes,
            Ok(None) => return None,
            Err(err) => {
                tracing::debug!(root = %root, error = %err, "root lookup failed");
                return None;
            }
        };
        match self.table.get_or_insert_root(provider, &root, attributes) {
            Ok((node, _)) => Some(node),
            Err(err) => {
                tracing::warn!(root = %root, error = %err, "could not record root");
                None
            }
        }
    }

    pub(crate) fn process_events(&self, events: Vec<VfsEvent>) -> bool {
        self.process_events_with(events, |_| true)
    }

    pub(crate) fn process_events_with(
        &self,
        events: Vec<VfsEvent>,
        accept: impl FnOnce(&[VfsEvent]) -> bool,
    ) -> bool {
        self.process_batch(events, EventOrigin::External, accept)
    }

    /// Apply events a refresh session observed.
    pub(crate) fn process_observed_events(&self, events: Vec<VfsEvent>) -> bool {
        self.process_batch(events, EventOrigin::Refresh, |_| true)
    }

    fn process_batch(
        &self,
        events: Vec<VfsEvent>,
        origin: EventOrigin,
        accept: impl FnOnce(&[VfsEvent]) -> bool,
    ) -> bool {
        if !self.is_connected() || events.is_empty() {
            return false;
        }
        let (batch, actions) = translate_local_events(self, events, origin);
        if !accept(&batch) {
            tracing::debug!(events = batch.len(), "event batch vetoed");
            return false;
        }

        for event in &batch {
            self.apply_event(event);
        }

        let mut invalidated = Vec::new();
        for action in actions {
            match action {
                ApplyAction::InvalidateHandler {
                    protocol,
                    local_path,
                } => {
                    invalidated.extend(self.handlers.invalidate(&protocol, &local_path));
                }
                ApplyAction::MirrorHostEvent { event } => self.apply_event(&event),
            }
        }
        for event in &batch {
            if let VfsEvent::ContentChange { protocol, path }
            | VfsEvent::PropertyChange { protocol, path } = event
            {
                if self.is_archive_protocol(protocol) {
                    continue;
                }
                invalidated.extend(self.handlers.invalidate(protocol, path));
                invalidated.extend(self.handlers.invalidate_dominated(protocol, path));
            }
        }
        self.schedule_archive_refresh(invalidated);
        true
    }

    fn is_archive_protocol(&self, protocol: &str) -> bool {
        self.archives
            .read()
            .iter()
            .any(|fs| FileSystemProvider::protocol(fs.as_ref()) == protocol)
    }

    fn apply_event(&self, event: &VfsEvent) {
        let provider = match self.providers.get(event.protocol()) {
            Ok(Some(provider)) => provider,
            _ => {
                tracing::trace!(protocol = event.protocol(), "event for unknown provider");
                return;
            }
        };
        tracing::trace!(?event, "applying event");
        match event {
            VfsEvent::Create { path, .. } => {
                self.on_created(&provider, path);
            }
            VfsEvent::ContentChange { path, .. } => {
                if let Some(node) = self.table.lookup(provider.as_ref(), path) {
                    match self.current_attributes(&provider, path) {
                        Some(attributes) => node.content_changed(attributes),
                        None => node.mark_dirty(),
                    }
                }
                self.records.increment_modification_count();
            }
            VfsEvent::PropertyChange { path, .. } => {
                if let Some(node) = self.table.lookup(provider.as_ref(), path)
                    && let Some(attributes) = self.current_attributes(&provider, path)
                {
                    node.set_snapshot(attributes);
                }
            }
            VfsEvent::Delete { path, .. } => {
                self.on_removed(&provider, path);
            }
            VfsEvent::Move {
                path, new_parent, ..
            } => {
                self.on_removed(&provider, path);
                self.on_created(&provider, &crate::path::join(new_parent, file_name(path)));
            }
            VfsEvent::Rename { path, new_name, .. } => {
                self.on_removed(&provider, path);
                if let Some(parent) = crate::path::parent_path(path) {
                    self.on_created(&provider, &crate::path::join(parent, new_name));
                }
            }
        }
    }

    fn current_attributes(
        &self,
        provider: &Arc<dyn FileSystemProvider>,
        path: &str,
    ) -> Option<crate::FileAttributes> {
        access_disk_with_check_canceled("vfs.current_attributes", || provider.attributes(path))
            .unwrap_or_else(|err| {
                tracing::debug!(path, error = %err, "attribute refresh failed");
                None
            })
    }

    fn on_created(&self, provider: &Arc<dyn FileSystemProvider>, path: &str) {
        self.table.bump_structure();
        let Some(parent) = self.table.lookup_parent(provider.as_ref(), path) else {
            return;
        };
        if !parent.children_loaded() {
            return;
        }
        let Some(attributes) = self.current_attributes(provider, path) else {
            return;
        };
        match self
            .table
            .get_or_insert_child(&parent, file_name(path), attributes)
        {
            Ok(Some(_)) => {}
            Ok(None) => tracing::debug!(path, "parent went away before the created node"),
            Err(err) => tracing::warn!(path, error = %err, "could not cache created node"),
        }
    }

    fn on_removed(&self, provider: &Arc<dyn FileSystemProvider>, path: &str) {
        self.records.increment_modification_count();
        let Some(node) = self.table.lookup(provider.as_ref(), path) else {
            self.table.bump_structure();
            return;
        };
        for removed in self.table.remove_subtree(node.id()) {
            self.records.attributes().delete_attributes(removed.id());
        }
        self.records
            .forget(&NodeTable::record_key(provider.as_ref(), path));
    }

    fn schedule_archive_refresh(&self, invalidated: Vec<InvalidatedArchive>) {
        let mut roots = Vec::new();
        for archive in invalidated {
            let Some(fs) = archive.provider.upgrade() else {
                continue;
            };
            let root_path = fs.compose_root_path(&archive.local_path);
            let provider: Arc<dyn FileSystemProvider> = fs;
            if let Some(root) = self.find_root(&root_path, &provider) {
                root.mark_dirty_recursively();
                roots.push(FileNode::Cached(root));
            }
        }
        if roots.is_empty() {
            return;
        }
        tracing::debug!(roots = roots.len(), "scheduling refresh of invalidated archives");
        self.refresh.refresh(true, true, None, roots);
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.refresh.shutdown();
            self.handlers.clear();
            tracing::debug!("vfs disconnected");
        }
    }
}

impl Drop for VfsShared {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl RootSource for VfsShared {
    fn find_root(
        &self,
        provider: &Arc<dyn FileSystemProvider>,
        root_path: &str,
    ) -> Option<FileNode> {
        VfsShared::find_root(self, root_path, provider).map(FileNode::Cached)
    }
}

#[derive(Default)]
pub struct VfsBuilder {
    config: VfsConfig,
    records: Option<Arc<PersistentRecords>>,
    providers: Vec<Arc<dyn FileSystemProvider>>,
}

impl VfsBuilder {
    pub fn config(mut self, config: VfsConfig) -> Self {
        self.config = config;
        self
    }

    /// Records carried over from a previous session.
    pub fn records(mut self, records: Arc<PersistentRecords>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn FileSystemProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> VfsResult<Vfs> {
        let executor = Executor::new(&self.config)?;
        let records = self.records.unwrap_or_default();
        let config = self.config;
        let shared = Arc::new_cyclic(|weak| VfsShared {
            attributes: AttributeRegistry::new(config.max_attribute_id_len),
            providers: ProviderRegistry::new(),
            archives: RwLock::new(Vec::new()),
            handlers: Arc::new(ArchiveHandlerRegistry::new()),
            table: NodeTable::new(weak.clone(), records.clone()),
            refresh: RefreshQueue::new(weak.clone(), executor),
            records,
            config,
            connected: AtomicBool::new(true),
        });
        for provider in self.providers {
            shared.providers.register(provider)?;
        }
        tracing::debug!(providers = ?shared.providers.list_names(), "vfs connected");
        Ok(Vfs { shared })
    }
}

#[derive(Clone)]
pub struct Vfs {
    shared: Arc<VfsShared>,
}

impl Vfs {
    pub fn builder() -> VfsBuilder {
        VfsBuilder::default()
    }

    pub fn config(&self) -> &VfsConfig {
        &self.shared.config
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    pub fn register_provider(&self, provider: Arc<dyn FileSystemProvider>) -> VfsResult<()> {
        self.shared.providers.register(provider)
    }

    /// Unregister a provider; call [`Self::plugin_unloaded`] afterwards to
    /// drop what it left in the cache.
    pub fn unregister_provider(&self, protocol: &str) -> VfsResult<()> {
        let removed = self.shared.providers.unregister(protocol)?;
        if let Some(removed) = removed {
            self.shared.archives.write().retain(|fs| {
                let archive: &dyn FileSystemProvider = fs.as_ref();
                !crate::provider::same_provider(archive, removed.as_ref())
            });
        }
        Ok(())
    }

    pub fn provider(&self, protocol: &str) -> Option<Arc<dyn FileSystemProvider>> {
        self.shared.providers.get(protocol).ok().flatten()
    }

    pub fn claiming_provider(&self, path: &str) -> Option<Arc<dyn FileSystemProvider>> {
        self.shared.providers.claiming_provider(path)
    }

    /// Register an archive filesystem for `format` over the files of the
    /// provider registered as `local_protocol`.
    pub fn register_archive_format(
        &self,
        format: Arc<dyn ArchiveFormat>,
        local_protocol: &str,
    ) -> VfsResult<Arc<ArchiveFileSystem>> {
        let local = self.provider(local_protocol).ok_or(VfsError::new(
            VfsErrorKind::NotFound,
            "vfs.register_archive_format.local",
        ))?;
        let fs = ArchiveFileSystem::new(
            format,
            local,
            self.shared.handlers.clone(),
            self.shared.config.archive_separator.clone(),
        );
        self.shared.providers.register(fs.clone())?;
        self.shared.archives.write().push(fs.clone());
        Ok(fs)
    }

    pub fn archive_handlers(&self) -> &ArchiveHandlerRegistry {
        &self.shared.handlers
    }

    pub fn records(&self) -> &Arc<PersistentRecords> {
        &self.shared.records
    }

    /// Declare an attribute kind; panics on a duplicate or invalid id.
    pub fn register_attribute(
        &self,
        id: &str,
        version: u32,
        fixed_size: Option<usize>,
    ) -> FileAttribute {
        self.shared.attributes.register(id, version, fixed_size)
    }

    pub fn read_attribute(
        &self,
        node: &FileNode,
        attribute: &FileAttribute,
    ) -> VfsResult<Option<AttributeInput>> {
        let id = attribute_owner(node, "vfs.read_attribute")?;
        Ok(self.shared.records.attributes().read(id, attribute))
    }

    pub fn write_attribute(
        &self,
        node: &FileNode,
        attribute: &FileAttribute,
    ) -> VfsResult<AttributeOutput> {
        let id = attribute_owner(node, "vfs.write_attribute")?;
        Ok(self.shared.records.attributes().write(id, attribute))
    }

    pub fn roots(&self) -> Vec<FileNode> {
        self.shared
            .table
            .roots()
            .into_iter()
            .map(FileNode::Cached)
            .collect()
    }

    pub fn roots_of(&self, provider: &dyn FileSystemProvider) -> Vec<FileNode> {
        self.shared
            .table
            .roots()
            .into_iter()
            .filter(|root| crate::provider::same_provider(root.provider().as_ref(), provider))
            .map(FileNode::Cached)
            .collect()
    }

    /// Roots of providers that are not archive-backed.
    pub fn local_roots(&self) -> Vec<FileNode> {
        self.shared
            .table
            .roots()
            .into_iter()
            .filter(|root| root.provider().as_archive().is_none())
            .map(FileNode::Cached)
            .collect()
    }

    /// Cached root for `path`, created on first use.
    ///
    /// `path` must be a root of `provider` (it has no parent); anything
    /// else, a disconnected registry or a missing root answers `None`.
    pub fn find_root(&self, path: &str, provider: &Arc<dyn FileSystemProvider>) -> Option<FileNode> {
        self.shared.find_root(path, provider).map(FileNode::Cached)
    }

    pub fn find_node_by_id(&self, id: NodeId) -> Option<FileNode> {
        self.shared.table.get(id).map(FileNode::Cached)
    }

    /// Changes to the cached hierarchy since this registry was built.
    pub fn structure_modification_count(&self) -> u64 {
        self.shared.table.structure_modification_count()
    }

    /// Persisted modification counter.
    pub fn modification_count(&self) -> u64 {
        self.shared.records.modification_count()
    }

    pub fn cached_node_count(&self) -> usize {
        self.shared.table.len()
    }

    /// Resolve `path` against `provider` with cached nodes.
    pub fn navigate(
        &self,
        provider: &Arc<dyn FileSystemProvider>,
        path: &str,
        policy: SymlinkPolicy,
    ) -> VfsResult<Navigation> {
        navigate(self.shared.as_ref(), provider, path, policy)
    }

    /// Cached node for `protocol://path`, or for a bare path claimed by the
    /// highest-ranked provider.
    pub fn find_file_by_path(&self, url: &str) -> VfsResult<Option<FileNode>> {
        let Some((provider, path)) = self.resolve_url(url) else {
            return Ok(None);
        };
        Ok(self
            .navigate(&provider, path, self.shared.config.navigation_policy)?
            .resolved())
    }

    /// Like [`Self::find_file_by_path`] but nothing is cached on the way.
    pub fn find_transient_by_path(&self, url: &str) -> VfsResult<Option<FileNode>> {
        let Some((provider, path)) = self.resolve_url(url) else {
            return Ok(None);
        };
        Ok(navigate(
            &TransientRoots,
            &provider,
            path,
            self.shared.config.navigation_policy,
        )?
        .resolved())
    }

    /// Resolve, refreshing the deepest cached ancestor once if that fails.
    pub fn refresh_and_find_file_by_path(&self, url: &str) -> VfsResult<Option<FileNode>> {
        let Some((provider, path)) = self.resolve_url(url) else {
            return Ok(None);
        };
        let policy = self.shared.config.navigation_policy;
        match self.navigate(&provider, path, policy)? {
            Navigation::Resolved(node) => Ok(Some(node)),
            Navigation::Empty => Ok(None),
            Navigation::Unresolved(last) => {
                last.refresh(false, false)?;
                Ok(self.navigate(&provider, path, policy)?.resolved())
            }
        }
    }

    /// Asynchronous [`Self::refresh_and_find_file_by_path`]; `callback` runs
    /// on the refresh executor.
    pub fn refresh_and_find_file_by_path_async(
        &self,
        url: &str,
        callback: impl FnOnce(VfsResult<Option<FileNode>>) + Send + 'static,
    ) {
        let weak = Arc::downgrade(&self.shared);
        let url = url.to_string();
        self.shared.refresh.submit(Box::new(move |mode| {
            let result = match (mode, weak.upgrade()) {
                (JobMode::Abandon, _) => Err(VfsError::cancelled("vfs.refresh_and_find_async")),
                (JobMode::Run, Some(shared)) => Vfs { shared }.refresh_and_find_file_by_path(&url),
                (JobMode::Run, None) => Ok(None),
            };
            callback(result);
        }));
    }

    fn resolve_url<'a>(&self, url: &'a str) -> Option<(Arc<dyn FileSystemProvider>, &'a str)> {
        if !self.is_connected() {
            return None;
        }
        match split_url(url) {
            Some((protocol, path)) => Some((self.provider(protocol)?, path)),
            None => Some((self.claiming_provider(url)?, url)),
        }
    }

    pub fn refresh_queue(&self) -> &RefreshQueue {
        &self.shared.refresh
    }

    /// Refresh every cached root of `protocol`, recursively.
    pub fn refresh(&self, protocol: &str, asynchronous: bool) -> VfsResult<()> {
        let provider = self
            .provider(protocol)
            .ok_or(VfsError::new(VfsErrorKind::NotFound, "vfs.refresh.provider"))?;
        let roots = self.roots_of(provider.as_ref());
        self.shared.refresh.refresh(asynchronous, true, None, roots);
        Ok(())
    }

    /// Treat `node` as changed even if its timestamp and length look equal.
    pub fn force_sync_refresh(&self, node: &FileNode) {
        let mut session = self.shared.refresh.create_session(false, false, None);
        session.add_event(VfsEvent::content_change(
            node.provider().protocol(),
            node.path(),
        ));
        session.launch();
    }

    /// Apply a batch of change events.
    pub fn process_events(&self, events: Vec<VfsEvent>) -> bool {
        self.shared.process_events(events)
    }

    /// Apply a batch of change events unless `accept` vetoes it.
    ///
    /// `accept` sees the batch after archive translation. Deferred cleanup
    /// only runs for accepted batches.
    pub fn process_events_with(
        &self,
        events: Vec<VfsEvent>,
        accept: impl FnOnce(&[VfsEvent]) -> bool,
    ) -> bool {
        self.shared.process_events_with(events, accept)
    }

    /// Drop every archive handler, then every cached root whose provider is
    /// no longer registered.
    pub fn plugin_unloaded(&self) {
        self.shared.handlers.clear();
        let mut dropped = 0;
        for root in self.shared.table.roots() {
            if self.shared.providers.is_registered(root.provider().as_ref()) {
                continue;
            }
            for removed in self.shared.table.remove_subtree(root.id()) {
                self.shared.records.attributes().delete_attributes(removed.id());
            }
            dropped += 1;
        }
        tracing::debug!(dropped, "plugin unloaded");
    }

    /// Stop the refresh executor and disconnect; later lookups answer absent.
    pub fn shutdown(&self) {
        self.shared.disconnect();
    }

    /// `protocol://path` of a provider path.
    pub fn url(&self, provider: &dyn FileSystemProvider, path: &str) -> String {
        url_of(provider, path)
    }
}

fn attribute_owner(node: &FileNode, context: &'static str) -> VfsResult<NodeId> {
    node.id()
        .ok_or(VfsError::new(VfsErrorKind::InvalidInput, context))
}
