//! Mapping of local-store events onto the archives they host, and of
//! archive events back onto their hosts.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use super::{ArchiveFileSystem, ArchiveProvider};
use crate::VfsEvent;
use crate::path::is_ancestor;
use crate::provider::{FileSystemProvider, same_provider};
use crate::vfs::VfsShared;

/// Where a batch of events comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EventOrigin {
    /// Reported by a caller; archive events are mirrored onto their hosts.
    External,
    /// Observed by a refresh session from the providers' current state.
    Refresh,
}

/// Work deferred until a batch of events has been accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ApplyAction {
    InvalidateHandler { protocol: String, local_path: String },
    /// Host-side counterpart of an archive event; applied without cascading.
    MirrorHostEvent { event: VfsEvent },
}

/// Add a deletion of each archive root whose host is deleted, moved or
/// renamed by `events`, and the matching handler cleanup actions.
///
/// External events inside an archive are mirrored onto the host: a change
/// to the root removes the host, a change to an entry is a content change of
/// it. Refresh-observed archive events already derive from the host.
pub(crate) fn translate_local_events(
    shared: &VfsShared,
    events: Vec<VfsEvent>,
    origin: EventOrigin,
) -> (Vec<VfsEvent>, Vec<ApplyAction>) {
    let archives = shared.archives();
    let mut archive_events = Vec::new();
    let mut actions = Vec::new();
    let mut seen_roots = HashSet::new();
    let mut seen_hosts = HashSet::new();

    for event in &events {
        for fs in archives.iter().filter(|_| origin == EventOrigin::External) {
            let Some(host_event) = fs.local_event_for(event) else {
                continue;
            };
            if host_event.removes_path() {
                let local = (host_event.protocol().to_string(), host_event.path().to_string());
                if seen_hosts.insert(local.clone()) {
                    actions.push(ApplyAction::InvalidateHandler {
                        protocol: local.0,
                        local_path: local.1,
                    });
                }
            }
            actions.push(ApplyAction::MirrorHostEvent { event: host_event });
        }
        if !event.removes_path() {
            continue;
        }
        for fs in archives
            .iter()
            .filter(|fs| fs.local_provider().protocol() == event.protocol())
        {
            let store = event.protocol();
            for host in affected_hosts(shared, fs, event.path()) {
                let root = fs.compose_root_path(&host);
                let archive: &dyn FileSystemProvider = fs.as_ref();
                if shared.table.lookup(archive, &root).is_some()
                    && seen_roots.insert((archive.protocol(), root.clone()))
                {
                    archive_events.push(VfsEvent::delete(archive.protocol(), root));
                }
                if seen_hosts.insert((store.to_string(), host.clone())) {
                    actions.push(ApplyAction::InvalidateHandler {
                        protocol: store.to_string(),
                        local_path: host,
                    });
                }
            }
        }
    }

    let mut batch = events;
    batch.extend(archive_events);
    (batch, actions)
}

/// Hosts at or beneath `path` that have a handler or a cached root.
fn affected_hosts(shared: &VfsShared, fs: &Arc<ArchiveFileSystem>, path: &str) -> BTreeSet<String> {
    let store = fs.local_provider().protocol();
    let mut hosts = BTreeSet::new();
    if shared.handlers.contains(store, path) {
        hosts.insert(path.to_string());
    }
    hosts.extend(shared.handlers.dominated_by(store, path));

    let archive: &dyn FileSystemProvider = fs.as_ref();
    for root in shared.table.roots() {
        if !same_provider(root.provider().as_ref(), archive) {
            continue;
        }
        let local_path = fs.extract_local_path(root.path());
        if local_path == path || is_ancestor(path, &local_path) {
            hosts.insert(local_path);
        }
    }
    hosts
}
