//! Process-wide memo of archive handlers.
//!
//! Hosts are keyed by the local store's protocol and their path in that
//! store, so equal paths in two stores never share a handler. Per store, two
//! maps behind one mutex:
//! - host path -> (provider, handler);
//! - directory path -> host paths beneath it at any depth ("dominators").
//!
//! A host path is a handler key exactly when it is listed under each of its
//! ancestor directories. Every mutation keeps both maps in step under the
//! lock. Handler construction runs under the lock as well, so a host is
//! never decoded twice concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{ArchiveFileSystem, ArchiveHandler, ArchiveProvider};
use crate::VfsResult;
use crate::path::ancestors;
use crate::provider::FileSystemProvider;

struct HandlerEntry {
    provider: Weak<ArchiveFileSystem>,
    handler: Arc<dyn ArchiveHandler>,
}

/// Handlers of the hosts living in one local store.
#[derive(Default)]
struct StoreIndex {
    handlers: HashMap<String, HandlerEntry>,
    dominators: HashMap<String, HashSet<String>>,
}

impl StoreIndex {
    fn insert(&mut self, local_path: &str, entry: HandlerEntry) {
        for ancestor in ancestors(local_path) {
            self.dominators
                .entry(ancestor.to_string())
                .or_default()
                .insert(local_path.to_string());
        }
        self.handlers.insert(local_path.to_string(), entry);
    }

    fn remove(&mut self, local_path: &str) -> Option<HandlerEntry> {
        let entry = self.handlers.remove(local_path)?;
        for ancestor in ancestors(local_path) {
            if let Some(dominated) = self.dominators.get_mut(ancestor) {
                dominated.remove(local_path);
                if dominated.is_empty() {
                    self.dominators.remove(ancestor);
                }
            }
        }
        Some(entry)
    }

    fn is_consistent(&self) -> bool {
        let every_handler_indexed = self.handlers.keys().all(|local_path| {
            ancestors(local_path).all(|ancestor| {
                self.dominators
                    .get(ancestor)
                    .is_some_and(|set| set.contains(local_path))
            })
        });
        let every_index_entry_live = self.dominators.iter().all(|(directory, set)| {
            !set.is_empty()
                && set.iter().all(|local_path| {
                    self.handlers.contains_key(local_path)
                        && crate::path::is_ancestor(directory, local_path)
                })
        });
        every_handler_indexed && every_index_entry_live
    }
}

#[derive(Default)]
struct RegistryState {
    stores: HashMap<String, StoreIndex>,
}

impl RegistryState {
    fn remove(&mut self, protocol: &str, local_path: &str) -> Option<HandlerEntry> {
        let store = self.stores.get_mut(protocol)?;
        let entry = store.remove(local_path);
        if store.handlers.is_empty() {
            self.stores.remove(protocol);
        }
        entry
    }
}

/// A handler dropped from the registry, kept for the follow-up refresh.
#[derive(Clone, Debug)]
pub struct InvalidatedArchive {
    pub protocol: String,
    pub local_path: String,
    pub provider: Weak<ArchiveFileSystem>,
}

#[derive(Default)]
pub struct ArchiveHandlerRegistry {
    state: Mutex<RegistryState>,
}

impl ArchiveHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler for the archive hosted at `local_path` in the local store of
    /// `provider`, built on first use.
    ///
    /// A failing `producer` leaves no entry behind.
    pub fn get_handler(
        &self,
        provider: &Arc<ArchiveFileSystem>,
        local_path: &str,
        producer: impl FnOnce(&str) -> VfsResult<Arc<dyn ArchiveHandler>>,
    ) -> VfsResult<Arc<dyn ArchiveHandler>> {
        let protocol = provider.local_provider().protocol();
        let mut state = self.state.lock();
        if let Some(entry) = state
            .stores
            .get(protocol)
            .and_then(|store| store.handlers.get(local_path))
        {
            if std::ptr::eq(entry.provider.as_ptr(), Arc::as_ptr(provider)) {
                return Ok(entry.handler.clone());
            }
            // Another archive format claimed this host before; replace it.
            if let Some(stale) = state.remove(protocol, local_path) {
                stale.handler.clear_caches();
            }
        }

        let handler = producer(local_path)?;
        state.stores.entry(protocol.to_string()).or_default().insert(
            local_path,
            HandlerEntry {
                provider: Arc::downgrade(provider),
                handler: handler.clone(),
            },
        );
        tracing::debug!(
            store = protocol,
            host = local_path,
            format = FileSystemProvider::protocol(provider.as_ref()),
            "constructed archive handler"
        );
        Ok(handler)
    }

    /// Drop the handler of `local_path` in store `protocol` and clear its caches.
    pub fn invalidate(&self, protocol: &str, local_path: &str) -> Option<InvalidatedArchive> {
        let entry = self.state.lock().remove(protocol, local_path)?;
        entry.handler.clear_caches();
        tracing::debug!(store = protocol, host = local_path, "invalidated archive handler");
        Some(InvalidatedArchive {
            protocol: protocol.to_string(),
            local_path: local_path.to_string(),
            provider: entry.provider,
        })
    }

    /// Invalidate every handler whose host lies beneath `directory`.
    pub fn invalidate_dominated(&self, protocol: &str, directory: &str) -> Vec<InvalidatedArchive> {
        self.dominated_by(protocol, directory)
            .into_iter()
            .filter_map(|local_path| self.invalidate(protocol, &local_path))
            .collect()
    }

    /// Host paths beneath `directory`, at any depth, sorted.
    pub fn dominated_by(&self, protocol: &str, directory: &str) -> Vec<String> {
        let state = self.state.lock();
        let mut hosts: Vec<String> = state
            .stores
            .get(protocol)
            .and_then(|store| store.dominators.get(directory))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        hosts.sort();
        hosts
    }

    pub fn contains(&self, protocol: &str, local_path: &str) -> bool {
        self.state
            .lock()
            .stores
            .get(protocol)
            .is_some_and(|store| store.handlers.contains_key(local_path))
    }

    /// Hosts with a handler in store `protocol`, sorted.
    pub fn handler_paths(&self, protocol: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .state
            .lock()
            .stores
            .get(protocol)
            .map(|store| store.handlers.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .stores
            .values()
            .map(|store| store.handlers.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every handler unconditionally.
    pub fn clear(&self) -> Vec<InvalidatedArchive> {
        let drained: Vec<(String, StoreIndex)> = self.state.lock().stores.drain().collect();
        let invalidated: Vec<InvalidatedArchive> = drained
            .into_iter()
            .flat_map(|(protocol, store)| {
                store.handlers.into_iter().map(move |(local_path, entry)| {
                    entry.handler.clear_caches();
                    InvalidatedArchive {
                        protocol: protocol.clone(),
                        local_path,
                        provider: entry.provider,
                    }
                })
            })
            .collect();
        tracing::debug!(count = invalidated.len(), "cleared archive handlers");
        invalidated
    }

    /// Whether the handler map and the dominators index agree in every store.
    pub fn is_consistent(&self) -> bool {
        self.state
            .lock()
            .stores
            .values()
            .all(|store| !store.handlers.is_empty() && store.is_consistent())
    }
}
