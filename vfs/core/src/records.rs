//! State that survives process restarts: node ids by url, recorded root
//! timestamps, attribute values and the persisted modification counter.
//!
//! The whole image is saved and loaded as one `bincode` blob.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::attributes::{AttributeStore, StoredAttribute, StringEnumerator};
use crate::{NodeId, VfsError, VfsErrorKind, VfsResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct RecordedNode {
    id: u32,
    timestamp: Option<u64>,
}

struct IdTable {
    by_url: HashMap<String, RecordedNode>,
    next_id: u32,
}

impl Default for IdTable {
    fn default() -> Self {
        Self {
            by_url: HashMap::new(),
            next_id: 1,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RecordsImage {
    next_id: u32,
    nodes: Vec<(String, RecordedNode)>,
    attributes: Vec<((u32, String), StoredAttribute)>,
    names: Vec<String>,
    modification_count: u64,
}

pub struct PersistentRecords {
    attributes: Arc<AttributeStore>,
    names: StringEnumerator,
    ids: Mutex<IdTable>,
    modification_count: AtomicU64,
}

impl Default for PersistentRecords {
    fn default() -> Self {
        Self {
            attributes: Arc::new(AttributeStore::new()),
            names: StringEnumerator::new(),
            ids: Mutex::new(IdTable::default()),
            modification_count: AtomicU64::new(0),
        }
    }
}

impl PersistentRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attributes(&self) -> &Arc<AttributeStore> {
        &self.attributes
    }

    /// Interning codec persisted with the records.
    pub fn names(&self) -> &StringEnumerator {
        &self.names
    }

    /// Id recorded for `key`, allocating one on first use.
    ///
    /// Returns the id together with the timestamp recorded last time.
    pub(crate) fn id_for(&self, key: &str) -> VfsResult<(NodeId, Option<u64>)> {
        let mut ids = self.ids.lock();
        if let Some(recorded) = ids.by_url.get(key) {
            let id = NodeId::new(recorded.id)
                .ok_or(VfsError::new(VfsErrorKind::Internal, "records.id_for"))?;
            return Ok((id, recorded.timestamp));
        }
        let raw = ids.next_id;
        let id = NodeId::new(raw).ok_or(VfsError::new(VfsErrorKind::Internal, "records.id_for"))?;
        ids.next_id = raw
            .checked_add(1)
            .ok_or(VfsError::new(VfsErrorKind::Internal, "records.id_for.exhausted"))?;
        ids.by_url.insert(
            key.to_string(),
            RecordedNode {
                id: raw,
                timestamp: None,
            },
        );
        Ok((id, None))
    }

    pub(crate) fn record_timestamp(&self, key: &str, timestamp: u64) {
        if let Some(recorded) = self.ids.lock().by_url.get_mut(key) {
            recorded.timestamp = Some(timestamp);
        }
    }

    /// Forget the id of `key` and of everything recorded beneath it.
    pub(crate) fn forget(&self, key: &str) {
        let prefix = if key.ends_with('/') {
            key.to_string()
        } else {
            format!("{key}/")
        };
        self.ids
            .lock()
            .by_url
            .retain(|url, _| url != key && !url.starts_with(&prefix));
    }

    pub fn modification_count(&self) -> u64 {
        self.modification_count.load(Ordering::Acquire)
    }

    pub(crate) fn increment_modification_count(&self) -> u64 {
        self.modification_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Write the image to `path`, replacing any previous image.
    pub fn save(&self, path: impl AsRef<Path>) -> VfsResult<()> {
        let image = {
            let ids = self.ids.lock();
            RecordsImage {
                next_id: ids.next_id,
                nodes: ids
                    .by_url
                    .iter()
                    .map(|(url, node)| (url.clone(), *node))
                    .collect(),
                attributes: self.attributes.snapshot(),
                names: self.names.names(),
                modification_count: self.modification_count(),
            }
        };
        let file = File::create(path.as_ref())?;
        bincode::serialize_into(BufWriter::new(file), &image)
            .map_err(|err| VfsError::with_source(VfsErrorKind::Io, "records.save", err))?;
        tracing::debug!(path = %path.as_ref().display(), nodes = image.nodes.len(), "saved records");
        Ok(())
    }

    /// Read an image written by [`Self::save`]; a missing file loads as empty.
    pub fn load(path: impl AsRef<Path>) -> VfsResult<Self> {
        let file = match File::open(path.as_ref()) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::new()),
            Err(err) => return Err(err.into()),
        };
        let image: RecordsImage = bincode::deserialize_from(BufReader::new(file))
            .map_err(|err| VfsError::with_source(VfsErrorKind::InvalidInput, "records.load", err))?;
        tracing::debug!(path = %path.as_ref().display(), nodes = image.nodes.len(), "loaded records");
        Ok(Self {
            attributes: Arc::new(AttributeStore::from_snapshot(image.attributes)),
            names: StringEnumerator::from_names(image.names),
            ids: Mutex::new(IdTable {
                by_url: image.nodes.into_iter().collect(),
                next_id: image.next_id.max(1),
            }),
            modification_count: AtomicU64::new(image.modification_count),
        })
    }
}
