//! Per-node binary side storage keyed by `(node, attribute id)`.
//!
//! Every stored value carries the version of the [`FileAttribute`] that wrote
//! it. A reader registered at a different version sees the value as absent.

use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Declaration of one attribute kind.
///
/// Only [`AttributeRegistry::register`] hands these out, so an id is unique
/// within its registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileAttribute {
    id: Arc<str>,
    version: u32,
    fixed_size: Option<usize>,
}

impl FileAttribute {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Expected payload size, used to preallocate write buffers.
    pub fn fixed_size(&self) -> Option<usize> {
        self.fixed_size
    }
}

/// The set of attribute kinds declared by one process.
pub struct AttributeRegistry {
    max_id_len: usize,
    ids: Mutex<HashSet<Arc<str>>>,
}

impl AttributeRegistry {
    pub fn new(max_id_len: usize) -> Self {
        Self {
            max_id_len,
            ids: Mutex::new(HashSet::new()),
        }
    }

    /// Declare an attribute kind.
    ///
    /// # Panics
    ///
    /// Panics if `id` is empty, longer than the configured limit, or was
    /// already registered. These are configuration bugs, not runtime
    /// conditions.
    pub fn register(&self, id: &str, version: u32, fixed_size: Option<usize>) -> FileAttribute {
        assert!(
            !id.is_empty() && id.len() <= self.max_id_len,
            "invalid attribute id {id:?}"
        );
        let id: Arc<str> = Arc::from(id);
        let mut ids = self.ids.lock();
        assert!(ids.insert(id.clone()), "attribute id {id:?} registered twice");
        tracing::trace!(attribute = %id, version, "registered file attribute");
        FileAttribute {
            id,
            version,
            fixed_size,
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.ids.lock().contains(id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredAttribute {
    pub(crate) version: u32,
    pub(crate) bytes: Vec<u8>,
}

type AttributeKey = (NodeId, String);

#[derive(Default)]
pub struct AttributeStore {
    entries: RwLock<HashMap<AttributeKey, StoredAttribute>>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream over the stored value, `None` if absent or of another version.
    pub fn read(&self, node: NodeId, attribute: &FileAttribute) -> Option<AttributeInput> {
        let entries = self.entries.read();
        let stored = entries.get(&(node, attribute.id().to_string()))?;
        if stored.version != attribute.version() {
            tracing::trace!(
                attribute = attribute.id(),
                stored = stored.version,
                expected = attribute.version(),
                "attribute version mismatch"
            );
            return None;
        }
        Some(AttributeInput {
            inner: io::Cursor::new(stored.bytes.clone()),
        })
    }

    /// Sink replacing the stored value once closed or dropped.
    pub fn write(self: &Arc<Self>, node: NodeId, attribute: &FileAttribute) -> AttributeOutput {
        AttributeOutput {
            store: self.clone(),
            key: Some((node, attribute.id().to_string())),
            version: attribute.version(),
            buffer: Vec::with_capacity(attribute.fixed_size().unwrap_or(0)),
        }
    }

    /// Drop every attribute stored for `node`.
    pub fn delete_attributes(&self, node: NodeId) {
        self.entries.write().retain(|(owner, _), _| *owner != node);
    }

    /// Visit every stored `(node, attribute id)` pair.
    pub fn for_each_attribute(&self, mut visit: impl FnMut(NodeId, &str)) {
        let entries = self.entries.read();
        for (node, id) in entries.keys() {
            visit(*node, id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn snapshot(&self) -> Vec<((u32, String), StoredAttribute)> {
        self.entries
            .read()
            .iter()
            .map(|((node, id), stored)| ((node.get(), id.clone()), stored.clone()))
            .collect()
    }

    pub(crate) fn from_snapshot(entries: Vec<((u32, String), StoredAttribute)>) -> Self {
        let entries = entries
            .into_iter()
            .filter_map(|((raw, id), stored)| Some(((NodeId::new(raw)?, id), stored)))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn commit(&self, key: AttributeKey, version: u32, bytes: Vec<u8>) {
        self.entries
            .write()
            .insert(key, StoredAttribute { version, bytes });
    }
}

pub struct AttributeInput {
    inner: io::Cursor<Vec<u8>>,
}

impl AttributeInput {
    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

impl Read for AttributeInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

pub struct AttributeOutput {
    store: Arc<AttributeStore>,
    key: Option<AttributeKey>,
    version: u32,
    buffer: Vec<u8>,
}

impl AttributeOutput {
    /// Commit the written bytes.
    pub fn close(mut self) {
        self.commit();
    }

    fn commit(&mut self) {
        if let Some(key) = self.key.take() {
            let bytes = std::mem::take(&mut self.buffer);
            self.store.commit(key, self.version, bytes);
        }
    }
}

impl Write for AttributeOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for AttributeOutput {
    fn drop(&mut self) {
        self.commit();
    }
}

#[derive(Default)]
struct EnumeratorState {
    by_name: HashMap<String, u32>,
    names: Vec<String>,
}

/// String interning codec: strings are written as a LEB128 id.
#[derive(Default)]
pub struct StringEnumerator {
    state: Mutex<EnumeratorState>,
}

impl StringEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_names(names: Vec<String>) -> Self {
        let by_name = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx as u32))
            .collect();
        Self {
            state: Mutex::new(EnumeratorState { by_name, names }),
        }
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.state.lock().names.clone()
    }

    pub fn enumerate(&self, value: &str) -> u32 {
        let mut state = self.state.lock();
        if let Some(id) = state.by_name.get(value) {
            return *id;
        }
        let id = state.names.len() as u32;
        state.names.push(value.to_string());
        state.by_name.insert(value.to_string(), id);
        id
    }

    pub fn value_of(&self, id: u32) -> Option<String> {
        self.state.lock().names.get(id as usize).cloned()
    }

    pub fn write_enumerated(&self, out: &mut impl Write, value: &str) -> io::Result<()> {
        let id = self.enumerate(value);
        leb128::write::unsigned(out, u64::from(id))?;
        Ok(())
    }

    /// Read a string written by [`Self::write_enumerated`]; `None` for an
    /// unknown id.
    pub fn read_enumerated(&self, input: &mut impl Read) -> io::Result<Option<String>> {
        let id = leb128::read::unsigned(input).map_err(|err| match err {
            leb128::read::Error::IoError(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })?;
        let Ok(id) = u32::try_from(id) else {
            return Ok(None);
        };
        Ok(self.value_of(id))
    }
}
