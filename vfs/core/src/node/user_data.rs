use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Typed key for node side data.
pub struct UserDataKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> UserDataKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

type Value = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub(crate) struct UserDataMap {
    values: Mutex<HashMap<&'static str, Value>>,
}

impl UserDataMap {
    pub(crate) fn get<T: Any + Send + Sync>(&self, key: &UserDataKey<T>) -> Option<Arc<T>> {
        let value = self.values.lock().get(key.name)?.clone();
        value.downcast::<T>().ok()
    }

    pub(crate) fn put<T: Any + Send + Sync>(&self, key: &UserDataKey<T>, value: Option<Arc<T>>) {
        let mut values = self.values.lock();
        match value {
            Some(value) => {
                values.insert(key.name, value);
            }
            None => {
                values.remove(key.name);
            }
        }
    }

    /// Store `new` only if the current value is `expected` (by pointer).
    pub(crate) fn replace<T: Any + Send + Sync>(
        &self,
        key: &UserDataKey<T>,
        expected: Option<&Arc<T>>,
        new: Option<Arc<T>>,
    ) -> bool {
        let mut values = self.values.lock();
        let matches = match (values.get(key.name), expected) {
            (None, None) => true,
            (Some(current), Some(expected)) => {
                std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(expected))
            }
            _ => false,
        };
        if !matches {
            return false;
        }
        match new {
            Some(new) => {
                values.insert(key.name, new);
            }
            None => {
                values.remove(key.name);
            }
        }
        true
    }
}

static UNSTABLE_ACCESSES: AtomicU64 = AtomicU64::new(0);

/// Number of side-data accesses made on nodes without stable identity.
pub fn unstable_user_data_accesses() -> u64 {
    UNSTABLE_ACCESSES.load(Ordering::Relaxed)
}

pub(crate) fn note_unstable_access(kind: &'static str, path: &str, key: &'static str) {
    UNSTABLE_ACCESSES.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(
        node = kind,
        path,
        key,
        "side data on a node without stable identity is not shared between instances"
    );
}
