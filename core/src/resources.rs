//! The resource bag: shared, lifecycle-scoped key/value state.
//!
//! Handlers running in different phases of the same unit of work communicate
//! through [`Resources`]: a concurrent mapping from typed opaque keys to
//! values, living exactly as long as its processing context. Keys carry their
//! value type, so the bag itself stays untyped while lookups stay safe.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(0);

/// A typed key into a [`Resources`] bag.
///
/// Every key value created through [`ResourceKey::new`] (or
/// [`ResourceKey::with_label`]) has a process-unique identity; clones of a key
/// address the same entry, distinct keys never collide — even for the same
/// value type.
///
/// # Examples
///
/// ```
/// use phaseline_core::resources::{ResourceKey, Resources};
///
/// let counter: ResourceKey<u64> = ResourceKey::with_label("delivery-count");
/// let resources = Resources::new();
///
/// resources.put(counter, 3);
/// assert_eq!(resources.get(counter).as_deref(), Some(&3));
/// ```
pub struct ResourceKey<T> {
    id: u64,
    label: Option<&'static str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResourceKey<T> {
    /// Create a new key with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            label: None,
            _marker: PhantomData,
        }
    }

    /// Create a new key carrying a label for diagnostics.
    #[must_use]
    pub fn with_label(label: &'static str) -> Self {
        Self {
            label: Some(label),
            ..Self::new()
        }
    }

    /// The diagnostic label, if one was given.
    #[must_use]
    pub const fn label(&self) -> Option<&'static str> {
        self.label
    }
}

impl<T> Default for ResourceKey<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ResourceKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ResourceKey<T> {}

impl<T> fmt::Debug for ResourceKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label {
            Some(label) => write!(f, "ResourceKey({label}#{})", self.id),
            None => write!(f, "ResourceKey(#{})", self.id),
        }
    }
}

/// Concurrent key/value state scoped to a single processing context.
///
/// Values are stored behind `Arc`, so readers get shared handles rather than
/// copies; a value stays alive while any handler still holds it, even after
/// [`Resources::remove`]. No iteration order is defined or exposed.
#[derive(Default)]
pub struct Resources {
    entries: Mutex<HashMap<u64, Arc<dyn Any + Send + Sync>>>,
}

impl Resources {
    /// Create an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing and returning any previous value.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn put<T: Send + Sync + 'static>(&self, key: ResourceKey<T>, value: T) -> Option<Arc<T>> {
        let mut entries = self.entries.lock().unwrap();
        entries
            .insert(key.id, Arc::new(value))
            .and_then(downcast_entry)
    }

    /// Read the value under `key`, if present.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn get<T: Send + Sync + 'static>(&self, key: ResourceKey<T>) -> Option<Arc<T>> {
        let entries = self.entries.lock().unwrap();
        entries.get(&key.id).cloned().and_then(downcast_entry)
    }

    /// Return the value under `key`, computing and storing it first if absent.
    ///
    /// The factory runs while the bag is locked, so it is called at most once
    /// per key even when callers race. Factories should therefore be cheap
    /// and must not touch the same bag.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn get_or_compute<T, F>(&self, key: ResourceKey<T>, factory: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(key.id)
            .or_insert_with(|| Arc::new(factory()));
        match Arc::clone(entry).downcast() {
            Ok(value) => value,
            // Key identities are process-unique and typed at creation.
            Err(_) => unreachable!("resource key {key:?} bound to a different type"),
        }
    }

    /// Remove the value under `key`, returning it if it was present.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn remove<T: Send + Sync + 'static>(&self, key: ResourceKey<T>) -> Option<Arc<T>> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&key.id).and_then(downcast_entry)
    }

    /// Whether a value is currently stored under `key`.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn contains<T>(&self, key: ResourceKey<T>) -> bool {
        let entries = self.entries.lock().unwrap();
        entries.contains_key(&key.id)
    }
}

impl fmt::Debug for Resources {
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock().unwrap();
        f.debug_struct("Resources")
            .field("len", &entries.len())
            .finish_non_exhaustive()
    }
}

fn downcast_entry<T: Send + Sync + 'static>(entry: Arc<dyn Any + Send + Sync>) -> Option<Arc<T>> {
    entry.downcast().ok()
}
