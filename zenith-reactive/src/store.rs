//! External-Store Binding
//!
//! A signal can be bound to an entity in an outside key/value store. The
//! binding protocol is small:
//!
//! - on construction and on every accepted write, the signal calls
//!   `store.put(entity, signal, snapshot)`;
//! - on dispose, it calls `store.remove(entity, signal)`.
//!
//! Snapshots are `serde_json::Value`s so that stores stay independent of the
//! signal's value type. Store failures never reach the writer; they are
//! routed to the signal's error handler as `StoreSync` errors.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;
use crate::graph::SignalId;

/// Identifier of the entity a bound signal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// A key/value store that bound signals mirror their values into.
///
/// Stores may be shared with other threads (a persistence worker, for
/// example), hence the `Send + Sync` bound.
pub trait EntityStore: Send + Sync {
    /// Insert or replace the snapshot for `(entity, signal)`.
    fn put(&self, entity: EntityId, signal: SignalId, snapshot: Value) -> Result<(), StoreError>;

    /// Forget `(entity, signal)`.
    fn remove(&self, entity: EntityId, signal: SignalId) -> Result<(), StoreError>;

    /// Read back the snapshot for `(entity, signal)`.
    fn get(&self, entity: EntityId, signal: SignalId) -> Option<Value>;
}

type Snapshot<T> = Rc<dyn Fn(&T) -> Result<Value, serde_json::Error>>;

/// The `(entity, store)` pair attached to a signal.
pub struct EntityBinding<T> {
    entity: EntityId,
    store: Arc<dyn EntityStore>,
    snapshot: Snapshot<T>,
}

impl<T: Serialize + 'static> EntityBinding<T> {
    pub fn new(entity: EntityId, store: Arc<dyn EntityStore>) -> Self {
        Self {
            entity,
            store,
            snapshot: Rc::new(|value: &T| serde_json::to_value(value)),
        }
    }
}

impl<T> EntityBinding<T> {
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub(crate) fn sync(&self, signal: SignalId, value: &T) -> Result<(), StoreError> {
        let snapshot = (self.snapshot)(value)?;
        self.store.put(self.entity, signal, snapshot)
    }

    pub(crate) fn detach(&self, signal: SignalId) -> Result<(), StoreError> {
        self.store.remove(self.entity, signal)
    }
}

impl<T> Clone for EntityBinding<T> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity,
            store: Arc::clone(&self.store),
            snapshot: Rc::clone(&self.snapshot),
        }
    }
}

impl<T> fmt::Debug for EntityBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBinding")
            .field("entity", &self.entity)
            .finish_non_exhaustive()
    }
}

/// Thread-safe in-memory [`EntityStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(EntityId, SignalId), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already wrapped for sharing with signals.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All snapshots stored for one entity, keyed by signal.
    pub fn entity(&self, entity: EntityId) -> HashMap<SignalId, Value> {
        self.entries
            .read()
            .iter()
            .filter(|((e, _), _)| *e == entity)
            .map(|((_, signal), value)| (*signal, value.clone()))
            .collect()
    }
}

impl EntityStore for MemoryStore {
    fn put(&self, entity: EntityId, signal: SignalId, snapshot: Value) -> Result<(), StoreError> {
        self.entries.write().insert((entity, signal), snapshot);
        Ok(())
    }

    fn remove(&self, entity: EntityId, signal: SignalId) -> Result<(), StoreError> {
        self.entries.write().remove(&(entity, signal));
        Ok(())
    }

    fn get(&self, entity: EntityId, signal: SignalId) -> Option<Value> {
        self.entries.read().get(&(entity, signal)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_store_put_get_remove() {
        let store = MemoryStore::new();
        let entity = EntityId(1);
        let signal = SignalId::from(10);

        store.put(entity, signal, json!(5)).unwrap();
        assert_eq!(store.get(entity, signal), Some(json!(5)));
        assert_eq!(store.len(), 1);

        store.remove(entity, signal).unwrap();
        assert!(store.get(entity, signal).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn binding_serializes_snapshots() {
        #[derive(Serialize)]
        struct Position {
            x: i32,
            y: i32,
        }

        let store = MemoryStore::shared();
        let binding = EntityBinding::<Position>::new(EntityId(2), store.clone());
        let signal = SignalId::from(11);

        binding.sync(signal, &Position { x: 1, y: 2 }).unwrap();
        assert_eq!(store.get(EntityId(2), signal), Some(json!({"x": 1, "y": 2})));

        binding.detach(signal).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn entity_view_filters_by_entity() {
        let store = MemoryStore::new();
        store.put(EntityId(1), SignalId::from(1), json!("a")).unwrap();
        store.put(EntityId(2), SignalId::from(2), json!("b")).unwrap();

        let view = store.entity(EntityId(1));
        assert_eq!(view.len(), 1);
        assert_eq!(view.get(&SignalId::from(1)), Some(&json!("a")));
    }
}
