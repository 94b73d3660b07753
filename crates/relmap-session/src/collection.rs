//! Lazy entity collections.
//!
//! A collection is the to-many side of an association. It starts either
//! loaded (eager strategy, populated by hydration) or unloaded with a bound
//! [`CollectionLoader`]. The loaded flag flips *before* rows are fetched and
//! appended, so re-entrant access during population sees a loaded, possibly
//! partial collection instead of recursing into another load.

use crate::entity::EntityRef;
use crate::proxy::CollectionLoader;
use relmap_core::Result;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) struct Collection {
    pub(crate) loaded: bool,
    pub(crate) loader: Option<CollectionLoader>,
    pub(crate) items: Vec<EntityRef>,
}

/// Shared handle to a lazy collection.
#[derive(Clone)]
pub struct CollectionRef(Arc<RwLock<Collection>>);

/// Summarized output; items may reference back into cyclic entity graphs.
impl fmt::Debug for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(collection) => f
                .debug_struct("CollectionRef")
                .field("loaded", &collection.loaded)
                .field("items", &collection.items.len())
                .finish(),
            Err(_) => f.write_str("CollectionRef(<locked>)"),
        }
    }
}

impl CollectionRef {
    /// An already-loaded collection with the given items.
    pub fn loaded(items: Vec<EntityRef>) -> Self {
        Self(Arc::new(RwLock::new(Collection {
            loaded: true,
            loader: None,
            items,
        })))
    }

    /// An unloaded collection that resolves through `loader` on first use.
    pub(crate) fn lazy(loader: CollectionLoader) -> Self {
        Self(Arc::new(RwLock::new(Collection {
            loaded: false,
            loader: Some(loader),
            items: Vec::new(),
        })))
    }

    fn read(&self) -> RwLockReadGuard<'_, Collection> {
        self.0.read().expect("lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collection> {
        self.0.write().expect("lock poisoned")
    }

    pub fn ptr_eq(&self, other: &CollectionRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_loaded(&self) -> bool {
        self.read().loaded
    }

    /// All items, loading first if necessary. Order is the database result
    /// order.
    pub fn items(&self) -> Result<Vec<EntityRef>> {
        self.ensure_loaded()?;
        Ok(self.read().items.clone())
    }

    pub fn len(&self) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.read().items.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// Append without triggering a load. Population and manual additions
    /// both land here.
    pub fn push(&self, entity: EntityRef) {
        self.write().items.push(entity);
    }

    /// Run the bound loader once.
    ///
    /// The loaded flag is set and the loader detached before any row is
    /// fetched; on a load error the flag is reset so the caller can retry.
    pub fn ensure_loaded(&self) -> Result<()> {
        let loader = {
            let mut collection = self.write();
            if collection.loaded {
                return Ok(());
            }
            collection.loaded = true;
            collection.loader.take()
        };
        if let Some(loader) = loader {
            if let Err(err) = loader.load(self) {
                let mut collection = self.write();
                collection.loaded = false;
                collection.loader = Some(loader);
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    #[test]
    fn loaded_collection_serves_items_in_order() {
        let a = EntityRef::from_entity(Entity::new("Book"));
        let b = EntityRef::from_entity(Entity::new("Book"));
        let collection = CollectionRef::loaded(vec![a.clone(), b.clone()]);
        let items = collection.items().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].ptr_eq(&a));
        assert!(items[1].ptr_eq(&b));
    }

    #[test]
    fn push_appends_without_load() {
        let collection = CollectionRef::loaded(Vec::new());
        collection.push(EntityRef::from_entity(Entity::new("Book")));
        assert_eq!(collection.len().unwrap(), 1);
        assert!(!collection.is_empty().unwrap());
    }

    #[test]
    fn debug_reports_loaded_state_and_size() {
        let collection = CollectionRef::loaded(vec![EntityRef::from_entity(Entity::new("Book"))]);
        let text = format!("{collection:?}");
        assert!(text.contains("loaded: true"));
        assert!(text.contains("items: 1"));
    }
}
