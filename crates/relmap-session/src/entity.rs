//! Dynamic entity instances.
//!
//! Entities are metadata-driven: a scalar field map plus an association map,
//! with no per-entity generated types. Access goes through the explicit
//! [`EntityRef`] capability interface (`get`, `set`, `related`,
//! `collection`); unknown names are usage errors rather than silent inserts.
//!
//! An unloaded entity is a proxy: its identifier fields are populated and a
//! [`ProxyLoader`] is bound. The first access to anything beyond the
//! identifier triggers the load, exactly once.

use crate::collection::CollectionRef;
use crate::identity_map::IdentityKey;
use crate::proxy::ProxyLoader;
use relmap_core::{Error, Result, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// An association slot on an entity instance.
#[derive(Clone)]
pub enum Association {
    /// To-one target; `None` for a NULL foreign key.
    One(Option<EntityRef>),
    /// To-many target collection.
    Many(CollectionRef),
}

/// One dynamic entity instance.
pub struct Entity {
    pub(crate) entity_name: String,
    pub(crate) loaded: bool,
    pub(crate) loader: Option<ProxyLoader>,
    pub(crate) identity: Option<IdentityKey>,
    pub(crate) fields: HashMap<String, Value>,
    pub(crate) associations: HashMap<String, Association>,
}

impl Entity {
    /// A fresh, loaded entity with no fields. Mainly for tests and manual
    /// construction; hydrated entities come from the session.
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            loaded: true,
            loader: None,
            identity: None,
            fields: HashMap::new(),
            associations: HashMap::new(),
        }
    }

    /// An unloaded shell awaiting hydration or proxy resolution.
    pub(crate) fn shell(entity_name: impl Into<String>, identity: IdentityKey) -> Self {
        Self {
            entity_name: entity_name.into(),
            loaded: false,
            loader: None,
            identity: Some(identity),
            fields: HashMap::new(),
            associations: HashMap::new(),
        }
    }
}

/// Shared handle to an [`Entity`].
///
/// All mutation happens through short-lived lock scopes; no lock is held
/// across a database call, so lazy loads may re-enter the entity safely.
#[derive(Clone)]
pub struct EntityRef(Arc<RwLock<Entity>>);

/// Weak counterpart used by collection loaders to refer back to the owner
/// without keeping it alive.
#[derive(Clone)]
pub struct WeakEntityRef(Weak<RwLock<Entity>>);

impl WeakEntityRef {
    pub fn upgrade(&self) -> Option<EntityRef> {
        self.0.upgrade().map(EntityRef)
    }
}

/// Summarized output; entity graphs can be cyclic, so fields and
/// associations are deliberately not printed.
impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(entity) => f
                .debug_struct("EntityRef")
                .field("entity", &entity.entity_name)
                .field("loaded", &entity.loaded)
                .field("identity", &entity.identity)
                .finish_non_exhaustive(),
            Err(_) => f.write_str("EntityRef(<locked>)"),
        }
    }
}

impl EntityRef {
    pub fn from_entity(entity: Entity) -> Self {
        Self(Arc::new(RwLock::new(entity)))
    }

    pub fn downgrade(&self) -> WeakEntityRef {
        WeakEntityRef(Arc::downgrade(&self.0))
    }

    /// Instance identity: true when both handles point at the same entity.
    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Entity> {
        self.0.read().expect("lock poisoned")
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Entity> {
        self.0.write().expect("lock poisoned")
    }

    pub fn entity_name(&self) -> String {
        self.read().entity_name.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.read().loaded
    }

    /// The identity this instance is registered under, if known.
    pub fn identity(&self) -> Option<IdentityKey> {
        self.read().identity.clone()
    }

    /// Read a scalar field.
    ///
    /// On an unloaded proxy, identifier fields answer directly; any other
    /// field triggers the bound loader first.
    pub fn get(&self, field: &str) -> Result<Value> {
        {
            let entity = self.read();
            if let Some(value) = entity.fields.get(field) {
                return Ok(value.clone());
            }
            if entity.associations.contains_key(field) {
                return Err(association_not_scalar(&entity.entity_name, field));
            }
            if entity.loaded {
                return Err(unknown_member(&entity.entity_name, field));
            }
        }
        self.ensure_loaded()?;
        let entity = self.read();
        match entity.fields.get(field) {
            Some(value) => Ok(value.clone()),
            None if entity.associations.contains_key(field) => {
                Err(association_not_scalar(&entity.entity_name, field))
            }
            None => Err(unknown_member(&entity.entity_name, field)),
        }
    }

    /// Write a scalar field. The field must exist on the (loaded) entity.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        {
            let mut entity = self.write();
            if entity.fields.contains_key(field) && entity.loaded {
                entity.fields.insert(field.to_string(), value);
                return Ok(());
            }
            if entity.associations.contains_key(field) {
                return Err(association_not_scalar(&entity.entity_name, field));
            }
            if entity.loaded {
                return Err(unknown_member(&entity.entity_name, field));
            }
        }
        self.ensure_loaded()?;
        let mut entity = self.write();
        if entity.fields.contains_key(field) {
            entity.fields.insert(field.to_string(), value);
            Ok(())
        } else if entity.associations.contains_key(field) {
            Err(association_not_scalar(&entity.entity_name, field))
        } else {
            Err(unknown_member(&entity.entity_name, field))
        }
    }

    /// Resolve a to-one association.
    pub fn related(&self, field: &str) -> Result<Option<EntityRef>> {
        {
            let entity = self.read();
            match entity.associations.get(field) {
                Some(Association::One(target)) => return Ok(target.clone()),
                Some(Association::Many(_)) => {
                    return Err(collection_not_to_one(&entity.entity_name, field));
                }
                None if entity.loaded => {
                    return Err(unknown_member(&entity.entity_name, field));
                }
                None => {}
            }
        }
        self.ensure_loaded()?;
        let entity = self.read();
        match entity.associations.get(field) {
            Some(Association::One(target)) => Ok(target.clone()),
            Some(Association::Many(_)) => Err(collection_not_to_one(&entity.entity_name, field)),
            None => Err(unknown_member(&entity.entity_name, field)),
        }
    }

    /// Resolve a to-many association.
    pub fn collection(&self, field: &str) -> Result<CollectionRef> {
        {
            let entity = self.read();
            match entity.associations.get(field) {
                Some(Association::Many(collection)) => return Ok(collection.clone()),
                Some(Association::One(_)) => {
                    return Err(to_one_not_collection(&entity.entity_name, field));
                }
                None if entity.loaded => {
                    return Err(unknown_member(&entity.entity_name, field));
                }
                None => {}
            }
        }
        self.ensure_loaded()?;
        let entity = self.read();
        match entity.associations.get(field) {
            Some(Association::Many(collection)) => Ok(collection.clone()),
            Some(Association::One(_)) => Err(to_one_not_collection(&entity.entity_name, field)),
            None => Err(unknown_member(&entity.entity_name, field)),
        }
    }

    /// Run the bound loader once, if any.
    ///
    /// The loader is detached before it runs, so re-entrant access during
    /// the load can never trigger it a second time.
    pub fn ensure_loaded(&self) -> Result<()> {
        let loader = {
            let mut entity = self.write();
            if entity.loaded {
                return Ok(());
            }
            entity.loader.take()
        };
        match loader {
            Some(loader) => loader.load(self),
            None => Ok(()),
        }
    }
}

fn unknown_member(entity_name: &str, field: &str) -> Error {
    Error::usage(format!(
        "entity '{entity_name}' has no field or association '{field}'"
    ))
}

fn association_not_scalar(entity_name: &str, field: &str) -> Error {
    Error::usage(format!(
        "'{field}' on entity '{entity_name}' is an association; use related() or collection()"
    ))
}

fn collection_not_to_one(entity_name: &str, field: &str) -> Error {
    Error::usage(format!(
        "'{field}' on entity '{entity_name}' is a collection; use collection()"
    ))
}

fn to_one_not_collection(entity_name: &str, field: &str) -> Error {
    Error::usage(format!(
        "'{field}' on entity '{entity_name}' is a to-one association; use related()"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_user() -> EntityRef {
        let mut entity = Entity::new("User");
        entity.fields.insert("id".to_string(), Value::Int(7));
        entity
            .fields
            .insert("name".to_string(), Value::Text("Ada".to_string()));
        entity
            .associations
            .insert("team".to_string(), Association::One(None));
        EntityRef::from_entity(entity)
    }

    #[test]
    fn get_and_set_known_fields() {
        let user = loaded_user();
        assert_eq!(user.get("id").unwrap(), Value::Int(7));
        user.set("name", "Grace").unwrap();
        assert_eq!(user.get("name").unwrap(), Value::Text("Grace".to_string()));
    }

    #[test]
    fn unknown_member_is_usage_error() {
        let user = loaded_user();
        assert!(matches!(user.get("nope").unwrap_err(), Error::Usage(_)));
        assert!(matches!(user.set("nope", 1).unwrap_err(), Error::Usage(_)));
        assert!(matches!(user.related("nope").unwrap_err(), Error::Usage(_)));
    }

    #[test]
    fn association_accessors_reject_wrong_shape() {
        let user = loaded_user();
        assert!(matches!(user.get("team").unwrap_err(), Error::Usage(_)));
        assert!(matches!(
            user.collection("team").unwrap_err(),
            Error::Usage(_)
        ));
        assert!(user.related("team").unwrap().is_none());
    }

    #[test]
    fn debug_output_names_the_entity() {
        let user = loaded_user();
        let text = format!("{user:?}");
        assert!(text.contains("User"));
        assert!(text.contains("loaded"));
    }

    #[test]
    fn shell_answers_identifier_without_loading() {
        let mut shell = Entity::shell("User", IdentityKey::single(7));
        shell.fields.insert("id".to_string(), Value::Int(7));
        let shell = EntityRef::from_entity(shell);
        assert!(!shell.is_loaded());
        assert_eq!(shell.get("id").unwrap(), Value::Int(7));
        assert!(!shell.is_loaded());
    }

    #[test]
    fn shell_without_loader_reports_unknown_after_ensure() {
        let mut shell = Entity::shell("User", IdentityKey::single(7));
        shell.fields.insert("id".to_string(), Value::Int(7));
        let shell = EntityRef::from_entity(shell);
        assert!(matches!(shell.get("name").unwrap_err(), Error::Usage(_)));
    }
}
