//! Lazy loading proxies.
//!
//! A proxy is an ordinary [`EntityRef`] whose entity is unloaded and carries
//! a [`ProxyLoader`]. The loader holds a weak session handle, so a proxy
//! that outlives its session fails with a usage error instead of keeping the
//! whole session graph alive.

use crate::collection::CollectionRef;
use crate::entity::{EntityRef, WeakEntityRef};
use crate::identity_map::IdentityKey;
use crate::session::SessionInner;
use relmap_core::{Error, Result, Value};
use relmap_query::Criteria;
use std::sync::Weak;

/// Builds unloaded entity shells bound to a session.
pub struct ProxyFactory {
    session: Weak<SessionInner>,
}

impl ProxyFactory {
    pub(crate) fn new(session: Weak<SessionInner>) -> Self {
        Self { session }
    }

    fn session(&self) -> Result<std::sync::Arc<SessionInner>> {
        self.session
            .upgrade()
            .ok_or_else(|| Error::usage("session has been dropped"))
    }

    /// An unloaded entity for `id`, with identifier fields pre-populated so
    /// identity access never triggers a load. Returns the already-registered
    /// instance when the identity map has one.
    pub fn proxy(&self, entity_name: &str, id: IdentityKey) -> Result<EntityRef> {
        self.session()?.proxy_ref(entity_name, id)
    }

    /// Detached copy of `source` with all scalar fields populated.
    ///
    /// The copy is not registered in the identity map. An unloaded source is
    /// resolved from the database; a missing row fails the same way a proxy
    /// load does.
    pub fn clone_detached(&self, source: &EntityRef) -> Result<EntityRef> {
        self.session()?.clone_detached(source)
    }
}

/// Deferred by-identity load bound to one entity shell.
pub struct ProxyLoader {
    pub(crate) session: Weak<SessionInner>,
    pub(crate) entity_name: String,
    pub(crate) identity: IdentityKey,
}

impl ProxyLoader {
    fn session(&self) -> Result<std::sync::Arc<SessionInner>> {
        self.session
            .upgrade()
            .ok_or_else(|| Error::usage("session has been dropped"))
    }

    /// Load the real row and fill the shell.
    ///
    /// The caller has already detached this loader from the entity, so a
    /// re-entrant access during the load observes no loader and cannot
    /// trigger a second execution. Zero rows is a referential integrity
    /// failure: something handed out an identity that does not exist.
    #[tracing::instrument(level = "debug", skip(self, target), fields(entity = %self.entity_name))]
    pub(crate) fn load(&self, target: &EntityRef) -> Result<()> {
        if target.is_loaded() {
            return Ok(());
        }
        let session = self.session()?;
        let metadata = session.metadata(&self.entity_name)?;
        let criteria = identity_criteria(metadata.identity_fields(), &self.identity)?;
        let persister = session.persister(&self.entity_name)?;
        let loaded = persister.load_one(&criteria)?.ok_or_else(|| {
            Error::missing_row(
                &self.entity_name,
                format!(
                    "no row for identity {:?} of entity '{}'",
                    self.identity.values(),
                    self.entity_name
                ),
            )
        })?;
        // Hydration found the registered shell and filled it in place. A
        // different instance can only come back if the shell was evicted
        // mid-load; copy its state across so the caller's handle is usable.
        if !loaded.ptr_eq(target) {
            copy_state(&loaded, target);
        }
        Ok(())
    }

    /// Fill `target` with the row's scalar fields, bypassing the identity
    /// map. Used by the detached-clone path.
    pub(crate) fn clone_into(&self, target: &EntityRef) -> Result<()> {
        let session = self.session()?;
        let metadata = session.metadata(&self.entity_name)?;
        let criteria = identity_criteria(metadata.identity_fields(), &self.identity)?;
        let persister = session.persister(&self.entity_name)?;
        let rows = persister.fetch_rows(&session, &criteria, None, &[])?;
        let row = rows.first().ok_or_else(|| {
            Error::missing_row(
                &self.entity_name,
                format!(
                    "no row for identity {:?} of entity '{}'",
                    self.identity.values(),
                    self.entity_name
                ),
            )
        })?;
        let mut entity = target.write();
        for field in metadata.fields() {
            entity.fields.insert(
                field.field_name.clone(),
                row.value(&field.column_name).cloned().unwrap_or(Value::Null),
            );
        }
        entity.identity = Some(self.identity.clone());
        entity.loaded = true;
        entity.loader = None;
        Ok(())
    }
}

/// Criteria selecting exactly the row for `identity`.
pub(crate) fn identity_criteria(
    identity_fields: &[String],
    identity: &IdentityKey,
) -> Result<Criteria> {
    if identity_fields.len() != identity.len() {
        return Err(Error::usage(format!(
            "identity has {} values but the entity declares {} identifier fields",
            identity.len(),
            identity_fields.len()
        )));
    }
    let mut criteria = Criteria::new();
    for (field, value) in identity_fields.iter().zip(identity.values()) {
        criteria.push(field.clone(), value.clone());
    }
    Ok(criteria)
}

fn copy_state(from: &EntityRef, to: &EntityRef) {
    let source = from.read();
    let mut target = to.write();
    target.fields = source.fields.clone();
    target.associations = source.associations.clone();
    target.identity = source.identity.clone();
    target.loaded = source.loaded;
    target.loader = None;
}

/// Deferred load for a to-many association.
///
/// Holds the owning entity weakly; a collection whose owner is gone cannot
/// be loaded and reports a usage error.
pub(crate) struct CollectionLoader {
    pub(crate) session: Weak<SessionInner>,
    pub(crate) owner: WeakEntityRef,
    pub(crate) owner_entity_name: String,
    pub(crate) field_name: String,
}

impl CollectionLoader {
    #[tracing::instrument(
        level = "debug",
        skip(self, collection),
        fields(entity = %self.owner_entity_name, field = %self.field_name)
    )]
    pub(crate) fn load(&self, collection: &CollectionRef) -> Result<()> {
        let session = self
            .session
            .upgrade()
            .ok_or_else(|| Error::usage("session has been dropped"))?;
        let owner = self
            .owner
            .upgrade()
            .ok_or_else(|| Error::usage("collection owner has been dropped"))?;
        session.populate_collection(collection, &owner, &self.owner_entity_name, &self.field_name)
    }
}
