//! The session: one unit of work against one connection.
//!
//! The session owns the shared [`Connection`], the [`MetadataFactory`], the
//! [`IdentityMap`], and per-entity persister/repository caches. Hydration
//! lives here because it is the point where rows, metadata, the identity
//! map, and the proxy layer meet.
//!
//! # Role In The Architecture
//!
//! - **Entry points**: `find_by_id`, `find_one`, `find_many`, `find_all`,
//!   `proxy`, `metadata`, identity-map passthroughs.
//! - **Hydration**: rows become entities, registered in the identity map
//!   *before* association population so cyclic graphs terminate.
//! - **Weak handles**: proxies and collection loaders hold `Weak` references
//!   to the inner state, so an abandoned session is reclaimed even while
//!   detached entity handles survive.

use crate::collection::CollectionRef;
use crate::entity::{Association, Entity, EntityRef};
use crate::identity_map::{IdentityKey, IdentityMap};
use crate::persister::Persister;
use crate::proxy::{CollectionLoader, ProxyFactory, ProxyLoader};
use crate::repository::Repository;
use relmap_core::{Connection, Error, Result, Row, Value};
use relmap_meta::{
    AssociationKind, AssociationMapping, EntityMetadata, LoadStrategy, MetadataDriver,
    MetadataFactory,
};
use relmap_query::{Criteria, OrderBy};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// One unit of work: a connection, its metadata, and an identity map.
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    connection: Arc<dyn Connection>,
    metadata_factory: MetadataFactory,
    identity_map: RwLock<IdentityMap>,
    persisters: RwLock<HashMap<String, Arc<Persister>>>,
    repositories: RwLock<HashMap<String, Arc<Repository>>>,
}

impl Session {
    /// Build a session, assembling metadata from `driver` eagerly.
    pub fn new(connection: Arc<dyn Connection>, driver: &dyn MetadataDriver) -> Result<Self> {
        Ok(Self::with_factory(connection, MetadataFactory::new(driver)?))
    }

    /// Build a session around an already-assembled factory.
    pub fn with_factory(connection: Arc<dyn Connection>, factory: MetadataFactory) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                connection,
                metadata_factory: factory,
                identity_map: RwLock::new(IdentityMap::new()),
                persisters: RwLock::new(HashMap::new()),
                repositories: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Metadata for one entity; unknown names are `NotFound`.
    pub fn metadata(&self, entity_name: &str) -> Result<Arc<EntityMetadata>> {
        self.inner.metadata(entity_name)
    }

    /// Every mapped entity name.
    pub fn entity_names(&self) -> &[String] {
        self.inner.metadata_factory.entity_names()
    }

    /// The repository for one entity.
    pub fn repository(&self, entity_name: &str) -> Result<Arc<Repository>> {
        self.inner.repository(entity_name)
    }

    /// The persister for one entity. Persister loads always execute SQL;
    /// prefer the repository for identity-map-aware lookups.
    pub fn persister(&self, entity_name: &str) -> Result<Arc<Persister>> {
        self.inner.persister(entity_name)
    }

    /// Find by identity, consulting the identity map first.
    pub fn find_by_id(&self, entity_name: &str, id: &IdentityKey) -> Result<Option<EntityRef>> {
        self.repository(entity_name)?.find_by_id(id)
    }

    /// Find at most one entity matching `criteria`.
    pub fn find_one(&self, entity_name: &str, criteria: &Criteria) -> Result<Option<EntityRef>> {
        self.repository(entity_name)?.find_one(criteria)
    }

    /// Find all entities matching `criteria`, in result order.
    pub fn find_many(
        &self,
        entity_name: &str,
        criteria: &Criteria,
        order: &[OrderBy],
    ) -> Result<Vec<EntityRef>> {
        self.repository(entity_name)?.find_many(criteria, order)
    }

    /// Every row of the entity's table.
    pub fn find_all(&self, entity_name: &str) -> Result<Vec<EntityRef>> {
        self.repository(entity_name)?.find_all()
    }

    /// An unloaded proxy for `id`, or the already-registered instance.
    pub fn proxy(&self, entity_name: &str, id: IdentityKey) -> Result<EntityRef> {
        self.inner.proxy_ref(entity_name, id)
    }

    /// A proxy factory bound to this session.
    pub fn proxy_factory(&self) -> ProxyFactory {
        ProxyFactory::new(Arc::downgrade(&self.inner))
    }

    /// Whether this identity is tracked by the session.
    pub fn contains(&self, entity_name: &str, id: &IdentityKey) -> bool {
        self.inner.identity_map().contains(entity_name, id)
    }

    /// Drop one tracked instance; true when something was evicted.
    pub fn evict(&self, entity_name: &str, id: &IdentityKey) -> bool {
        self.inner
            .identity_map
            .write()
            .expect("lock poisoned")
            .remove(entity_name, id)
    }

    /// Forget every tracked instance.
    pub fn clear(&self) {
        self.inner
            .identity_map
            .write()
            .expect("lock poisoned")
            .clear();
    }

    /// Number of tracked instances.
    pub fn tracked_count(&self) -> usize {
        self.inner.identity_map().len()
    }
}

impl SessionInner {
    pub(crate) fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub(crate) fn metadata(&self, entity_name: &str) -> Result<Arc<EntityMetadata>> {
        self.metadata_factory.entity_metadata(entity_name)
    }

    fn identity_map(&self) -> std::sync::RwLockReadGuard<'_, IdentityMap> {
        self.identity_map.read().expect("lock poisoned")
    }

    pub(crate) fn identity_get(&self, entity_name: &str, key: &IdentityKey) -> Option<EntityRef> {
        self.identity_map().get(entity_name, key)
    }

    pub(crate) fn persister(self: &Arc<Self>, entity_name: &str) -> Result<Arc<Persister>> {
        if let Some(persister) = self
            .persisters
            .read()
            .expect("lock poisoned")
            .get(entity_name)
        {
            return Ok(Arc::clone(persister));
        }
        let metadata = self.metadata(entity_name)?;
        let persister = Arc::new(Persister::new(metadata, Arc::downgrade(self)));
        Ok(Arc::clone(
            self.persisters
                .write()
                .expect("lock poisoned")
                .entry(entity_name.to_string())
                .or_insert(persister),
        ))
    }

    pub(crate) fn repository(self: &Arc<Self>, entity_name: &str) -> Result<Arc<Repository>> {
        if let Some(repository) = self
            .repositories
            .read()
            .expect("lock poisoned")
            .get(entity_name)
        {
            return Ok(Arc::clone(repository));
        }
        let metadata = self.metadata(entity_name)?;
        let persister = self.persister(entity_name)?;
        let repository = Arc::new(Repository::new(metadata, persister, Arc::downgrade(self)));
        Ok(Arc::clone(
            self.repositories
                .write()
                .expect("lock poisoned")
                .entry(entity_name.to_string())
                .or_insert(repository),
        ))
    }

    /// Build (or retrieve) an unloaded proxy shell for `id` and register it.
    pub(crate) fn proxy_ref(
        self: &Arc<Self>,
        entity_name: &str,
        id: IdentityKey,
    ) -> Result<EntityRef> {
        let metadata = self.metadata(entity_name)?;
        if metadata.identity_fields().len() != id.len() {
            return Err(Error::usage(format!(
                "identity has {} values but entity '{entity_name}' declares {} identifier fields",
                id.len(),
                metadata.identity_fields().len()
            )));
        }
        if let Some(existing) = self.identity_get(entity_name, &id) {
            return Ok(existing);
        }

        let mut entity = Entity::shell(entity_name, id.clone());
        for (field, value) in metadata.identity_fields().iter().zip(id.values()) {
            entity.fields.insert(field.clone(), value.clone());
        }
        entity.loader = Some(ProxyLoader {
            session: Arc::downgrade(self),
            entity_name: entity_name.to_string(),
            identity: id.clone(),
        });
        let entity_ref = EntityRef::from_entity(entity);

        let mut map = self.identity_map.write().expect("lock poisoned");
        if let Some(existing) = map.get(entity_name, &id) {
            return Ok(existing);
        }
        map.insert(entity_name, id, entity_ref.clone())?;
        debug!(entity = entity_name, "registered proxy shell");
        Ok(entity_ref)
    }

    /// Detached full copy of `source`, never registered in the identity map.
    pub(crate) fn clone_detached(self: &Arc<Self>, source: &EntityRef) -> Result<EntityRef> {
        let entity_name = source.entity_name();
        if source.is_loaded() {
            let guard = source.read();
            let mut copy = Entity::new(&entity_name);
            copy.fields = guard.fields.clone();
            copy.associations = guard.associations.clone();
            copy.identity = guard.identity.clone();
            drop(guard);
            return Ok(EntityRef::from_entity(copy));
        }
        let identity = source
            .identity()
            .ok_or_else(|| Error::usage("unloaded entity carries no identity to clone from"))?;
        let metadata = self.metadata(&entity_name)?;
        let mut copy = Entity::shell(&entity_name, identity.clone());
        for (field, value) in metadata.identity_fields().iter().zip(identity.values()) {
            copy.fields.insert(field.clone(), value.clone());
        }
        let copy_ref = EntityRef::from_entity(copy);
        let loader = ProxyLoader {
            session: Arc::downgrade(self),
            entity_name,
            identity,
        };
        loader.clone_into(&copy_ref)?;
        Ok(copy_ref)
    }

    /// Turn one translated result row into a tracked entity.
    ///
    /// An existing loaded instance wins over the fetched row; an existing
    /// unloaded shell is filled in place; otherwise a fresh shell is
    /// registered *before* any field or association is populated. Scalars
    /// land and the instance is marked loaded before its associations
    /// populate, so a cyclic eager graph re-entering this path gets the
    /// in-progress instance back instead of recursing.
    pub(crate) fn hydrate_row(
        self: &Arc<Self>,
        metadata: &Arc<EntityMetadata>,
        row: &Row,
    ) -> Result<EntityRef> {
        let entity_name = metadata.entity_name();
        let key = identity_from_row(metadata, row)?;

        let existing = self.identity_get(entity_name, &key);
        let entity_ref = match existing {
            Some(entity) if entity.is_loaded() => return Ok(entity),
            Some(entity) => entity,
            None => {
                let shell = EntityRef::from_entity(Entity::shell(entity_name, key.clone()));
                let mut map = self.identity_map.write().expect("lock poisoned");
                match map.get(entity_name, &key) {
                    Some(raced) if raced.is_loaded() => return Ok(raced),
                    Some(raced) => raced,
                    None => {
                        map.insert(entity_name, key.clone(), shell.clone())?;
                        shell
                    }
                }
            }
        };

        {
            let mut entity = entity_ref.write();
            for field in metadata.fields() {
                entity.fields.insert(
                    field.field_name.clone(),
                    row.value(&field.column_name).cloned().unwrap_or(Value::Null),
                );
            }
            entity.identity = Some(key);
            // Loaded flips before association population; re-entrant
            // hydration of the same row must take the early return above.
            entity.loaded = true;
            entity.loader = None;
        }

        for assoc in metadata.associations() {
            self.populate_association(metadata, assoc, &entity_ref, row)?;
        }
        debug!(entity = entity_name, "hydrated entity");
        Ok(entity_ref)
    }

    fn populate_association(
        self: &Arc<Self>,
        owner_meta: &Arc<EntityMetadata>,
        assoc: &AssociationMapping,
        owner: &EntityRef,
        row: &Row,
    ) -> Result<()> {
        match assoc.kind {
            AssociationKind::OneToOne => {
                let target = if assoc.owning {
                    self.resolve_owning_to_one(owner_meta, assoc, row)?
                } else {
                    self.resolve_inverse_to_one(owner_meta, assoc, owner)?
                };
                owner
                    .write()
                    .associations
                    .insert(assoc.field_name.clone(), Association::One(target));
            }
            AssociationKind::OneToMany | AssociationKind::ManyToMany => {
                if assoc.load == LoadStrategy::Eager {
                    let collection = CollectionRef::loaded(Vec::new());
                    owner.write().associations.insert(
                        assoc.field_name.clone(),
                        Association::Many(collection.clone()),
                    );
                    self.populate_collection(
                        &collection,
                        owner,
                        owner_meta.entity_name(),
                        &assoc.field_name,
                    )?;
                } else {
                    let loader = CollectionLoader {
                        session: Arc::downgrade(self),
                        owner: owner.downgrade(),
                        owner_entity_name: owner_meta.entity_name().to_string(),
                        field_name: assoc.field_name.clone(),
                    };
                    owner.write().associations.insert(
                        assoc.field_name.clone(),
                        Association::Many(CollectionRef::lazy(loader)),
                    );
                }
            }
        }
        Ok(())
    }

    /// Owning to-one: the foreign key is in the row.
    fn resolve_owning_to_one(
        self: &Arc<Self>,
        owner_meta: &Arc<EntityMetadata>,
        assoc: &AssociationMapping,
        row: &Row,
    ) -> Result<Option<EntityRef>> {
        let fk: Vec<Value> = assoc
            .join_columns
            .iter()
            .map(|jc| row.value(&jc.name).cloned().unwrap_or(Value::Null))
            .collect();
        if fk.iter().all(Value::is_null) {
            return Ok(None);
        }
        let key = IdentityKey::new(fk);
        match assoc.load {
            LoadStrategy::Eager => {
                let repository = self.repository(&assoc.target_entity_name)?;
                let target = repository.find_by_id(&key)?.ok_or_else(|| {
                    Error::missing_association_target(
                        &assoc.target_entity_name,
                        format!(
                            "'{}.{}' references a '{}' row that does not exist",
                            owner_meta.entity_name(),
                            assoc.field_name,
                            assoc.target_entity_name
                        ),
                    )
                })?;
                Ok(Some(target))
            }
            LoadStrategy::Lazy => Ok(Some(self.proxy_ref(&assoc.target_entity_name, key)?)),
        }
    }

    /// Inverse to-one: look up the owning mapping on the target and query by
    /// the back-reference columns. Resolved eagerly regardless of the
    /// declared strategy.
    fn resolve_inverse_to_one(
        self: &Arc<Self>,
        owner_meta: &Arc<EntityMetadata>,
        assoc: &AssociationMapping,
        owner: &EntityRef,
    ) -> Result<Option<EntityRef>> {
        let owning = self.owning_side_of(owner_meta, assoc)?;
        if owning.kind != AssociationKind::OneToOne || !owning.owning {
            return Err(Error::config(
                owner_meta.entity_name(),
                format!(
                    "inverse association '{}' maps to '{}.{}', which is not an owning to-one mapping",
                    assoc.field_name, assoc.target_entity_name, owning.field_name
                ),
            ));
        }
        let mut criteria = Criteria::new();
        for (join_column, referenced_column) in &owning.source_to_target_columns {
            let value = owner_value_for_column(owner, owner_meta, referenced_column)?;
            criteria.push(join_column.clone(), value);
        }
        self.persister(&assoc.target_entity_name)?.load_one(&criteria)
    }

    /// Fetch and append every item of a to-many association.
    ///
    /// The collection is already marked loaded by the caller; items are
    /// appended one by one as their rows hydrate.
    pub(crate) fn populate_collection(
        self: &Arc<Self>,
        collection: &CollectionRef,
        owner: &EntityRef,
        owner_entity_name: &str,
        field_name: &str,
    ) -> Result<()> {
        let owner_meta = self.metadata(owner_entity_name)?;
        let assoc = owner_meta.association(field_name).ok_or_else(|| {
            Error::usage(format!(
                "entity '{owner_entity_name}' has no association '{field_name}'"
            ))
        })?;
        match assoc.kind {
            AssociationKind::OneToMany => {
                let owning = self.owning_side_of(&owner_meta, assoc)?;
                if !owning.owning || owning.kind != AssociationKind::OneToOne {
                    return Err(Error::config(
                        owner_entity_name,
                        format!(
                            "one-to-many '{field_name}' maps to '{}.{}', which is not an owning to-one mapping",
                            assoc.target_entity_name, owning.field_name
                        ),
                    ));
                }
                let mut criteria = Criteria::new();
                for (join_column, referenced_column) in &owning.source_to_target_columns {
                    let value = owner_value_for_column(owner, &owner_meta, referenced_column)?;
                    criteria.push(join_column.clone(), value);
                }
                let persister = self.persister(&assoc.target_entity_name)?;
                let rows = persister.fetch_rows(self, &criteria, None, &[])?;
                let target_meta = Arc::clone(persister.metadata());
                for row in &rows {
                    collection.push(self.hydrate_row(&target_meta, row)?);
                }
            }
            AssociationKind::ManyToMany => {
                let mapping = if assoc.owning {
                    assoc.clone()
                } else {
                    // The join table relates to us through the owning side's
                    // target columns; flip the mapping so the generated join
                    // targets our side correctly.
                    let mut flipped = self.owning_side_of(&owner_meta, assoc)?;
                    std::mem::swap(
                        &mut flipped.relation_to_source_columns,
                        &mut flipped.relation_to_target_columns,
                    );
                    flipped
                };
                let table = mapping.join_table.as_ref().ok_or_else(|| {
                    Error::config(
                        owner_entity_name,
                        format!("many-to-many '{field_name}' has no join table"),
                    )
                })?;
                let mut criteria = Criteria::new();
                for (relation_column, source_column) in &mapping.relation_to_source_columns {
                    let value = owner_value_for_column(owner, &owner_meta, source_column)?;
                    criteria.push(format!("{}.{relation_column}", table.name), value);
                }
                let persister = self.persister(&assoc.target_entity_name)?;
                let rows = persister.fetch_rows(self, &criteria, Some(&mapping), &[])?;
                let target_meta = Arc::clone(persister.metadata());
                for row in &rows {
                    collection.push(self.hydrate_row(&target_meta, row)?);
                }
            }
            AssociationKind::OneToOne => {
                return Err(Error::usage(format!(
                    "'{field_name}' on entity '{owner_entity_name}' is a to-one association"
                )));
            }
        }
        Ok(())
    }

    /// Resolve the owning mapping behind an inverse association.
    fn owning_side_of(
        &self,
        owner_meta: &Arc<EntityMetadata>,
        assoc: &AssociationMapping,
    ) -> Result<AssociationMapping> {
        if assoc.owning && assoc.kind != AssociationKind::OneToMany {
            return Ok(assoc.clone());
        }
        let mapped_by = assoc.mapped_by.as_deref().ok_or_else(|| {
            Error::config(
                owner_meta.entity_name(),
                format!(
                    "inverse association '{}' is missing its mapped_by field",
                    assoc.field_name
                ),
            )
        })?;
        let target_meta = self.metadata(&assoc.target_entity_name)?;
        target_meta
            .association(mapped_by)
            .cloned()
            .ok_or_else(|| {
                Error::config(
                    &assoc.target_entity_name,
                    format!(
                        "'{}.{}' names mapped_by '{mapped_by}', which does not exist on '{}'",
                        owner_meta.entity_name(),
                        assoc.field_name,
                        assoc.target_entity_name
                    ),
                )
            })
    }
}

/// Extract the identity from a translated row, positionally per the
/// declared identifier order. Foreign identity fields resolve through the
/// association's join column.
fn identity_from_row(metadata: &EntityMetadata, row: &Row) -> Result<IdentityKey> {
    let mut values = Vec::with_capacity(metadata.identity_fields().len());
    for field in metadata.identity_fields() {
        let column = metadata.column_name(field);
        let value = row.value(column).cloned().ok_or_else(|| {
            Error::Custom(format!(
                "result row for entity '{}' is missing identity column '{column}'",
                metadata.entity_name()
            ))
        })?;
        values.push(value);
    }
    if values.is_empty() {
        return Err(Error::usage(format!(
            "entity '{}' declares no identity field",
            metadata.entity_name()
        )));
    }
    Ok(IdentityKey::new(values))
}

/// An entity's value for one of its own columns.
///
/// Identity columns answer from the identity key, which also covers foreign
/// identities whose value never appears as a scalar field.
fn owner_value_for_column(
    owner: &EntityRef,
    metadata: &EntityMetadata,
    column: &str,
) -> Result<Value> {
    let identity_columns = metadata.identity_columns();
    if let Some(position) = identity_columns.iter().position(|c| *c == column) {
        if let Some(identity) = owner.identity() {
            return Ok(identity.values()[position].clone());
        }
    }
    let field = metadata.field_for_column(column);
    let guard = owner.read();
    guard.fields.get(field).cloned().ok_or_else(|| {
        Error::usage(format!(
            "entity '{}' carries no value for column '{column}'",
            metadata.entity_name()
        ))
    })
}
