//! Per-entity repository.
//!
//! The repository is the identity-map-aware query surface. `find_by_id`
//! answers from the session's identity map when it can; everything else
//! delegates to the [`Persister`], which always executes SQL. Keeping the
//! identity check here, and only here, is what lets the persister stay a
//! plain SQL executor.

use crate::entity::EntityRef;
use crate::identity_map::IdentityKey;
use crate::persister::Persister;
use crate::proxy::identity_criteria;
use crate::session::SessionInner;
use relmap_core::{Error, Result, Value};
use relmap_meta::EntityMetadata;
use relmap_query::{Criteria, OrderBy};
use std::sync::{Arc, Weak};
use tracing::debug;

#[derive(Debug)]
pub struct Repository {
    metadata: Arc<EntityMetadata>,
    persister: Arc<Persister>,
    session: Weak<SessionInner>,
}

impl Repository {
    pub(crate) fn new(
        metadata: Arc<EntityMetadata>,
        persister: Arc<Persister>,
        session: Weak<SessionInner>,
    ) -> Self {
        Self {
            metadata,
            persister,
            session,
        }
    }

    pub fn entity_name(&self) -> &str {
        self.metadata.entity_name()
    }

    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.metadata
    }

    fn session(&self) -> Result<Arc<SessionInner>> {
        self.session
            .upgrade()
            .ok_or_else(|| Error::usage("session has been dropped"))
    }

    /// Find by identity. The identity map answers first; a database miss is
    /// an absent value, not an error.
    #[tracing::instrument(level = "debug", skip(self, id), fields(entity = %self.metadata.entity_name()))]
    pub fn find_by_id(&self, id: &IdentityKey) -> Result<Option<EntityRef>> {
        let session = self.session()?;
        if let Some(existing) = session.identity_get(self.metadata.entity_name(), id) {
            debug!("identity map hit");
            return Ok(Some(existing));
        }
        let criteria = identity_criteria(self.metadata.identity_fields(), id)?;
        self.persister.load_one(&criteria)
    }

    /// At most one entity matching `criteria`.
    pub fn find_one(&self, criteria: &Criteria) -> Result<Option<EntityRef>> {
        self.persister.load_one(criteria)
    }

    /// All entities matching `criteria`, in result order.
    pub fn find_many(&self, criteria: &Criteria, order: &[OrderBy]) -> Result<Vec<EntityRef>> {
        self.persister.load_many(criteria, order)
    }

    /// Every row of the entity's table.
    pub fn find_all(&self) -> Result<Vec<EntityRef>> {
        self.persister.load_many(&Criteria::new(), &[])
    }

    /// One entity with `field` equal to `value`. The field must be a mapped
    /// field or association.
    pub fn find_one_by(&self, field: &str, value: impl Into<Value>) -> Result<Option<EntityRef>> {
        self.validate_key(field)?;
        self.find_one(&Criteria::new().with(field, value))
    }

    /// All entities with `field` equal to `value`.
    pub fn find_many_by(&self, field: &str, value: impl Into<Value>) -> Result<Vec<EntityRef>> {
        self.validate_key(field)?;
        self.find_many(&Criteria::new().with(field, value), &[])
    }

    fn validate_key(&self, field: &str) -> Result<()> {
        if self.metadata.has_field(field) || self.metadata.has_association(field) {
            Ok(())
        } else {
            Err(Error::usage(format!(
                "entity '{}' has no field or association '{field}'",
                self.metadata.entity_name()
            )))
        }
    }
}
