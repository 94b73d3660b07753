//! Per-entity persister.
//!
//! The persister owns SQL execution for one entity: it builds the SELECT,
//! runs it on the session's connection, translates generated column aliases
//! back to real column names, and hands each row to the session's hydration
//! path.
//!
//! The persister is deliberately identity-map-agnostic: every `load_*` call
//! executes SQL. First-level caching against the identity map belongs to
//! [`crate::repository::Repository`].

use crate::entity::EntityRef;
use crate::session::SessionInner;
use relmap_core::{Error, Result, Row};
use relmap_meta::{AssociationMapping, EntityMetadata};
use relmap_query::{Criteria, OrderBy, SelectBuilder};
use std::sync::{Arc, Weak};

#[derive(Debug)]
pub struct Persister {
    metadata: Arc<EntityMetadata>,
    session: Weak<SessionInner>,
}

impl Persister {
    pub(crate) fn new(metadata: Arc<EntityMetadata>, session: Weak<SessionInner>) -> Self {
        Self { metadata, session }
    }

    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.metadata
    }

    fn session(&self) -> Result<Arc<SessionInner>> {
        self.session
            .upgrade()
            .ok_or_else(|| Error::usage("session has been dropped"))
    }

    /// Load at most one entity matching `criteria`. Always executes SQL.
    #[tracing::instrument(level = "debug", skip(self, criteria), fields(entity = %self.metadata.entity_name()))]
    pub fn load_one(&self, criteria: &Criteria) -> Result<Option<EntityRef>> {
        let session = self.session()?;
        let rows = self.fetch_rows(&session, criteria, None, &[])?;
        match rows.first() {
            Some(row) => session.hydrate_row(&self.metadata, row).map(Some),
            None => Ok(None),
        }
    }

    /// Load every entity matching `criteria`, in result order.
    #[tracing::instrument(level = "debug", skip(self, criteria, order), fields(entity = %self.metadata.entity_name()))]
    pub fn load_many(&self, criteria: &Criteria, order: &[OrderBy]) -> Result<Vec<EntityRef>> {
        let session = self.session()?;
        let rows = self.fetch_rows(&session, criteria, None, order)?;
        rows.iter()
            .map(|row| session.hydrate_row(&self.metadata, row))
            .collect()
    }

    /// Execute the generated SELECT and translate aliases back to columns.
    pub(crate) fn fetch_rows(
        &self,
        session: &Arc<SessionInner>,
        criteria: &Criteria,
        join: Option<&AssociationMapping>,
        order: &[OrderBy],
    ) -> Result<Vec<Row>> {
        let statement = SelectBuilder::build(&self.metadata, criteria, join, order)?;
        tracing::trace!(sql = %statement.sql, params = statement.params.len(), "executing select");
        let rows = session
            .connection()
            .query(&statement.sql, &statement.params)?;
        tracing::debug!(rows = rows.len(), "select returned");
        Ok(rows
            .iter()
            .map(|row| {
                row.renamed(|alias| statement.column_for_alias(alias).map(str::to_string))
            })
            .collect())
    }
}
