//! Metadata factory.

use crate::driver::MetadataDriver;
use crate::entity::EntityMetadata;
use relmap_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Assembles and caches [`EntityMetadata`] for every mapped entity.
///
/// Assembly is eager and fail-fast: construction walks every entity the
/// driver knows and surfaces the first configuration error immediately, so a
/// published factory only ever serves valid metadata. Lookups after that are
/// cheap `Arc` clones.
#[derive(Debug)]
pub struct MetadataFactory {
    entity_names: Vec<String>,
    cache: HashMap<String, Arc<EntityMetadata>>,
}

impl MetadataFactory {
    /// Build metadata for every entity the driver reports.
    #[instrument(skip_all)]
    pub fn new(driver: &dyn MetadataDriver) -> Result<Self> {
        let entity_names = driver.entity_names()?;
        let mut cache = HashMap::with_capacity(entity_names.len());
        for name in &entity_names {
            let metadata = assemble(driver, name)?;
            debug!(
                entity = %name,
                fields = metadata.fields().len(),
                associations = metadata.associations().len(),
                "assembled entity metadata"
            );
            cache.insert(name.clone(), Arc::new(metadata));
        }
        Ok(Self {
            entity_names,
            cache,
        })
    }

    /// Names of every mapped entity, in driver order.
    pub fn entity_names(&self) -> &[String] {
        &self.entity_names
    }

    /// Metadata for one entity. Unknown names are a `NotFound` error and
    /// leave the cache untouched.
    pub fn entity_metadata(&self, entity_name: &str) -> Result<Arc<EntityMetadata>> {
        self.cache
            .get(entity_name)
            .cloned()
            .ok_or_else(|| Error::unknown_entity(entity_name))
    }

    pub fn has_entity(&self, entity_name: &str) -> bool {
        self.cache.contains_key(entity_name)
    }
}

fn assemble(driver: &dyn MetadataDriver, entity_name: &str) -> Result<EntityMetadata> {
    let record = driver.entity_record(entity_name)?;
    let mut metadata = EntityMetadata::from_record(&record)?;
    for field in driver.field_records(entity_name)? {
        metadata.add_field(field)?;
    }
    for association in driver.association_records(entity_name)? {
        metadata.add_association(association)?;
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::StaticDriver;
    use crate::mapping::{AssociationKind, AssociationRecord, FieldRecord};

    fn sample_driver() -> StaticDriver {
        StaticDriver::new()
            .entity("User", "users")
            .field("User", FieldRecord::named("id").identity())
            .field("User", FieldRecord::named("name"))
            .entity("Team", "teams")
            .field("Team", FieldRecord::named("id").identity())
            .association(
                "User",
                AssociationRecord::new("team", AssociationKind::OneToOne, "Team"),
            )
    }

    #[test]
    fn eager_assembly_and_cached_lookup() {
        let factory = MetadataFactory::new(&sample_driver()).unwrap();
        assert_eq!(factory.entity_names(), ["User", "Team"]);

        let first = factory.entity_metadata("User").unwrap();
        let second = factory.entity_metadata("User").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.table_name(), "users");
        assert!(first.has_association("team"));
    }

    #[test]
    fn unknown_entity_is_not_found() {
        let factory = MetadataFactory::new(&sample_driver()).unwrap();
        let err = factory.entity_metadata("Ghost").unwrap_err();
        assert!(err.is_not_found());
        assert!(!factory.has_entity("Ghost"));
    }

    #[test]
    fn construction_fails_fast_on_bad_mapping() {
        let driver = StaticDriver::new()
            .entity("User", "users")
            .field("User", FieldRecord::named("id"))
            .field("User", FieldRecord::named("id"));
        let err = MetadataFactory::new(&driver).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
