//! Mapping metadata for relmap.
//!
//! `relmap-meta` is the **control plane**: it turns raw mapping records into
//! validated, fully-defaulted [`EntityMetadata`] that the query builder and
//! session plane consume.
//!
//! # Role In The Architecture
//!
//! - **Records**: loosely filled structs a [`MetadataDriver`] produces.
//! - **Completion**: `EntityMetadata` validates records and fills defaults
//!   (column names, join columns, join tables, load strategies).
//! - **Factory**: eager, fail-fast assembly with an `Arc`-shared cache.

pub mod driver;
pub mod entity;
pub mod factory;
pub mod mapping;

pub use driver::{DatabaseDriver, DatabaseDriverConfig, MetadataDriver, StaticDriver};
pub use entity::EntityMetadata;
pub use factory::MetadataFactory;
pub use mapping::{
    AssociationKind, AssociationMapping, AssociationRecord, DataType, EntityRecord, FieldMapping,
    FieldRecord, JoinColumn, JoinTable, LoadStrategy,
};
