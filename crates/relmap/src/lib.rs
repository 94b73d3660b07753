//! relmap - metadata-driven object-relational mapping for Rust.
//!
//! relmap maps database rows to dynamic entity instances described entirely
//! by runtime metadata: no derive macros, no per-entity structs. A
//! [`Session`] is one unit of work; within it the identity map guarantees a
//! single in-memory instance per entity identity, associations resolve
//! eagerly or through lazy proxies, and all SQL generation is deterministic.
//!
//! # Quick Start
//!
//! ```ignore
//! use relmap::prelude::*;
//!
//! // Describe the model in metadata records.
//! let driver = StaticDriver::new()
//!     .entity("User", "users")
//!     .field("User", FieldRecord::named("id").identity())
//!     .field("User", FieldRecord::named("name"))
//!     .entity("Team", "teams")
//!     .field("Team", FieldRecord::named("id").identity())
//!     .field("Team", FieldRecord::named("name"))
//!     .association(
//!         "User",
//!         AssociationRecord::new("team", AssociationKind::OneToOne, "Team"),
//!     );
//!
//! // One session per unit of work.
//! let session = Session::new(connection, &driver)?;
//!
//! let user = session
//!     .find_by_id("User", &IdentityKey::single(7))?
//!     .expect("no such user");
//! println!("{}", user.get("name")?);
//!
//! // Lazy association: the team row loads on first real access.
//! let team = user.related("team")?.expect("user has no team");
//! println!("{}", team.get("name")?);
//! ```
//!
//! Metadata can also live in database tables; see
//! [`DatabaseDriver`](relmap_meta::DatabaseDriver).

pub use relmap_core::{
    ColumnInfo, ConfigError, Connection, Error, FromValue, IdentityConflictError, NotFoundError,
    NotFoundKind, QueryError, Result, Row, TypeError, UsageError, Value,
};

pub use relmap_meta::{
    AssociationKind, AssociationMapping, AssociationRecord, DataType, DatabaseDriver,
    DatabaseDriverConfig, EntityMetadata, EntityRecord, FieldMapping, FieldRecord, JoinColumn,
    JoinTable, LoadStrategy, MetadataDriver, MetadataFactory, StaticDriver,
};

pub use relmap_query::{Criteria, OrderBy, OrderDirection, SelectBuilder, SelectStatement};

pub use relmap_session::{
    Association, CollectionRef, Entity, EntityRef, IdentityKey, IdentityMap, Persister,
    ProxyFactory, Repository, Session,
};

/// Common imports for working with relmap.
pub mod prelude {
    pub use crate::{
        Association, AssociationKind, AssociationRecord, CollectionRef, Connection, Criteria,
        EntityRecord, EntityRef, Error, FieldRecord, IdentityKey, LoadStrategy, MetadataFactory,
        OrderBy, Result, Row, Session, StaticDriver, Value,
    };
}
