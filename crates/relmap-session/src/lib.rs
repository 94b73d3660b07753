//! Session plane for relmap.
//!
//! This crate holds everything that lives for one unit of work: dynamic
//! [`Entity`] instances behind [`EntityRef`] handles, lazy [`CollectionRef`]s,
//! the [`IdentityMap`], per-entity [`Persister`]s and [`Repository`]s, the
//! proxy layer, and the [`Session`] that ties them together.
//!
//! # Role In The Architecture
//!
//! - **Identity**: one in-memory instance per `(entity, identity)` per
//!   session, enforced by the repository layer against the identity map.
//! - **Laziness**: unloaded entities and collections carry loaders bound to
//!   the session through weak handles; each loader runs at most once.
//! - **Hydration**: registration-before-population breaks cyclic entity
//!   graphs.

pub mod collection;
pub mod entity;
pub mod identity_map;
pub mod persister;
pub mod proxy;
pub mod repository;
pub mod session;

pub use collection::CollectionRef;
pub use entity::{Association, Entity, EntityRef, WeakEntityRef};
pub use identity_map::{IdentityKey, IdentityMap};
pub use persister::Persister;
pub use proxy::ProxyFactory;
pub use repository::Repository;
pub use session::Session;
