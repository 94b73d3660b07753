//! Core types for relmap.
//!
//! `relmap-core` is the **data plane**. It defines the dynamically typed
//! [`Value`], the [`Row`]/[`ColumnInfo`] result representation, the blocking
//! [`Connection`] collaborator trait, and the error taxonomy shared by every
//! other relmap crate.
//!
//! # Role In The Architecture
//!
//! - **Values**: every scalar an entity carries is a `Value`.
//! - **Rows**: query results, with `Arc`-shared column metadata.
//! - **Connection**: the seam to the external database driver.
//! - **Errors**: configuration, not-found, usage, and identity-conflict kinds.

pub mod connection;
pub mod error;
pub mod row;
pub mod value;

pub use connection::Connection;
pub use error::{
    ConfigError, Error, IdentityConflictError, NotFoundError, NotFoundKind, QueryError, Result,
    TypeError, UsageError,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
