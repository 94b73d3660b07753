//! SQL generation for relmap.
//!
//! `relmap-query` turns [`EntityMetadata`](relmap_meta::EntityMetadata) plus
//! [`Criteria`] into parameterized SELECT statements. Generation is
//! deterministic: fresh alias numbering per statement, criteria rendered in
//! insertion order, parameters collected in condition order.

pub mod clause;
pub mod select;

pub use clause::{Criteria, OrderBy, OrderDirection};
pub use select::{SelectBuilder, SelectStatement};
