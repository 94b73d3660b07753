//! Database connection trait.
//!
//! The database is an external collaborator: relmap never opens sockets or
//! speaks a wire protocol itself. Anything that can execute parameterized
//! SQL (positional `?` placeholders) and return ordered rows can back a
//! session. All calls are blocking request/response; a session issues them
//! from one unit of work at a time.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A blocking database connection.
///
/// Implementations take shared `&self` so one connection can back every
/// persister of a session; interior synchronization, if any, is the
/// implementor's concern.
pub trait Connection: Send + Sync {
    /// Execute a SELECT-style statement and return all result rows in order.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a non-returning statement, yielding the affected row count.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;
}

impl<C: Connection + ?Sized> Connection for std::sync::Arc<C> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }
}
