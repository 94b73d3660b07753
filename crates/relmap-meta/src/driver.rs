//! Metadata drivers.
//!
//! A driver answers three questions for the factory: which entities exist,
//! what scalar fields each one has, and what associations each one has. The
//! [`DatabaseDriver`] reads the answers from mapping tables over a
//! [`Connection`]; the [`StaticDriver`] serves records registered in code,
//! which is what most tests use.

use crate::mapping::{
    AssociationKind, AssociationRecord, DataType, EntityRecord, FieldRecord, LoadStrategy,
};
use relmap_core::{Connection, Error, Result, Row, Value};
use std::collections::HashMap;
use tracing::debug;

/// Source of raw mapping records.
pub trait MetadataDriver: Send + Sync {
    /// Names of every mapped entity.
    fn entity_names(&self) -> Result<Vec<String>>;

    /// The entity-level record for `entity_name`.
    fn entity_record(&self, entity_name: &str) -> Result<EntityRecord>;

    /// Scalar field records for `entity_name`, in declaration order.
    fn field_records(&self, entity_name: &str) -> Result<Vec<FieldRecord>>;

    /// Association records for `entity_name`, in declaration order.
    fn association_records(&self, entity_name: &str) -> Result<Vec<AssociationRecord>>;
}

/// Mapping-table names used by [`DatabaseDriver`].
#[derive(Debug, Clone)]
pub struct DatabaseDriverConfig {
    pub entity_table: String,
    pub field_table: String,
    pub association_table: String,
}

impl Default for DatabaseDriverConfig {
    fn default() -> Self {
        Self {
            entity_table: "fw_entity".to_string(),
            field_table: "fw_field".to_string(),
            association_table: "fw_association".to_string(),
        }
    }
}

/// Driver that reads mapping records from database tables.
pub struct DatabaseDriver<C: Connection> {
    connection: C,
    config: DatabaseDriverConfig,
}

impl<C: Connection> DatabaseDriver<C> {
    pub fn new(connection: C) -> Self {
        Self::with_config(connection, DatabaseDriverConfig::default())
    }

    pub fn with_config(connection: C, config: DatabaseDriverConfig) -> Self {
        Self { connection, config }
    }
}

impl<C: Connection> MetadataDriver for DatabaseDriver<C> {
    fn entity_names(&self) -> Result<Vec<String>> {
        let sql = format!("SELECT entity_name FROM {}", self.config.entity_table);
        debug!(sql = %sql, "loading entity names");
        let rows = self.connection.query(&sql, &[])?;
        rows.iter().map(|row| row.get::<String>("entity_name")).collect()
    }

    fn entity_record(&self, entity_name: &str) -> Result<EntityRecord> {
        let sql = format!(
            "SELECT entity_name, table_name FROM {} WHERE entity_name = ?",
            self.config.entity_table
        );
        let rows = self
            .connection
            .query(&sql, &[Value::Text(entity_name.to_string())])?;
        let row = rows
            .first()
            .ok_or_else(|| Error::unknown_entity(entity_name))?;
        Ok(EntityRecord {
            entity_name: row.get("entity_name")?,
            table_name: row.get("table_name")?,
        })
    }

    fn field_records(&self, entity_name: &str) -> Result<Vec<FieldRecord>> {
        let sql = format!(
            "SELECT field_name, column_name, data_type, data_length, default_value, is_identity \
             FROM {} WHERE entity_name = ?",
            self.config.field_table
        );
        let rows = self
            .connection
            .query(&sql, &[Value::Text(entity_name.to_string())])?;
        rows.iter()
            .map(|row| {
                Ok(FieldRecord {
                    field_name: row.get("field_name")?,
                    column_name: row.get("column_name")?,
                    data_type: row
                        .get::<Option<String>>("data_type")?
                        .map(|s| DataType::parse(&s)),
                    data_length: row
                        .get::<Option<i64>>("data_length")?
                        .and_then(|n| u32::try_from(n).ok()),
                    default_value: row.get("default_value")?,
                    identity: flag(row, "is_identity"),
                })
            })
            .collect()
    }

    fn association_records(&self, entity_name: &str) -> Result<Vec<AssociationRecord>> {
        let sql = format!(
            "SELECT field_name, kind, target_entity_name, mapped_by_field, inversed_by_field, \
             load_strategy, join_column_names, referenced_column_names, join_table_name, \
             is_identity FROM {} WHERE entity_name = ?",
            self.config.association_table
        );
        let rows = self
            .connection
            .query(&sql, &[Value::Text(entity_name.to_string())])?;
        rows.iter()
            .map(|row| {
                let field_name: String = row.get("field_name")?;
                let kind_raw: String = row.get("kind")?;
                let kind = AssociationKind::parse(&kind_raw).ok_or_else(|| {
                    Error::config(
                        entity_name,
                        format!("association '{field_name}' has unknown kind '{kind_raw}'"),
                    )
                })?;
                Ok(AssociationRecord {
                    field_name,
                    kind,
                    target_entity_name: row.get("target_entity_name")?,
                    source_entity_name: Some(entity_name.to_string()),
                    mapped_by: non_empty(row.get("mapped_by_field")?),
                    inversed_by: non_empty(row.get("inversed_by_field")?),
                    load: row
                        .get::<Option<String>>("load_strategy")?
                        .map(|s| LoadStrategy::parse(&s)),
                    join_columns: split_columns(row.get("join_column_names")?),
                    referenced_columns: split_columns(row.get("referenced_column_names")?),
                    join_table: non_empty(row.get("join_table_name")?),
                    identity: flag(row, "is_identity"),
                })
            })
            .collect()
    }
}

/// Read a boolean-ish flag column; integers, booleans, and "1"/"true" text
/// all count as set.
fn flag(row: &Row, name: &str) -> bool {
    match row.value(name) {
        Some(Value::Bool(b)) => *b,
        Some(v) => v.as_i64().is_some_and(|n| n != 0)
            || v.as_str()
                .is_some_and(|s| s == "1" || s.eq_ignore_ascii_case("true")),
        None => false,
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

/// Split a `,`-delimited column list, trimming whitespace.
fn split_columns(raw: Option<String>) -> Vec<String> {
    match raw {
        Some(s) if !s.trim().is_empty() => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Driver serving records registered in code.
#[derive(Default)]
pub struct StaticDriver {
    entities: Vec<EntityRecord>,
    fields: HashMap<String, Vec<FieldRecord>>,
    associations: HashMap<String, Vec<AssociationRecord>>,
}

impl StaticDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity.
    pub fn entity(mut self, entity_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        self.entities.push(EntityRecord {
            entity_name: entity_name.into(),
            table_name: table_name.into(),
        });
        self
    }

    /// Register a field record for an entity.
    pub fn field(mut self, entity_name: impl Into<String>, record: FieldRecord) -> Self {
        self.fields.entry(entity_name.into()).or_default().push(record);
        self
    }

    /// Register an association record for an entity.
    pub fn association(
        mut self,
        entity_name: impl Into<String>,
        record: AssociationRecord,
    ) -> Self {
        self.associations
            .entry(entity_name.into())
            .or_default()
            .push(record);
        self
    }
}

impl MetadataDriver for StaticDriver {
    fn entity_names(&self) -> Result<Vec<String>> {
        Ok(self.entities.iter().map(|e| e.entity_name.clone()).collect())
    }

    fn entity_record(&self, entity_name: &str) -> Result<EntityRecord> {
        self.entities
            .iter()
            .find(|e| e.entity_name == entity_name)
            .cloned()
            .ok_or_else(|| Error::unknown_entity(entity_name))
    }

    fn field_records(&self, entity_name: &str) -> Result<Vec<FieldRecord>> {
        Ok(self.fields.get(entity_name).cloned().unwrap_or_default())
    }

    fn association_records(&self, entity_name: &str) -> Result<Vec<AssociationRecord>> {
        Ok(self
            .associations
            .get(entity_name)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_columns_trims_and_drops_empties() {
        assert_eq!(
            split_columns(Some("a, b ,c".to_string())),
            vec!["a", "b", "c"]
        );
        assert_eq!(split_columns(Some("  ".to_string())), Vec::<String>::new());
        assert_eq!(split_columns(None), Vec::<String>::new());
    }

    #[test]
    fn flag_accepts_common_truthy_shapes() {
        let row = Row::new(
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            vec![
                Value::Bool(true),
                Value::Int(1),
                Value::Text("true".to_string()),
                Value::Int(0),
            ],
        );
        assert!(flag(&row, "a"));
        assert!(flag(&row, "b"));
        assert!(flag(&row, "c"));
        assert!(!flag(&row, "d"));
        assert!(!flag(&row, "missing"));
    }

    #[test]
    fn static_driver_round_trip() {
        let driver = StaticDriver::new()
            .entity("User", "users")
            .field("User", FieldRecord::named("id").identity())
            .association(
                "User",
                AssociationRecord::new("team", AssociationKind::OneToOne, "Team"),
            );

        assert_eq!(driver.entity_names().unwrap(), vec!["User"]);
        assert_eq!(driver.entity_record("User").unwrap().table_name, "users");
        assert_eq!(driver.field_records("User").unwrap().len(), 1);
        assert_eq!(driver.association_records("User").unwrap().len(), 1);
        assert!(driver.entity_record("Ghost").unwrap_err().is_not_found());
    }
}
