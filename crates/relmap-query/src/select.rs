//! SELECT statement generation.
//!
//! Every build starts from a fresh [`AliasContext`], so alias numbering is a
//! pure function of the metadata and never leaks between statements. Scalar
//! columns and owning to-one join columns are selected with generated
//! aliases; the statement's column index maps each alias back to its
//! underlying column so result rows can be translated before hydration.

use crate::clause::{Criteria, OrderBy};
use relmap_core::{Error, Result, Value};
use relmap_meta::{AssociationKind, AssociationMapping, EntityMetadata};
use std::collections::HashMap;

/// A generated SELECT with its positional parameters and alias index.
#[derive(Debug, Clone)]
pub struct SelectStatement {
    pub sql: String,
    pub params: Vec<Value>,
    /// Generated column alias -> underlying column name.
    column_index: HashMap<String, String>,
}

impl SelectStatement {
    /// Underlying column for a generated alias, if any.
    pub fn column_for_alias(&self, alias: &str) -> Option<&str> {
        self.column_index.get(alias).map(String::as_str)
    }

    pub fn column_index(&self) -> &HashMap<String, String> {
        &self.column_index
    }
}

/// Per-build alias allocator.
///
/// Table aliases are stable per distinct table within one build; column
/// aliases are `<column><n>` with a monotonically increasing counter
/// starting at zero. The two counters are independent.
struct AliasContext {
    tables: HashMap<String, String>,
    table_counter: usize,
    column_counter: usize,
}

impl AliasContext {
    fn new() -> Self {
        Self {
            tables: HashMap::new(),
            table_counter: 0,
            column_counter: 0,
        }
    }

    fn table_alias(&mut self, table: &str) -> String {
        if let Some(alias) = self.tables.get(table) {
            return alias.clone();
        }
        let alias = format!("tbl{}", self.table_counter);
        self.table_counter += 1;
        self.tables.insert(table.to_string(), alias.clone());
        alias
    }

    fn column_alias(&mut self, column: &str) -> String {
        let alias = format!("{column}{}", self.column_counter);
        self.column_counter += 1;
        alias
    }
}

/// Builds SELECT statements from entity metadata.
pub struct SelectBuilder;

impl SelectBuilder {
    /// Generate a SELECT for `metadata`, filtered by `criteria`, optionally
    /// joined through an owning many-to-many mapping, ordered by `order`.
    pub fn build(
        metadata: &EntityMetadata,
        criteria: &Criteria,
        join: Option<&AssociationMapping>,
        order: &[OrderBy],
    ) -> Result<SelectStatement> {
        let mut ctx = AliasContext::new();
        let table_alias = ctx.table_alias(metadata.table_name());

        let mut column_index = HashMap::new();
        let mut select_list = Vec::new();
        for field in metadata.fields() {
            let alias = ctx.column_alias(&field.column_name);
            select_list.push(format!("{table_alias}.{} AS {alias}", field.column_name));
            column_index.insert(alias, field.column_name.clone());
        }
        for assoc in metadata.associations() {
            if assoc.owning && assoc.kind == AssociationKind::OneToOne {
                for jc in &assoc.join_columns {
                    let alias = ctx.column_alias(&jc.name);
                    select_list.push(format!("{table_alias}.{} AS {alias}", jc.name));
                    column_index.insert(alias, jc.name.clone());
                }
            }
        }

        let mut sql = format!(
            "SELECT {} FROM {} {table_alias}",
            select_list.join(", "),
            metadata.table_name()
        );

        if let Some(mapping) = join {
            let table = mapping.join_table.as_ref().ok_or_else(|| {
                Error::usage(format!(
                    "association '{}' cannot be joined: it has no join table",
                    mapping.field_name
                ))
            })?;
            let on: Vec<String> = mapping
                .relation_to_target_columns
                .iter()
                .map(|(relation_column, target_column)| {
                    format!(
                        "{}.{relation_column} = {table_alias}.{target_column}",
                        table.name
                    )
                })
                .collect();
            sql.push_str(&format!(
                " INNER JOIN {} ON {}",
                table.name,
                on.join(" AND ")
            ));
        }

        let mut params = Vec::new();
        if !criteria.is_empty() {
            let mut conditions = Vec::new();
            for (key, value) in criteria.iter() {
                let target = resolve_key(metadata, &table_alias, key);
                if value.is_null() {
                    conditions.push(format!("{target} IS NULL"));
                } else {
                    conditions.push(format!("{target} = ?"));
                    params.push(value.clone());
                }
            }
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !order.is_empty() {
            let terms: Vec<String> = order
                .iter()
                .map(|term| {
                    format!(
                        "{} {}",
                        resolve_key(metadata, &table_alias, &term.key),
                        term.direction.as_sql()
                    )
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        tracing::trace!(sql = %sql, params = params.len(), "built select");
        Ok(SelectStatement {
            sql,
            params,
            column_index,
        })
    }
}

/// Resolve a criteria or ordering key to a SQL reference.
///
/// Mapped fields and owning associations qualify their column with the
/// entity's table alias; anything else passes through verbatim, which is
/// what join-table-qualified keys and raw column names rely on.
fn resolve_key(metadata: &EntityMetadata, table_alias: &str, key: &str) -> String {
    match metadata.mapped_column(key) {
        Some(column) => format!("{table_alias}.{column}"),
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmap_meta::{AssociationRecord, EntityRecord, FieldRecord};

    fn user_metadata() -> EntityMetadata {
        let mut meta = EntityMetadata::from_record(&EntityRecord {
            entity_name: "User".to_string(),
            table_name: "users".to_string(),
        })
        .unwrap();
        meta.add_field(FieldRecord::named("id").identity()).unwrap();
        meta.add_field(FieldRecord::named("name")).unwrap();
        meta
    }

    #[test]
    fn scalar_select_with_criteria() {
        let meta = user_metadata();
        let criteria = Criteria::new().with("name", "Ada");
        let stmt = SelectBuilder::build(&meta, &criteria, None, &[]).unwrap();

        assert_eq!(
            stmt.sql,
            "SELECT tbl0.id AS id0, tbl0.name AS name1 FROM users tbl0 WHERE tbl0.name = ?"
        );
        assert_eq!(stmt.params, vec![Value::Text("Ada".to_string())]);
        assert_eq!(stmt.column_for_alias("id0"), Some("id"));
        assert_eq!(stmt.column_for_alias("name1"), Some("name"));
    }

    #[test]
    fn alias_counters_reset_per_build() {
        let meta = user_metadata();
        let criteria = Criteria::new();
        let first = SelectBuilder::build(&meta, &criteria, None, &[]).unwrap();
        let second = SelectBuilder::build(&meta, &criteria, None, &[]).unwrap();
        assert_eq!(first.sql, second.sql);
        assert!(second.sql.contains("AS id0"));
    }

    #[test]
    fn null_criteria_render_is_null_without_param() {
        let meta = user_metadata();
        let criteria = Criteria::new().with("name", Value::Null).with("id", 7);
        let stmt = SelectBuilder::build(&meta, &criteria, None, &[]).unwrap();
        assert!(stmt.sql.ends_with("WHERE tbl0.name IS NULL AND tbl0.id = ?"));
        assert_eq!(stmt.params, vec![Value::Int(7)]);
    }

    #[test]
    fn owning_to_one_join_columns_are_selected() {
        let mut meta = user_metadata();
        meta.add_association(AssociationRecord::new(
            "team",
            AssociationKind::OneToOne,
            "Team",
        ))
        .unwrap();
        let stmt = SelectBuilder::build(&meta, &Criteria::new(), None, &[]).unwrap();
        assert!(stmt.sql.contains("tbl0.team_id AS team_id2"));
        assert_eq!(stmt.column_for_alias("team_id2"), Some("team_id"));
    }

    #[test]
    fn association_key_resolves_to_join_column() {
        let mut meta = user_metadata();
        meta.add_association(AssociationRecord::new(
            "team",
            AssociationKind::OneToOne,
            "Team",
        ))
        .unwrap();
        let criteria = Criteria::new().with("team", 5);
        let stmt = SelectBuilder::build(&meta, &criteria, None, &[]).unwrap();
        assert!(stmt.sql.ends_with("WHERE tbl0.team_id = ?"));
    }

    #[test]
    fn many_to_many_join_and_literal_criteria() {
        let mut group = EntityMetadata::from_record(&EntityRecord {
            entity_name: "Group".to_string(),
            table_name: "groups".to_string(),
        })
        .unwrap();
        group.add_field(FieldRecord::named("id").identity()).unwrap();

        // Owning mapping as declared on User.
        let mut user = user_metadata();
        user.add_association(AssociationRecord::new(
            "groups",
            AssociationKind::ManyToMany,
            "Group",
        ))
        .unwrap();
        let mapping = user.association("groups").unwrap();

        let criteria = Criteria::new().with("user_group.user_id", 3);
        let stmt = SelectBuilder::build(&group, &criteria, Some(mapping), &[]).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT tbl0.id AS id0 FROM groups tbl0 \
             INNER JOIN user_group ON user_group.group_id = tbl0.id \
             WHERE user_group.user_id = ?"
        );
        assert_eq!(stmt.params, vec![Value::Int(3)]);
    }

    #[test]
    fn order_by_resolves_fields_and_keeps_direction() {
        let meta = user_metadata();
        let stmt = SelectBuilder::build(
            &meta,
            &Criteria::new(),
            None,
            &[OrderBy::asc("name"), OrderBy::desc("id")],
        )
        .unwrap();
        assert!(stmt
            .sql
            .ends_with("ORDER BY tbl0.name ASC, tbl0.id DESC"));
    }
}
