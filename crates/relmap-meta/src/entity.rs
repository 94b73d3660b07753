//! Per-entity metadata assembly and lookup.
//!
//! [`EntityMetadata`] is built incrementally: an [`EntityRecord`] seeds it,
//! then the factory feeds it field and association records one by one. Each
//! `add_*` call validates the record, fills in defaults, and registers the
//! completed mapping in the lookup tables. A metadata instance is immutable
//! once the factory publishes it.

use crate::mapping::{
    AssociationKind, AssociationMapping, AssociationRecord, EntityRecord, FieldMapping,
    FieldRecord, JoinColumn, JoinTable,
};
use relmap_core::{Error, Result};
use std::collections::HashMap;

/// Complete mapping metadata for one entity.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    entity_name: String,
    table_name: String,
    fields: Vec<FieldMapping>,
    field_index: HashMap<String, usize>,
    associations: Vec<AssociationMapping>,
    association_index: HashMap<String, usize>,
    field_to_column: HashMap<String, String>,
    column_to_field: HashMap<String, String>,
    /// Identity field names, in declaration order.
    identity_fields: Vec<String>,
    /// True when the identity is (partly) supplied by an association.
    foreign_identity: bool,
}

impl EntityMetadata {
    /// Seed metadata from an entity record.
    pub fn from_record(record: &EntityRecord) -> Result<Self> {
        if record.entity_name.is_empty() {
            return Err(Error::config("", "entity record is missing its name"));
        }
        if record.table_name.is_empty() {
            return Err(Error::config(
                &record.entity_name,
                "entity record is missing its table name",
            ));
        }
        Ok(Self {
            entity_name: record.entity_name.clone(),
            table_name: record.table_name.clone(),
            fields: Vec::new(),
            field_index: HashMap::new(),
            associations: Vec::new(),
            association_index: HashMap::new(),
            field_to_column: HashMap::new(),
            column_to_field: HashMap::new(),
            identity_fields: Vec::new(),
            foreign_identity: false,
        })
    }

    /// Validate, complete, and register one scalar field record.
    pub fn add_field(&mut self, record: FieldRecord) -> Result<()> {
        if record.field_name.is_empty() {
            return Err(Error::config(
                &self.entity_name,
                "field record is missing its field name",
            ));
        }
        self.reject_duplicate_name(&record.field_name)?;

        let column_name = match record.column_name {
            Some(c) if !c.is_empty() => c,
            _ => record.field_name.clone(),
        };
        if self.column_to_field.contains_key(&column_name) {
            return Err(Error::config(
                &self.entity_name,
                format!("column '{column_name}' is mapped more than once"),
            ));
        }

        let mapping = FieldMapping {
            field_name: record.field_name,
            column_name,
            data_type: record.data_type.unwrap_or_default(),
            data_length: record.data_length,
            default_value: record.default_value,
            identity: record.identity,
        };

        self.field_to_column
            .insert(mapping.field_name.clone(), mapping.column_name.clone());
        self.column_to_field
            .insert(mapping.column_name.clone(), mapping.field_name.clone());
        if mapping.identity {
            self.identity_fields.push(mapping.field_name.clone());
        }
        self.field_index
            .insert(mapping.field_name.clone(), self.fields.len());
        self.fields.push(mapping);
        Ok(())
    }

    /// Validate, complete, and register one association record.
    pub fn add_association(&mut self, record: AssociationRecord) -> Result<()> {
        if record.field_name.is_empty() {
            return Err(Error::config(
                &self.entity_name,
                "association record is missing its field name",
            ));
        }
        if record.target_entity_name.is_empty() {
            return Err(Error::config(
                &self.entity_name,
                format!(
                    "association '{}' is missing its target entity",
                    record.field_name
                ),
            ));
        }
        self.reject_duplicate_name(&record.field_name)?;
        if record.join_columns.len() != record.referenced_columns.len() {
            return Err(Error::config(
                &self.entity_name,
                format!(
                    "association '{}' has {} join columns but {} referenced columns",
                    record.field_name,
                    record.join_columns.len(),
                    record.referenced_columns.len()
                ),
            ));
        }

        // Explicit join columns or the absence of mapped_by make this the
        // owning side.
        let owning = record.mapped_by.is_none() || !record.join_columns.is_empty();

        let mut mapping = AssociationMapping {
            field_name: record.field_name,
            kind: record.kind,
            owning,
            identity: record.identity,
            source_entity_name: record
                .source_entity_name
                .unwrap_or_else(|| self.entity_name.clone()),
            target_entity_name: record.target_entity_name,
            mapped_by: record.mapped_by,
            inversed_by: record.inversed_by,
            load: record.load.unwrap_or_default(),
            join_columns: Vec::new(),
            source_to_target_columns: Vec::new(),
            columns_to_fields: Vec::new(),
            join_table: None,
            relation_to_source_columns: Vec::new(),
            relation_to_target_columns: Vec::new(),
            join_table_columns: Vec::new(),
        };

        let explicit: Vec<JoinColumn> = record
            .join_columns
            .into_iter()
            .zip(record.referenced_columns)
            .map(|(name, referenced)| JoinColumn::new(name, referenced))
            .collect();

        match mapping.kind {
            AssociationKind::OneToOne => {
                self.complete_one_to_one(&mut mapping, explicit)?;
            }
            AssociationKind::OneToMany => {
                // The inverse side of a to-one mapping on the target entity;
                // join information is resolved there.
                if mapping.identity {
                    return Err(Error::config(
                        &self.entity_name,
                        format!(
                            "association '{}' cannot supply the identity: collections are not identifying",
                            mapping.field_name
                        ),
                    ));
                }
            }
            AssociationKind::ManyToMany => {
                if mapping.identity {
                    return Err(Error::config(
                        &self.entity_name,
                        format!(
                            "association '{}' cannot supply the identity: many-to-many associations are not identifying",
                            mapping.field_name
                        ),
                    ));
                }
                if mapping.owning {
                    self.complete_many_to_many(&mut mapping, explicit, record.join_table);
                }
            }
        }

        if mapping.identity {
            self.identity_fields.push(mapping.field_name.clone());
            self.foreign_identity = true;
        }
        self.association_index
            .insert(mapping.field_name.clone(), self.associations.len());
        self.associations.push(mapping);
        Ok(())
    }

    fn complete_one_to_one(
        &mut self,
        mapping: &mut AssociationMapping,
        explicit: Vec<JoinColumn>,
    ) -> Result<()> {
        if !mapping.owning {
            if mapping.identity {
                return Err(Error::config(
                    &self.entity_name,
                    format!(
                        "association '{}' cannot supply the identity: the inverse side carries no join column",
                        mapping.field_name
                    ),
                ));
            }
            return Ok(());
        }
        let mut join_columns = if explicit.is_empty() {
            vec![JoinColumn::new(
                format!("{}_id", mapping.field_name),
                "id",
            )]
        } else {
            explicit
        };
        for jc in &mut join_columns {
            jc.unique = true;
        }
        if mapping.identity && join_columns.len() > 1 {
            return Err(Error::config(
                &self.entity_name,
                format!(
                    "association '{}' cannot supply the identity through more than one join column",
                    mapping.field_name
                ),
            ));
        }
        for jc in &join_columns {
            mapping
                .source_to_target_columns
                .push((jc.name.clone(), jc.referenced_column.clone()));
            mapping
                .columns_to_fields
                .push((jc.name.clone(), mapping.field_name.clone()));
            self.column_to_field
                .insert(jc.name.clone(), mapping.field_name.clone());
        }
        // The association field resolves to its first join column, so the
        // identity column list works for foreign identities too.
        self.field_to_column
            .insert(mapping.field_name.clone(), join_columns[0].name.clone());
        mapping.join_columns = join_columns;
        Ok(())
    }

    fn complete_many_to_many(
        &self,
        mapping: &mut AssociationMapping,
        explicit: Vec<JoinColumn>,
        table_name: Option<String>,
    ) {
        let source = mapping.source_entity_name.to_ascii_lowercase();
        let target = mapping.target_entity_name.to_ascii_lowercase();
        let name = match table_name {
            Some(n) if !n.is_empty() => n,
            _ => format!("{source}_{target}"),
        };
        let join_columns = if explicit.is_empty() {
            vec![cascade_column(format!("{source}_id"))]
        } else {
            explicit
        };
        let inverse_join_columns = vec![cascade_column(format!("{target}_id"))];

        for jc in &join_columns {
            mapping
                .relation_to_source_columns
                .push((jc.name.clone(), jc.referenced_column.clone()));
            mapping.join_table_columns.push(jc.name.clone());
        }
        for jc in &inverse_join_columns {
            mapping
                .relation_to_target_columns
                .push((jc.name.clone(), jc.referenced_column.clone()));
            mapping.join_table_columns.push(jc.name.clone());
        }
        mapping.join_table = Some(JoinTable {
            name,
            join_columns,
            inverse_join_columns,
        });
    }

    fn reject_duplicate_name(&self, name: &str) -> Result<()> {
        if self.field_index.contains_key(name) || self.association_index.contains_key(name) {
            return Err(Error::config(
                &self.entity_name,
                format!("field or association '{name}' is declared more than once"),
            ));
        }
        Ok(())
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Scalar field mappings, in declaration order.
    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    pub fn field(&self, field_name: &str) -> Option<&FieldMapping> {
        self.field_index
            .get(field_name)
            .map(|&i| &self.fields[i])
    }

    pub fn has_field(&self, field_name: &str) -> bool {
        self.field_index.contains_key(field_name)
    }

    /// Association mappings, in declaration order.
    pub fn associations(&self) -> &[AssociationMapping] {
        &self.associations
    }

    pub fn association(&self, field_name: &str) -> Option<&AssociationMapping> {
        self.association_index
            .get(field_name)
            .map(|&i| &self.associations[i])
    }

    pub fn has_association(&self, field_name: &str) -> bool {
        self.association_index.contains_key(field_name)
    }

    /// Column for a field, echoing the input when no mapping matches.
    ///
    /// The permissive fallback lets query code pass literal column names
    /// through the same resolution path as mapped fields.
    pub fn column_name<'a>(&'a self, field_name: &'a str) -> &'a str {
        self.field_to_column
            .get(field_name)
            .map_or(field_name, String::as_str)
    }

    /// Column for a mapped field or owning association, without the
    /// permissive echo. `None` means the key has no column of its own.
    pub fn mapped_column(&self, key: &str) -> Option<&str> {
        self.field_to_column.get(key).map(String::as_str)
    }

    /// Field for a column, echoing the input when no mapping matches.
    ///
    /// Owning to-one join columns resolve to their association field.
    pub fn field_for_column<'a>(&'a self, column_name: &'a str) -> &'a str {
        self.column_to_field
            .get(column_name)
            .map_or(column_name, String::as_str)
    }

    /// Identity field names, in declaration order.
    pub fn identity_fields(&self) -> &[String] {
        &self.identity_fields
    }

    /// Identity column names, in identity field order.
    pub fn identity_columns(&self) -> Vec<&str> {
        self.identity_fields
            .iter()
            .map(|f| self.column_name(f))
            .collect()
    }

    pub fn is_identity(&self, field_name: &str) -> bool {
        self.identity_fields.iter().any(|f| f == field_name)
    }

    pub fn has_composite_identity(&self) -> bool {
        self.identity_fields.len() > 1
    }

    /// True when an association supplies (part of) the identity.
    pub fn has_foreign_identity(&self) -> bool {
        self.foreign_identity
    }

    /// The single identity field, or a usage error for composite or absent
    /// identities.
    pub fn single_identity_field(&self) -> Result<&str> {
        match self.identity_fields.as_slice() {
            [single] => Ok(single),
            [] => Err(Error::usage(format!(
                "entity '{}' declares no identity field",
                self.entity_name
            ))),
            _ => Err(Error::usage(format!(
                "entity '{}' has a composite identity; use identity_fields()",
                self.entity_name
            ))),
        }
    }

    /// The single identity column, via [`Self::single_identity_field`].
    pub fn single_identity_column(&self) -> Result<&str> {
        self.single_identity_field().map(|f| self.column_name(f))
    }
}

fn cascade_column(name: String) -> JoinColumn {
    let mut jc = JoinColumn::new(name, "id");
    jc.on_delete_cascade = true;
    jc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{DataType, LoadStrategy};

    fn user_metadata() -> EntityMetadata {
        EntityMetadata::from_record(&EntityRecord {
            entity_name: "User".to_string(),
            table_name: "users".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn field_defaults() {
        let mut meta = user_metadata();
        meta.add_field(FieldRecord::named("id").identity()).unwrap();
        meta.add_field(FieldRecord::named("fullName").column("full_name"))
            .unwrap();

        let id = meta.field("id").unwrap();
        assert_eq!(id.column_name, "id");
        assert_eq!(id.data_type, DataType::Varchar);
        assert!(id.identity);

        assert_eq!(meta.column_name("fullName"), "full_name");
        assert_eq!(meta.field_for_column("full_name"), "fullName");
        assert_eq!(meta.identity_fields(), ["id"]);
        assert_eq!(meta.single_identity_field().unwrap(), "id");
    }

    #[test]
    fn permissive_lookups_echo_unknown_input() {
        let mut meta = user_metadata();
        meta.add_field(FieldRecord::named("id").identity()).unwrap();
        assert_eq!(meta.column_name("not_mapped"), "not_mapped");
        assert_eq!(meta.field_for_column("raw_column"), "raw_column");
    }

    #[test]
    fn duplicate_field_is_config_error() {
        let mut meta = user_metadata();
        meta.add_field(FieldRecord::named("id")).unwrap();
        let err = meta.add_field(FieldRecord::named("id")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn one_to_one_defaults_join_column() {
        let mut meta = user_metadata();
        meta.add_field(FieldRecord::named("id").identity()).unwrap();
        meta.add_association(AssociationRecord::new(
            "team",
            AssociationKind::OneToOne,
            "Team",
        ))
        .unwrap();

        let assoc = meta.association("team").unwrap();
        assert!(assoc.owning);
        assert_eq!(assoc.load, LoadStrategy::Lazy);
        assert_eq!(assoc.join_columns.len(), 1);
        assert_eq!(assoc.join_columns[0].name, "team_id");
        assert_eq!(assoc.join_columns[0].referenced_column, "id");
        assert!(assoc.join_columns[0].unique);
        assert_eq!(meta.field_for_column("team_id"), "team");
        assert_eq!(meta.column_name("team"), "team_id");
    }

    #[test]
    fn mapped_by_marks_inverse_side() {
        let mut meta = user_metadata();
        meta.add_field(FieldRecord::named("id").identity()).unwrap();
        meta.add_association(
            AssociationRecord::new("profile", AssociationKind::OneToOne, "Profile")
                .mapped_by("owner"),
        )
        .unwrap();
        let assoc = meta.association("profile").unwrap();
        assert!(!assoc.owning);
        assert!(assoc.join_columns.is_empty());
    }

    #[test]
    fn join_referenced_count_mismatch_is_config_error() {
        let mut meta = user_metadata();
        let mut record = AssociationRecord::new("team", AssociationKind::OneToOne, "Team");
        record.join_columns.push("team_id".to_string());
        let err = meta.add_association(record).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn many_to_many_defaults() {
        let mut meta = user_metadata();
        meta.add_field(FieldRecord::named("id").identity()).unwrap();
        meta.add_association(AssociationRecord::new(
            "groups",
            AssociationKind::ManyToMany,
            "Group",
        ))
        .unwrap();

        let assoc = meta.association("groups").unwrap();
        let table = assoc.join_table.as_ref().unwrap();
        assert_eq!(table.name, "user_group");
        assert_eq!(table.join_columns[0].name, "user_id");
        assert!(table.join_columns[0].on_delete_cascade);
        assert_eq!(table.inverse_join_columns[0].name, "group_id");
        assert_eq!(assoc.join_table_columns, vec!["user_id", "group_id"]);
        assert_eq!(
            assoc.relation_to_target_columns,
            vec![("group_id".to_string(), "id".to_string())]
        );
    }

    #[test]
    fn many_to_many_identity_rejected() {
        let mut meta = user_metadata();
        let err = meta
            .add_association(
                AssociationRecord::new("groups", AssociationKind::ManyToMany, "Group").identity(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn inverse_one_to_one_identity_rejected() {
        let mut meta = user_metadata();
        let err = meta
            .add_association(
                AssociationRecord::new("account", AssociationKind::OneToOne, "Account")
                    .mapped_by("settings")
                    .identity(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn multi_column_foreign_identity_rejected() {
        let mut meta = user_metadata();
        let err = meta
            .add_association(
                AssociationRecord::new("tenant", AssociationKind::OneToOne, "Tenant")
                    .join_column("tenant_id", "id")
                    .join_column("region", "region")
                    .identity(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn foreign_identity_registers_association_field() {
        let mut meta = user_metadata();
        meta.add_association(
            AssociationRecord::new("account", AssociationKind::OneToOne, "Account").identity(),
        )
        .unwrap();
        assert!(meta.has_foreign_identity());
        assert_eq!(meta.identity_fields(), ["account"]);
        assert_eq!(meta.identity_columns(), ["account_id"]);
    }

    #[test]
    fn composite_identity_ordering_follows_declaration() {
        let mut meta = user_metadata();
        meta.add_field(FieldRecord::named("org").identity()).unwrap();
        meta.add_field(FieldRecord::named("num").identity()).unwrap();
        assert!(meta.has_composite_identity());
        assert_eq!(meta.identity_fields(), ["org", "num"]);
        assert!(matches!(
            meta.single_identity_field().unwrap_err(),
            Error::Usage(_)
        ));
    }
}
