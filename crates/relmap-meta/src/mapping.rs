//! Raw mapping records and completed mapping structures.
//!
//! Metadata drivers hand the factory *records*: loosely filled structs in
//! which most attributes are optional. [`crate::entity::EntityMetadata`]
//! validates and completes them into the fully-defaulted mapping structures
//! defined here.

/// The kind of association between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// One row on each side; the owning table carries the foreign key.
    OneToOne,
    /// One source row, many target rows keyed back to the source.
    OneToMany,
    /// Many rows on both sides, linked through a join table.
    ManyToMany,
}

impl AssociationKind {
    /// Parse a driver-supplied kind string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onetoone" | "one_to_one" => Some(AssociationKind::OneToOne),
            "onetomany" | "one_to_many" => Some(AssociationKind::OneToMany),
            "manytomany" | "many_to_many" => Some(AssociationKind::ManyToMany),
            _ => None,
        }
    }

    /// Canonical storage form of this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AssociationKind::OneToOne => "onetoone",
            AssociationKind::OneToMany => "onetomany",
            AssociationKind::ManyToMany => "manytomany",
        }
    }
}

/// When an association target is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStrategy {
    /// Fetched together with the owning entity.
    Eager,
    /// Deferred to a proxy, resolved on first access.
    #[default]
    Lazy,
}

impl LoadStrategy {
    /// Parse a driver-supplied strategy string. Anything that is not
    /// explicitly eager is lazy, matching the permissive storage format.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("eager") {
            LoadStrategy::Eager
        } else {
            LoadStrategy::Lazy
        }
    }
}

/// Scalar field data types carried by field metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    Integer,
    /// Generic string type; the default when a record omits the type.
    #[default]
    Varchar,
    Boolean,
    Double,
    Timestamp,
}

impl DataType {
    /// Parse a driver-supplied type string, falling back to `Varchar`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "integer" | "int" | "bigint" | "smallint" => DataType::Integer,
            "boolean" | "bool" => DataType::Boolean,
            "double" | "float" | "real" => DataType::Double,
            "timestamp" | "datetime" => DataType::Timestamp,
            _ => DataType::Varchar,
        }
    }
}

/// Entity-level record supplied by a metadata driver.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    /// Logical entity name, distinct from any table name.
    pub entity_name: String,
    /// Database table the entity maps to.
    pub table_name: String,
}

/// Field-level record supplied by a metadata driver.
#[derive(Debug, Clone, Default)]
pub struct FieldRecord {
    pub field_name: String,
    /// Column name; defaults to the field name when absent or empty.
    pub column_name: Option<String>,
    /// Data type; defaults to `Varchar` when absent.
    pub data_type: Option<DataType>,
    pub data_length: Option<u32>,
    pub default_value: Option<String>,
    /// True if this field is (part of) the entity identity.
    pub identity: bool,
}

impl FieldRecord {
    /// Convenience constructor for the common name-only case.
    pub fn named(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            ..Self::default()
        }
    }

    /// Set an explicit column name.
    pub fn column(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = Some(column_name.into());
        self
    }

    /// Set the data type.
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Mark this field as an identity field.
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }
}

/// Association-level record supplied by a metadata driver.
#[derive(Debug, Clone)]
pub struct AssociationRecord {
    pub field_name: String,
    pub kind: AssociationKind,
    pub target_entity_name: String,
    /// Defaults to the declaring entity when absent.
    pub source_entity_name: Option<String>,
    /// Field on the target entity that owns the relationship. Presence
    /// marks this record as the inverse side.
    pub mapped_by: Option<String>,
    /// Field on the target entity that mirrors this owning side.
    pub inversed_by: Option<String>,
    /// Load strategy; defaults to lazy.
    pub load: Option<LoadStrategy>,
    /// Join column names, parallel to `referenced_columns`.
    pub join_columns: Vec<String>,
    /// Referenced column names, parallel to `join_columns`.
    pub referenced_columns: Vec<String>,
    /// Join table name for many-to-many associations.
    pub join_table: Option<String>,
    /// True if this association also supplies (part of) the identity.
    pub identity: bool,
}

impl AssociationRecord {
    /// Minimal record: field name, kind, and target entity.
    pub fn new(
        field_name: impl Into<String>,
        kind: AssociationKind,
        target_entity_name: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            kind,
            target_entity_name: target_entity_name.into(),
            source_entity_name: None,
            mapped_by: None,
            inversed_by: None,
            load: None,
            join_columns: Vec::new(),
            referenced_columns: Vec::new(),
            join_table: None,
            identity: false,
        }
    }

    /// Declare this record as the inverse side, owned by `field` on the
    /// target entity.
    pub fn mapped_by(mut self, field: impl Into<String>) -> Self {
        self.mapped_by = Some(field.into());
        self
    }

    /// Name the mirroring field on the target entity.
    pub fn inversed_by(mut self, field: impl Into<String>) -> Self {
        self.inversed_by = Some(field.into());
        self
    }

    /// Add one join column / referenced column pair.
    pub fn join_column(
        mut self,
        column: impl Into<String>,
        referenced: impl Into<String>,
    ) -> Self {
        self.join_columns.push(column.into());
        self.referenced_columns.push(referenced.into());
        self
    }

    /// Set an explicit join table name.
    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        self.join_table = Some(table.into());
        self
    }

    /// Set the load strategy.
    pub fn load(mut self, load: LoadStrategy) -> Self {
        self.load = Some(load);
        self
    }

    /// Mark this association as supplying the entity identity.
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }
}

/// A completed scalar field mapping.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub field_name: String,
    pub column_name: String,
    pub data_type: DataType,
    pub data_length: Option<u32>,
    pub default_value: Option<String>,
    pub identity: bool,
}

/// A completed join column: local column and the column it references on
/// the target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumn {
    pub name: String,
    pub referenced_column: String,
    /// One-to-one join columns are unique by construction.
    pub unique: bool,
    /// Whether the foreign key cascades on delete (join-table defaults do).
    pub on_delete_cascade: bool,
}

impl JoinColumn {
    pub fn new(name: impl Into<String>, referenced_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            referenced_column: referenced_column.into(),
            unique: false,
            on_delete_cascade: false,
        }
    }
}

/// A completed join table descriptor for many-to-many associations.
#[derive(Debug, Clone)]
pub struct JoinTable {
    pub name: String,
    /// Columns relating the join table to the source entity.
    pub join_columns: Vec<JoinColumn>,
    /// Columns relating the join table to the target entity.
    pub inverse_join_columns: Vec<JoinColumn>,
}

/// A completed association mapping.
///
/// Owning-side mappings carry resolvable join information; inverse-side
/// mappings are resolved by looking up `mapped_by` on the target entity's
/// metadata.
#[derive(Debug, Clone)]
pub struct AssociationMapping {
    pub field_name: String,
    pub kind: AssociationKind,
    pub owning: bool,
    pub identity: bool,
    pub source_entity_name: String,
    pub target_entity_name: String,
    pub mapped_by: Option<String>,
    pub inversed_by: Option<String>,
    pub load: LoadStrategy,
    /// Join columns for to-one owning associations.
    pub join_columns: Vec<JoinColumn>,
    /// Ordered (source column, target column) pairs for to-one owning sides.
    pub source_to_target_columns: Vec<(String, String)>,
    /// Ordered (source column, field name) pairs for result-row translation.
    pub columns_to_fields: Vec<(String, String)>,
    /// Join table for many-to-many owning sides.
    pub join_table: Option<JoinTable>,
    /// Ordered (join-table column, referenced source column) pairs.
    pub relation_to_source_columns: Vec<(String, String)>,
    /// Ordered (join-table column, referenced target column) pairs.
    pub relation_to_target_columns: Vec<(String, String)>,
    /// All join-table columns, source columns first, in SELECT order.
    pub join_table_columns: Vec<String>,
}

impl AssociationMapping {
    /// Whether this association points at a single entity.
    pub fn is_to_one(&self) -> bool {
        self.kind == AssociationKind::OneToOne
    }

    /// Whether this association materializes as a collection.
    pub fn is_collection(&self) -> bool {
        matches!(
            self.kind,
            AssociationKind::OneToMany | AssociationKind::ManyToMany
        )
    }
}
