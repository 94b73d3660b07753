//! Error types for relmap operations.

use std::fmt;

/// The primary error type for all relmap operations.
#[derive(Debug)]
pub enum Error {
    /// Malformed or incomplete mapping metadata. Fatal to the metadata-build
    /// step and surfaced at factory construction time.
    Config(ConfigError),
    /// A requested entity name or required row does not exist.
    NotFound(NotFoundError),
    /// Programmer-error-class misuse of the API.
    Usage(UsageError),
    /// Two distinct instances registered under the same identity key.
    IdentityConflict(IdentityConflictError),
    /// Query execution errors from the database collaborator.
    Query(QueryError),
    /// Type conversion errors during rehydration.
    Type(TypeError),
    /// I/O errors
    Io(std::io::Error),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConfigError {
    pub entity_name: Option<String>,
    pub message: String,
}

/// What kind of lookup came up empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    /// Entity name unknown to the metadata driver.
    Entity,
    /// A row required by an association is absent (dangling foreign key).
    AssociationTarget,
    /// A row requested by primary key is absent. Callers translate this
    /// into an absent-value result at the top level.
    Row,
}

#[derive(Debug)]
pub struct NotFoundError {
    pub kind: NotFoundKind,
    pub entity_name: String,
    pub message: String,
}

#[derive(Debug)]
pub struct UsageError {
    pub message: String,
}

#[derive(Debug)]
pub struct IdentityConflictError {
    pub entity_name: String,
    pub message: String,
}

#[derive(Debug)]
pub struct QueryError {
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Build a configuration error scoped to an entity.
    pub fn config(entity_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            entity_name: Some(entity_name.into()),
            message: message.into(),
        })
    }

    /// Build an unknown-entity error.
    pub fn unknown_entity(entity_name: impl Into<String>) -> Self {
        let entity_name = entity_name.into();
        Error::NotFound(NotFoundError {
            kind: NotFoundKind::Entity,
            message: format!("unknown entity '{entity_name}'"),
            entity_name,
        })
    }

    /// Build a missing-row error for a required association target.
    pub fn missing_association_target(
        entity_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::NotFound(NotFoundError {
            kind: NotFoundKind::AssociationTarget,
            entity_name: entity_name.into(),
            message: message.into(),
        })
    }

    /// Build a missing-row error for a by-identity load that found nothing.
    pub fn missing_row(entity_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::NotFound(NotFoundError {
            kind: NotFoundKind::Row,
            entity_name: entity_name.into(),
            message: message.into(),
        })
    }

    /// Build a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage(UsageError {
            message: message.into(),
        })
    }

    /// Build an identity conflict error.
    pub fn identity_conflict(
        entity_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::IdentityConflict(IdentityConflictError {
            entity_name: entity_name.into(),
            message: message.into(),
        })
    }

    /// Build a query error carrying the offending SQL.
    pub fn query(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            sql: Some(sql.into()),
            message: message.into(),
            source: None,
        })
    }

    /// Is this a not-found outcome (of any kind)?
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Get the SQL that caused this error, if available.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => match &e.entity_name {
                Some(name) => write!(f, "Configuration error for entity '{}': {}", name, e.message),
                None => write!(f, "Configuration error: {}", e.message),
            },
            Error::NotFound(e) => write!(f, "Not found: {}", e.message),
            Error::Usage(e) => write!(f, "Usage error: {}", e.message),
            Error::IdentityConflict(e) => write!(
                f,
                "Identity conflict for entity '{}': {}",
                e.entity_name, e.message
            ),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for IdentityConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<NotFoundError> for Error {
    fn from(err: NotFoundError) -> Self {
        Error::NotFound(err)
    }
}

impl From<UsageError> for Error {
    fn from(err: UsageError) -> Self {
        Error::Usage(err)
    }
}

impl From<IdentityConflictError> for Error {
    fn from(err: IdentityConflictError) -> Self {
        Error::IdentityConflict(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for relmap operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_flag_and_sql_accessor() {
        let nf = Error::unknown_entity("Ghost");
        assert!(nf.is_not_found());
        assert_eq!(nf.sql(), None);

        let q = Error::query("SELECT 1", "boom");
        assert!(!q.is_not_found());
        assert_eq!(q.sql(), Some("SELECT 1"));
    }

    #[test]
    fn display_includes_entity_context() {
        let err = Error::config("User", "field 'id' duplicated");
        let text = err.to_string();
        assert!(text.contains("User"));
        assert!(text.contains("duplicated"));
    }

    #[test]
    fn not_found_kinds_are_distinguishable() {
        let entity = Error::unknown_entity("Ghost");
        let row = Error::missing_association_target("User", "dangling author_id");
        match (entity, row) {
            (Error::NotFound(a), Error::NotFound(b)) => {
                assert_eq!(a.kind, NotFoundKind::Entity);
                assert_eq!(b.kind, NotFoundKind::AssociationTarget);
            }
            _ => unreachable!(),
        }
    }
}
