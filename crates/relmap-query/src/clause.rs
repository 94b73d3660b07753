//! Criteria and ordering clauses.

use relmap_core::Value;

/// Insertion-ordered equality criteria.
///
/// Keys may be field names, association field names, or literal column
/// names; resolution happens at build time against the entity metadata.
/// Order is preserved so generated SQL and parameter lists are
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    entries: Vec<(String, Value)>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<(String, Value)>> for Criteria {
    fn from(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }
}

/// Sort direction for an [`OrderBy`] clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// One ordering term; the key resolves like a criteria key.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub key: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: OrderDirection::Desc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_preserves_insertion_order() {
        let criteria = Criteria::new()
            .with("b", 2)
            .with("a", 1)
            .with("c", Value::Null);
        let keys: Vec<&str> = criteria.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["b", "a", "c"]);
        assert_eq!(criteria.len(), 3);
    }

    #[test]
    fn order_direction_sql() {
        assert_eq!(OrderBy::asc("name").direction.as_sql(), "ASC");
        assert_eq!(OrderBy::desc("id").direction.as_sql(), "DESC");
    }
}
