//! Per-session identity map.
//!
//! The identity map guarantees that one session holds at most one in-memory
//! instance per entity identity. Keys are structured tuples of values, never
//! joined strings, so identity values containing arbitrary text cannot
//! collide.

use crate::entity::EntityRef;
use relmap_core::{Error, Result, Value};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// An entity identity: the identifier values in declared identifier order.
///
/// Equality and hashing are positional. Floats compare by bit pattern so a
/// key can serve as a hash-map key without violating the `Eq`/`Hash`
/// contract.
#[derive(Debug, Clone)]
pub struct IdentityKey(Vec<Value>);

impl IdentityKey {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Single-value identity, the common case.
    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for IdentityKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| value_eq(a, b))
    }
}

impl Eq for IdentityKey {}

impl Hash for IdentityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for value in &self.0 {
            hash_value(value, state);
        }
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Double(x), Value::Double(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

/// Hash a value with a leading variant tag, so `Int(1)` and `Text("1")`
/// never collide by accident.
fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::SmallInt(n) => {
            2u8.hash(state);
            n.hash(state);
        }
        Value::Int(n) => {
            3u8.hash(state);
            n.hash(state);
        }
        Value::BigInt(n) => {
            4u8.hash(state);
            n.hash(state);
        }
        Value::Float(f) => {
            5u8.hash(state);
            f.to_bits().hash(state);
        }
        Value::Double(f) => {
            6u8.hash(state);
            f.to_bits().hash(state);
        }
        Value::Decimal(s) => {
            7u8.hash(state);
            s.hash(state);
        }
        Value::Text(s) => {
            8u8.hash(state);
            s.hash(state);
        }
        Value::Bytes(b) => {
            9u8.hash(state);
            b.hash(state);
        }
        Value::Date(s) => {
            10u8.hash(state);
            s.hash(state);
        }
        Value::Time(s) => {
            11u8.hash(state);
            s.hash(state);
        }
        Value::Timestamp(s) => {
            12u8.hash(state);
            s.hash(state);
        }
        Value::Uuid(bytes) => {
            13u8.hash(state);
            bytes.hash(state);
        }
        Value::Json(v) => {
            14u8.hash(state);
            v.to_string().hash(state);
        }
        Value::Array(items) => {
            15u8.hash(state);
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
    }
}

/// Registry of entity instances keyed by `(entity name, identity)`.
#[derive(Default)]
pub struct IdentityMap {
    entries: HashMap<String, HashMap<IdentityKey, EntityRef>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, entity_name: &str, key: &IdentityKey) -> bool {
        self.entries
            .get(entity_name)
            .is_some_and(|m| m.contains_key(key))
    }

    pub fn get(&self, entity_name: &str, key: &IdentityKey) -> Option<EntityRef> {
        self.entries
            .get(entity_name)
            .and_then(|m| m.get(key))
            .cloned()
    }

    /// Register an instance under its identity.
    ///
    /// Re-inserting the same instance is a no-op; a *different* instance
    /// under an occupied key is an identity conflict.
    pub fn insert(
        &mut self,
        entity_name: &str,
        key: IdentityKey,
        entity: EntityRef,
    ) -> Result<()> {
        let per_entity = self.entries.entry(entity_name.to_string()).or_default();
        if let Some(existing) = per_entity.get(&key) {
            if existing.ptr_eq(&entity) {
                return Ok(());
            }
            return Err(Error::identity_conflict(
                entity_name,
                format!("identity {:?} is already bound to another instance", key.values()),
            ));
        }
        per_entity.insert(key, entity);
        Ok(())
    }

    /// Unconditionally rebind a key, for explicit refresh flows.
    pub fn replace(&mut self, entity_name: &str, key: IdentityKey, entity: EntityRef) {
        self.entries
            .entry(entity_name.to_string())
            .or_default()
            .insert(key, entity);
    }

    /// Remove an entry; true when something was evicted.
    pub fn remove(&mut self, entity_name: &str, key: &IdentityKey) -> bool {
        self.entries
            .get_mut(entity_name)
            .is_some_and(|m| m.remove(key).is_some())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    fn user(id: i64) -> EntityRef {
        let mut entity = Entity::new("User");
        entity.fields.insert("id".to_string(), Value::BigInt(id));
        EntityRef::from_entity(entity)
    }

    #[test]
    fn insert_get_remove() {
        let mut map = IdentityMap::new();
        let key = IdentityKey::single(7i64);
        let entity = user(7);
        map.insert("User", key.clone(), entity.clone()).unwrap();

        assert!(map.contains("User", &key));
        assert!(map.get("User", &key).unwrap().ptr_eq(&entity));
        assert_eq!(map.len(), 1);
        assert!(map.remove("User", &key));
        assert!(!map.remove("User", &key));
        assert!(map.is_empty());
    }

    #[test]
    fn same_instance_reinsert_is_noop() {
        let mut map = IdentityMap::new();
        let key = IdentityKey::single(7i64);
        let entity = user(7);
        map.insert("User", key.clone(), entity.clone()).unwrap();
        map.insert("User", key.clone(), entity).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn distinct_instance_collision_is_conflict() {
        let mut map = IdentityMap::new();
        let key = IdentityKey::single(7i64);
        map.insert("User", key.clone(), user(7)).unwrap();
        let err = map.insert("User", key, user(7)).unwrap_err();
        assert!(matches!(err, Error::IdentityConflict(_)));
    }

    #[test]
    fn replace_is_unconditional() {
        let mut map = IdentityMap::new();
        let key = IdentityKey::single(7i64);
        map.insert("User", key.clone(), user(7)).unwrap();
        let fresh = user(7);
        map.replace("User", key.clone(), fresh.clone());
        assert!(map.get("User", &key).unwrap().ptr_eq(&fresh));
    }

    #[test]
    fn same_key_different_entities_do_not_collide() {
        let mut map = IdentityMap::new();
        let key = IdentityKey::single(7i64);
        map.insert("User", key.clone(), user(7)).unwrap();
        map.insert("Team", key.clone(), user(7)).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn identity_keys_are_positional() {
        let a = IdentityKey::new(vec![Value::Int(1), Value::Text("x".to_string())]);
        let b = IdentityKey::new(vec![Value::Text("x".to_string()), Value::Int(1)]);
        assert_ne!(a, b);
        assert_eq!(
            a,
            IdentityKey::new(vec![Value::Int(1), Value::Text("x".to_string())])
        );
    }

    #[test]
    fn text_values_with_separators_cannot_collide() {
        // Joined-string keys would conflate these two.
        let a = IdentityKey::new(vec![
            Value::Text("a-b".to_string()),
            Value::Text("c".to_string()),
        ]);
        let b = IdentityKey::new(vec![
            Value::Text("a".to_string()),
            Value::Text("b-c".to_string()),
        ]);
        assert_ne!(a, b);
    }

    #[test]
    fn int_and_text_identities_are_distinct() {
        let a = IdentityKey::single(1i64);
        let b = IdentityKey::single("1");
        assert_ne!(a, b);
    }
}
