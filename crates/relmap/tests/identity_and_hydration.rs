//! Identity map semantics across the full find path.

mod common;

use common::ScriptedConnection;
use relmap::prelude::*;
use std::sync::Arc;

fn user_driver() -> StaticDriver {
    StaticDriver::new()
        .entity("User", "users")
        .field("User", FieldRecord::named("id").identity())
        .field("User", FieldRecord::named("name"))
}

#[test]
fn find_by_id_returns_one_instance_per_identity() {
    let conn = ScriptedConnection::new();
    conn.respond(
        "FROM users",
        Some(vec![Value::Int(7)]),
        &["id0", "name1"],
        vec![vec![Value::Int(7), Value::Text("Ada".to_string())]],
    );
    let session = Session::new(Arc::clone(&conn) as _, &user_driver()).unwrap();

    let user = session
        .find_by_id("User", &IdentityKey::single(7))
        .unwrap()
        .unwrap();
    assert_eq!(user.get("id").unwrap(), Value::Int(7));
    assert_eq!(user.get("name").unwrap(), Value::Text("Ada".to_string()));
    assert_eq!(conn.query_calls(), 1);

    // Every subsequent lookup is the same instance, with no further SQL.
    for _ in 0..3 {
        let again = session
            .find_by_id("User", &IdentityKey::single(7))
            .unwrap()
            .unwrap();
        assert!(again.ptr_eq(&user));
    }
    assert_eq!(conn.query_calls(), 1);
}

#[test]
fn load_through_persister_also_lands_in_identity_map() {
    let conn = ScriptedConnection::new();
    conn.respond(
        "FROM users",
        None,
        &["id0", "name1"],
        vec![vec![Value::Int(7), Value::Text("Ada".to_string())]],
    );
    let session = Session::new(Arc::clone(&conn) as _, &user_driver()).unwrap();

    let by_name = session
        .find_one("User", &Criteria::new().with("name", "Ada"))
        .unwrap()
        .unwrap();
    let by_id = session
        .find_by_id("User", &IdentityKey::single(7))
        .unwrap()
        .unwrap();
    assert!(by_id.ptr_eq(&by_name));
    // The criteria load and the identity hit: exactly one query.
    assert_eq!(conn.query_calls(), 1);
}

#[test]
fn hydrating_the_same_row_twice_keeps_the_loaded_instance() {
    let conn = ScriptedConnection::new();
    conn.respond(
        "FROM users",
        None,
        &["id0", "name1"],
        vec![vec![Value::Int(7), Value::Text("Ada".to_string())]],
    );
    let session = Session::new(Arc::clone(&conn) as _, &user_driver()).unwrap();

    let first = session.find_all("User").unwrap();
    // Mutate the tracked instance, then force a second SQL load of the same
    // row: the already-loaded instance wins and the row is not re-applied.
    first[0].set("name", "Grace").unwrap();
    let second = session
        .find_many("User", &Criteria::new(), &[])
        .unwrap();
    assert!(second[0].ptr_eq(&first[0]));
    assert_eq!(
        second[0].get("name").unwrap(),
        Value::Text("Grace".to_string())
    );
    assert_eq!(conn.query_calls(), 2);
}

#[test]
fn unknown_entity_is_not_found_and_uncached() {
    let conn = ScriptedConnection::new();
    let session = Session::new(Arc::clone(&conn) as _, &user_driver()).unwrap();

    let err = session.metadata("Ghost").unwrap_err();
    assert!(err.is_not_found());
    // Still unknown on the second ask; nothing was cached.
    assert!(session.metadata("Ghost").unwrap_err().is_not_found());
    assert_eq!(session.entity_names(), ["User"]);
}

#[test]
fn composite_identity_is_positional() {
    let driver = StaticDriver::new()
        .entity("Assignment", "assignments")
        .field("Assignment", FieldRecord::named("org").identity())
        .field("Assignment", FieldRecord::named("num").identity())
        .field("Assignment", FieldRecord::named("note"));
    let conn = ScriptedConnection::new();
    conn.respond(
        "FROM assignments",
        Some(vec![Value::Int(1), Value::Text("x".to_string())]),
        &["org0", "num1", "note2"],
        vec![vec![
            Value::Int(1),
            Value::Text("x".to_string()),
            Value::Text("first".to_string()),
        ]],
    );
    let session = Session::new(Arc::clone(&conn) as _, &driver).unwrap();

    let key = IdentityKey::new(vec![Value::Int(1), Value::Text("x".to_string())]);
    let swapped = IdentityKey::new(vec![Value::Text("x".to_string()), Value::Int(1)]);
    assert_ne!(key, swapped);

    let found = session.find_by_id("Assignment", &key).unwrap().unwrap();
    assert_eq!(found.get("note").unwrap(), Value::Text("first".to_string()));
    assert!(session.contains("Assignment", &key));
    assert!(!session.contains("Assignment", &swapped));
}

#[test]
fn evicted_identity_reloads_as_a_fresh_instance() {
    let conn = ScriptedConnection::new();
    conn.respond(
        "FROM users",
        None,
        &["id0", "name1"],
        vec![vec![Value::Int(7), Value::Text("Ada".to_string())]],
    );
    let session = Session::new(Arc::clone(&conn) as _, &user_driver()).unwrap();
    let key = IdentityKey::single(7);

    let user = session.find_by_id("User", &key).unwrap().unwrap();
    assert!(session.evict("User", &key));
    let reloaded = session.find_by_id("User", &key).unwrap().unwrap();
    assert!(!reloaded.ptr_eq(&user));
    assert_eq!(conn.query_calls(), 2);
}
