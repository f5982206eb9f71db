//! Integration tests for state diffing.
//!
//! These tests build two states, diff them, and check that the resulting
//! migration survives a record round trip, replays onto the previous state
//! to yield the target, and renders the expected DDL.

use serde_json::json;
use strata_core::prelude::*;

// =============================================================================
// Fixtures
// =============================================================================

fn state(value: serde_json::Value) -> State {
    State::from_json(&value.to_string()).unwrap()
}

fn users_v1() -> State {
    state(json!({
        "users": {
            "id": {"data_type": "INT", "primary_key": true},
            "name": {"data_type": "TEXT"}
        },
        "logs": {
            "message": {"data_type": "TEXT"}
        }
    }))
}

fn users_v2() -> State {
    state(json!({
        "users": {
            "id": {"data_type": "INT", "primary_key": true},
            "name": {"data_type": "VARCHAR(255)"},
            "email": {"data_type": "TEXT", "null": true}
        },
        "posts": {
            "id": {"data_type": "INTEGER", "primary_key": true, "autoincrement": true},
            "author_id": {"data_type": "INTEGER", "null": true, "references": "users"},
            "title": {"data_type": "TEXT", "default": "untitled"}
        }
    }))
}

fn alterations(migration: &Migration) -> Vec<AlterTableOperation> {
    migration
        .operations()
        .filter_map(|op| match op {
            Operation::AlterTable(alter) => Some(alter),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_record_round_trip() {
    let migration = users_v2().diff(&users_v1());
    assert!(!migration.is_empty());

    let record = migration.to_record().unwrap();
    let restored = Migration::from_entry(&record).unwrap();
    assert_eq!(restored, migration);
    assert_eq!(restored.to_record().unwrap(), record);
}

#[test]
fn test_state_equivalence_both_directions() {
    let v1 = users_v1();
    let v2 = users_v2();

    let mut forward = v1.clone();
    v2.diff(&v1).apply_to_state(&mut forward).unwrap();
    assert_eq!(forward, v2);

    let mut backward = v2.clone();
    v1.diff(&v2).apply_to_state(&mut backward).unwrap();
    assert_eq!(backward, v1);
}

#[test]
fn test_replayed_history_equals_declared_state() {
    let first = users_v1().diff(&State::new());
    let second = users_v2().diff(&users_v1());
    let records = vec![first.to_record().unwrap(), second.to_record().unwrap()];

    assert_eq!(State::replay(&records).unwrap(), users_v2());
}

#[test]
fn test_unchanged_state_yields_empty_migration() {
    let migration = users_v2().diff(&users_v2());
    assert!(migration.is_empty());
    assert_eq!(migration.to_record().unwrap(), json!({}));
    assert_eq!(migration.render(Dialect::SQLITE).unwrap(), "");
}

#[test]
fn test_removed_table_yields_delete_only() {
    let previous = users_v1();
    let target = state(json!({
        "users": {
            "id": {"data_type": "INT", "primary_key": true},
            "name": {"data_type": "TEXT"}
        }
    }));

    let migration = target.diff(&previous);
    let operations: Vec<Operation> = migration.operations().collect();
    assert_eq!(
        operations,
        vec![Operation::DeleteTable(DeleteTableOperation::new("logs"))]
    );
}

#[test]
fn test_unchanged_table_is_not_altered() {
    let migration = users_v2().diff(&users_v1());
    assert!(alterations(&migration).iter().all(|alter| alter.table != "logs"));

    let reordered = state(json!({
        "users": {
            "name": {"data_type": "TEXT"},
            "id": {"data_type": "INT", "primary_key": true}
        },
        "logs": {
            "message": {"data_type": "TEXT"}
        }
    }));
    assert!(reordered.diff(&users_v1()).is_empty());
}

#[test]
fn test_invalid_operation_kind() {
    let record = json!({"RENAME_TABLE": [{"table": "users"}]});
    assert!(matches!(
        Migration::from_entry(&record),
        Err(SchemaError::InvalidOperationKind { kind }) if kind == "RENAME_TABLE"
    ));
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_scenario_add_nullable_column() {
    let previous = state(json!({
        "users": {
            "id": {"data_type": "INT", "primary_key": true},
            "name": {"data_type": "TEXT"}
        }
    }));
    let target = state(json!({
        "users": {
            "id": {"data_type": "INT", "primary_key": true},
            "name": {"data_type": "TEXT"},
            "email": {"data_type": "TEXT", "null": true}
        }
    }));

    let migration = target.diff(&previous);
    let alters = alterations(&migration);
    assert_eq!(migration.len(), 1);
    assert_eq!(alters[0].table, "users");
    assert_eq!(
        alters[0].operations,
        vec![FieldOperation::Create {
            field: "email".to_string(),
            meta: FieldMeta::new("TEXT").nullable(),
        }]
    );

    for dialect in [Dialect::SQLITE, Dialect::MYSQL] {
        assert_eq!(
            migration.render(dialect).unwrap(),
            "ALTER TABLE users\nADD email TEXT NULL;"
        );
    }
}

#[test]
fn test_scenario_drop_table() {
    let previous = state(json!({"logs": {"message": {"data_type": "TEXT"}}}));
    let migration = state(json!({})).diff(&previous);

    let record = migration.to_record().unwrap();
    assert_eq!(record, json!({"DELETE_TABLE": [{"table": "logs"}]}));
    assert_eq!(migration.render(Dialect::SQLITE).unwrap(), "DROP TABLE logs;");
}

#[test]
fn test_scenario_change_type() {
    let previous = state(json!({
        "users": {"name": {"data_type": "TEXT", "null": true, "default": "anon"}}
    }));
    let target = state(json!({
        "users": {"name": {"data_type": "VARCHAR(255)", "null": true, "default": "anon"}}
    }));

    let migration = target.diff(&previous);
    let alters = alterations(&migration);
    assert_eq!(alters.len(), 1);
    assert_eq!(
        alters[0].operations,
        vec![FieldOperation::Change {
            field: "name".to_string(),
            meta: FieldMeta::new("VARCHAR(255)")
                .nullable()
                .default_value("anon"),
        }]
    );

    assert_eq!(
        migration.render(Dialect::MYSQL).unwrap(),
        "ALTER TABLE users\nCHANGE name name VARCHAR(255) DEFAULT 'anon';"
    );
    assert_eq!(
        migration.render(Dialect::SQLITE).unwrap(),
        "ALTER TABLE users\nDROP name;\nALTER TABLE users\nADD name VARCHAR(255) DEFAULT 'anon';"
    );
}

#[test]
fn test_new_table_renders_constraints() {
    let migration = users_v2().diff(&users_v1());
    let sql = migration.render(Dialect::SQLITE).unwrap();

    assert!(sql.starts_with("DROP TABLE logs;\n"));
    assert!(sql.contains(
        "CREATE TABLE posts (id INTEGER NOT NULL, author_id INTEGER NULL, \
         title TEXT DEFAULT 'untitled', FOREIGN KEY (author_id) REFERENCES users(id), \
         PRIMARY KEY (id));"
    ));
}
