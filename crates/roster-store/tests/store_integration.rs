//! Integration tests for the async store handle over both backends.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use tempfile::TempDir;

use roster_store::catalog::{
    EMPLOYEES, IDENTIFIERS, IDENTIFIER_EMPLOYEE_SHIFT, ORGANIZATIONS, SCHEDULES,
    SCHEDULE_DATE_EMPLOYEE, SHIFTS, SHIFT_ORDERS,
};
use roster_store::{scheduling_schema, Record, RecordKey, Snapshot, Store, StoreConfig, StoreError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn record(value: Value) -> Record {
    Record::try_from(value).unwrap()
}

/// A store plus whatever must outlive it.
struct Fixture {
    name: &'static str,
    store: Store,
    _dir: Option<TempDir>,
}

async fn fixtures() -> Vec<Fixture> {
    init_tracing();
    let memory = Store::open(&StoreConfig::memory(), &scheduling_schema())
        .await
        .expect("failed to open in-memory store");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.db");
    let sqlite = Store::open(&StoreConfig::sqlite(path.to_string_lossy()), &scheduling_schema())
        .await
        .expect("failed to open sqlite store");

    vec![
        Fixture {
            name: "memory",
            store: memory,
            _dir: None,
        },
        Fixture {
            name: "sqlite",
            store: sqlite,
            _dir: Some(dir),
        },
    ]
}

fn contents(records: &[Record]) -> BTreeSet<String> {
    records
        .iter()
        .map(|r| serde_json::to_string(r).unwrap())
        .collect()
}

#[tokio::test]
async fn end_to_end_scenario() {
    for Fixture { name, store, .. } in fixtures().await {
        let org = store.put(ORGANIZATIONS, record(json!({"name": "Org1"}))).await.unwrap();
        assert_eq!(org, RecordKey(1), "{name}");

        let employee = store
            .put(
                EMPLOYEES,
                record(json!({"number": "001", "name": "Zhang", "organizationId": 1})),
            )
            .await
            .unwrap();
        assert_eq!(employee, RecordKey(1), "{name}");

        let identifier = store
            .put(IDENTIFIERS, record(json!({"employeeId": 1, "shiftId": 10, "canWork": true})))
            .await
            .unwrap();
        assert_eq!(identifier, RecordKey(1), "{name}");

        let found = store
            .get_by_index(IDENTIFIERS, IDENTIFIER_EMPLOYEE_SHIFT, &json!([1, 10]))
            .await
            .unwrap();
        assert_eq!(found.len(), 1, "{name}");
        assert_eq!(found[0].get("canWork"), Some(&json!(true)), "{name}");

        store.delete(EMPLOYEES, employee).await.unwrap();
        assert!(store.get(EMPLOYEES, employee).await.unwrap().is_none(), "{name}");
        assert!(store.get(IDENTIFIERS, identifier).await.unwrap().is_some(), "{name}");
    }
}

#[tokio::test]
async fn unique_index_rejects_duplicates_without_side_effects() {
    for Fixture { name, store, .. } in fixtures().await {
        store.put(SHIFTS, record(json!({"code": "D", "name": "Day"}))).await.unwrap();
        let err = store
            .put(SHIFTS, record(json!({"code": "D", "name": "Duplicate"})))
            .await
            .unwrap_err();
        match err {
            StoreError::UniqueConstraintViolation {
                index, existing, ..
            } => {
                assert_eq!(index, "code", "{name}");
                assert_eq!(existing, RecordKey(1), "{name}");
            }
            other => panic!("{name}: unexpected error: {other}"),
        }
        assert_eq!(store.count(SHIFTS).await.unwrap(), 1, "{name}");
        assert!(store
            .get_by_index(SHIFTS, "name", &json!("Duplicate"))
            .await
            .unwrap()
            .is_empty());
    }
}

#[tokio::test]
async fn composite_uniqueness_names_the_index() {
    for Fixture { name, store, .. } in fixtures().await {
        store
            .put(IDENTIFIERS, record(json!({"employeeId": 5, "shiftId": 2, "canWork": true})))
            .await
            .unwrap();
        let err = store
            .put(IDENTIFIERS, record(json!({"employeeId": 5, "shiftId": 2, "canWork": false})))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, StoreError::UniqueConstraintViolation { index, .. } if index == IDENTIFIER_EMPLOYEE_SHIFT),
            "{name}: {err}"
        );

        // A different pair, or the same pair for a schedule day, is fine.
        store
            .put(IDENTIFIERS, record(json!({"employeeId": 5, "shiftId": 3})))
            .await
            .unwrap();
        let err = store
            .put_many(
                SCHEDULES,
                vec![
                    record(json!({"date": "2024-03-01", "employeeId": 5, "shiftId": 2})),
                    record(json!({"date": "2024-03-02", "employeeId": 5, "shiftId": 2})),
                    record(json!({"date": "2024-03-01", "employeeId": 5, "shiftId": 3})),
                ],
            )
            .await
            .unwrap_err();
        assert!(
            matches!(&err, StoreError::UniqueConstraintViolation { index, .. } if index == SCHEDULE_DATE_EMPLOYEE),
            "{name}: {err}"
        );
        assert_eq!(store.count(SCHEDULES).await.unwrap(), 0, "{name}");
    }
}

#[tokio::test]
async fn index_lookup_returns_exactly_matching_records() {
    for Fixture { name, store, .. } in fixtures().await {
        let keys = store
            .put_many(
                EMPLOYEES,
                (0..12)
                    .map(|i| record(json!({"number": format!("{i:03}"), "deptId": i % 3})))
                    .collect(),
            )
            .await
            .unwrap();
        assert_eq!(keys.len(), 12);
        store
            .put(SCHEDULES, record(json!({"date": "2024-03-01", "employeeId": 1, "deptId": 1})))
            .await
            .unwrap();

        let dept_one = store.get_by_index(EMPLOYEES, "deptId", &json!(1)).await.unwrap();
        let expected: Vec<Record> = store
            .get_all(EMPLOYEES)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.get("deptId") == Some(&json!(1)))
            .collect();
        assert_eq!(dept_one, expected, "{name}");
        assert_eq!(dept_one.len(), 4, "{name}");

        // 1 and 1.0 are the same index key.
        assert_eq!(
            store.get_by_index(EMPLOYEES, "deptId", &json!(1.0)).await.unwrap().len(),
            4,
            "{name}"
        );
        assert!(store
            .get_by_index(EMPLOYEES, "deptId", &json!("1"))
            .await
            .unwrap()
            .is_empty());
    }
}

#[tokio::test]
async fn delete_retires_index_entries() {
    for Fixture { name, store, .. } in fixtures().await {
        let keys = store
            .put_many(
                SHIFTS,
                vec![record(json!({"code": "D"})), record(json!({"code": "N"}))],
            )
            .await
            .unwrap();
        store.delete(SHIFTS, keys[0]).await.unwrap();
        store.delete(SHIFTS, keys[0]).await.unwrap();

        assert!(store.get(SHIFTS, keys[0]).await.unwrap().is_none(), "{name}");
        assert!(store
            .get_by_index(SHIFTS, "code", &json!("D"))
            .await
            .unwrap()
            .is_empty());

        store.delete_many(SHIFTS, &[keys[1], RecordKey(42)]).await.unwrap();
        assert_eq!(store.count(SHIFTS).await.unwrap(), 0, "{name}");
    }
}

#[tokio::test]
async fn clear_keeps_collection_usable() {
    for Fixture { name, store, .. } in fixtures().await {
        store
            .put_many(
                SHIFTS,
                vec![record(json!({"code": "D"})), record(json!({"code": "N"}))],
            )
            .await
            .unwrap();
        store.clear(SHIFTS).await.unwrap();
        assert!(store.get_all(SHIFTS).await.unwrap().is_empty(), "{name}");

        let key = store.put(SHIFTS, record(json!({"code": "D"}))).await.unwrap();
        assert_eq!(key, RecordKey(3), "{name}");
        let found = store.get_by_index(SHIFTS, "code", &json!("D")).await.unwrap();
        assert_eq!(found.len(), 1, "{name}");
    }
}

#[tokio::test]
async fn export_import_round_trip() {
    for Fixture { name, store, .. } in fixtures().await {
        store.ensure_shift_orders().await.unwrap();
        store.put(ORGANIZATIONS, record(json!({"name": "Org1", "code": "O1"}))).await.unwrap();
        store
            .put_many(
                EMPLOYEES,
                vec![
                    record(json!({"number": "001", "name": "Zhang", "active": true})),
                    record(json!({"number": "002", "name": "Li", "hired": "2023-09-01"})),
                ],
            )
            .await
            .unwrap();
        store
            .put(IDENTIFIERS, record(json!({"employeeId": 1, "shiftId": 1, "canWork": true})))
            .await
            .unwrap();
        store
            .put(
                SHIFT_ORDERS,
                record(json!({"position": "nurse", "shiftCode": "D", "department": "ER"})),
            )
            .await
            .unwrap();

        let before = store.export_all().await.unwrap();
        let json = before.to_json_pretty().unwrap();

        store.clear(EMPLOYEES).await.unwrap();
        store.put(EMPLOYEES, record(json!({"number": "999"}))).await.unwrap();

        store.import_all(Snapshot::from_json_str(&json).unwrap()).await.unwrap();
        let after = store.export_all().await.unwrap();

        assert_eq!(
            before.collections.keys().collect::<Vec<_>>(),
            after.collections.keys().collect::<Vec<_>>(),
            "{name}"
        );
        for (collection, records) in &before.collections {
            assert_eq!(
                contents(records),
                contents(&after.collections[collection]),
                "{name}: {collection}"
            );
        }
        assert!(store.identifier_for(1, 1).await.unwrap().is_some(), "{name}");
    }
}

#[tokio::test]
async fn rejected_import_leaves_store_unchanged() {
    for Fixture { name, store, .. } in fixtures().await {
        store.put(SHIFTS, record(json!({"code": "D"}))).await.unwrap();
        let before = store.export_all().await.unwrap();

        let snapshot = Snapshot::new()
            .with_collection(SHIFTS, vec![record(json!({"code": "X"}))])
            .with_collection(
                EMPLOYEES,
                vec![record(json!({"number": "1"})), record(json!({"number": "1"}))],
            );
        let err = store.import_all(snapshot).await.unwrap_err();
        assert!(
            matches!(&err, StoreError::ImportRejected { collection, .. } if collection == EMPLOYEES),
            "{name}: {err}"
        );

        let after = store.export_all().await.unwrap();
        assert_eq!(before.collections, after.collections, "{name}");
    }
}

#[tokio::test]
async fn import_validates_with_the_live_key_generator() {
    for Fixture { name, store, .. } in fixtures().await {
        for code in ["A", "B", "C", "D"] {
            store.put(SHIFTS, record(json!({"code": code}))).await.unwrap();
        }
        store.put(EMPLOYEES, record(json!({"number": "keep"}))).await.unwrap();

        // The keyless shift is given key 5, so key 1 is a second "X".
        let snapshot = Snapshot::new()
            .with_collection(EMPLOYEES, vec![record(json!({"number": "new"}))])
            .with_collection(
                SHIFTS,
                vec![record(json!({"code": "X"})), record(json!({"id": 1, "code": "X"}))],
            );
        let err = store.import_all(snapshot).await.unwrap_err();
        assert!(
            matches!(&err, StoreError::ImportRejected { collection, .. } if collection == SHIFTS),
            "{name}: {err}"
        );

        let employees = store.get_all(EMPLOYEES).await.unwrap();
        assert_eq!(employees.len(), 1, "{name}");
        assert_eq!(employees[0].get("number"), Some(&json!("keep")), "{name}");
        assert_eq!(store.count(SHIFTS).await.unwrap(), 4, "{name}");
    }
}

#[tokio::test]
async fn largest_key_exhausts_the_generator() {
    for Fixture { name, store, .. } in fixtures().await {
        let last = RecordKey(i64::MAX);
        assert_eq!(
            store.put(SHIFTS, record(json!({"id": i64::MAX, "code": "A"}))).await.unwrap(),
            last,
            "{name}"
        );

        let err = store.put(SHIFTS, record(json!({"code": "B"}))).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }), "{name}: {err}");
        assert_eq!(store.count(SHIFTS).await.unwrap(), 1, "{name}");
        let kept = store.get(SHIFTS, last).await.unwrap().unwrap();
        assert_eq!(kept.get("code"), Some(&json!("A")), "{name}");

        // Explicit keys still work.
        assert_eq!(
            store.put(SHIFTS, record(json!({"id": 2, "code": "C"}))).await.unwrap(),
            RecordKey(2),
            "{name}"
        );
    }
}

#[tokio::test]
async fn exhausted_generator_survives_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::sqlite(dir.path().join("roster.db").to_string_lossy());

    let store = Store::open(&config, &scheduling_schema()).await.unwrap();
    store
        .put(SHIFTS, record(json!({"id": i64::MAX, "code": "A"})))
        .await
        .unwrap();
    store.close().await;

    let store = Store::open(&config, &scheduling_schema()).await.unwrap();
    let err = store.put(SHIFTS, record(json!({"code": "B"}))).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidKey { .. }), "{err}");
    assert_eq!(store.count(SHIFTS).await.unwrap(), 1);
}

#[tokio::test]
async fn closed_store_fails_with_store_closed() {
    for Fixture { name, store, .. } in fixtures().await {
        let shared = store.clone();
        store.close().await;
        assert!(
            matches!(shared.count(SHIFTS).await, Err(StoreError::StoreClosed)),
            "{name}"
        );
        assert!(matches!(
            shared.import_all(Snapshot::new()).await,
            Err(StoreError::StoreClosed)
        ));
    }
}

#[tokio::test]
async fn sqlite_store_persists_and_migrates_additively() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::sqlite(dir.path().join("roster.db").to_string_lossy());

    let mut older = scheduling_schema();
    older.version = 4;
    for collection in &mut older.collections {
        if collection.name == EMPLOYEES {
            collection.indexes.retain(|index| index.name != "deptId");
        }
    }

    let store = Store::open(&config, &older).await.unwrap();
    store
        .put_many(
            EMPLOYEES,
            vec![
                record(json!({"number": "001", "deptId": 7})),
                record(json!({"number": "002", "deptId": 8})),
            ],
        )
        .await
        .unwrap();
    store.close().await;

    let store = Store::open(&config, &scheduling_schema()).await.unwrap();
    assert_eq!(store.schema_version().await.unwrap(), Some(5));
    let found = store.get_by_index(EMPLOYEES, "deptId", &json!(7)).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("number"), Some(&json!("001")));
    assert_eq!(
        store.put(EMPLOYEES, record(json!({"number": "003"}))).await.unwrap(),
        RecordKey(3)
    );
    store.close().await;

    let err = Store::open(&config, &older).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::SchemaVersion {
            persisted: 5,
            requested: 4
        }
    ));
}

#[tokio::test]
async fn unopenable_medium_is_unavailable() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("roster.db");
    let err = Store::open(&StoreConfig::sqlite(path.to_string_lossy()), &scheduling_schema())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::StoreUnavailable { .. }), "{err}");
}
