//! File-backed database tests
//!
//! Visibility of committed and rolled-back work across independent
//! connections, open flags, and open failures.

use insta::assert_snapshot;
use sqlhost::config::Config;
use sqlhost::{BindArgs, Connection, HostValue, OpenOptions, SqlHostError, TxOutcome};
use tempfile::TempDir;

fn database(dir: &TempDir) -> String {
    dir.path().join("store.db").to_str().unwrap().to_string()
}

fn count(conn: &Connection) -> i64 {
    conn.query_one("SELECT count(*) AS n FROM items", BindArgs::NONE)
        .unwrap()
        .value("n")
        .as_integer()
        .unwrap()
}

#[test]
fn test_committed_transaction_visible_to_other_connection() {
    let dir = TempDir::new().unwrap();
    let path = database(&dir);

    let writer = Connection::open(&path).unwrap();
    writer
        .execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .unwrap();

    let outcome = writer
        .transaction(|tx| {
            for name in ["bolt", "nut", "washer"] {
                tx.update("INSERT INTO items (name) VALUES (?)", &[HostValue::from(name)])?;
            }
            Ok::<_, SqlHostError>(())
        })
        .unwrap();
    assert!(outcome.is_committed());

    let reader = Connection::open(&path).unwrap();
    assert_eq!(count(&reader), 3);
}

#[test]
fn test_rolled_back_transaction_invisible_to_other_connection() {
    let dir = TempDir::new().unwrap();
    let path = database(&dir);

    let writer = Connection::open(&path).unwrap();
    writer
        .execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             INSERT INTO items (name) VALUES ('bolt');",
        )
        .unwrap();

    let outcome = writer
        .transaction(|tx| {
            tx.update("INSERT INTO items (name) VALUES ('nut')", BindArgs::NONE)?;
            // NOT NULL violation aborts the body.
            tx.update("INSERT INTO items (name) VALUES (?)", &[HostValue::Nil])
        })
        .unwrap();

    let err = match outcome {
        TxOutcome::RolledBack(err) => err,
        TxOutcome::Committed(_) => panic!("Expected rollback"),
    };
    assert_snapshot!(err.to_string(), @"step failed: NOT NULL constraint failed: items.name");

    let reader = Connection::open(&path).unwrap();
    assert_eq!(count(&reader), 1);
    assert_eq!(count(&writer), 1);
}

#[test]
fn test_statements_survive_reopen_of_other_connection() {
    let dir = TempDir::new().unwrap();
    let path = database(&dir);

    let first = Connection::open(&path).unwrap();
    first
        .execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .unwrap();
    let mut insert = first
        .prepare("INSERT INTO items (name) VALUES (?)", &[HostValue::from("a")])
        .unwrap();
    assert_eq!(insert.update().unwrap(), 1);

    let mut second = Connection::open(&path).unwrap();
    assert_eq!(count(&second), 1);
    second.close();

    insert.reset().unwrap();
    insert.bind(&[HostValue::from("b")]).unwrap();
    assert_eq!(insert.update().unwrap(), 1);
    assert_eq!(count(&first), 2);
}

#[test]
fn test_read_only_from_config() {
    let dir = TempDir::new().unwrap();
    let path = database(&dir);
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .unwrap();
    }

    let config = Config::from_toml_str("[sqlite]\nread_only = true\n").unwrap();
    let conn = Connection::open_with(&path, &config.open_options()).unwrap();
    assert_eq!(count(&conn), 0);

    let err = conn
        .update("INSERT INTO items (name) VALUES ('x')", BindArgs::NONE)
        .unwrap_err();
    assert_eq!(err.engine_code(), Some(rusqlite::ErrorCode::ReadOnly));
}

#[test]
fn test_open_failure_reports_source() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("no_such_dir").join("store.db");
    let missing = missing.to_str().unwrap();

    let err = Connection::open(missing).unwrap_err();
    assert!(matches!(err, SqlHostError::Open { .. }));
    assert_eq!(err.to_string(), format!("{}: unable to open database file", missing));

    let options = OpenOptions {
        create: false,
        ..OpenOptions::default()
    };
    let err = Connection::open_with(&database(&dir), &options).unwrap_err();
    assert_eq!(err.engine_code(), Some(rusqlite::ErrorCode::CannotOpen));
}

#[test]
fn test_uri_source() {
    let dir = TempDir::new().unwrap();
    let path = database(&dir);
    let uri = format!("file:{}?mode=rwc", path);

    let conn = Connection::open(&uri).unwrap();
    conn.execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)")
        .unwrap();
    assert_eq!(conn.source(), uri);
    assert!(conn.filename().unwrap().ends_with("store.db"));
    assert_eq!(conn.to_string(), format!("sqlite3: {}", conn.filename().unwrap()));
}
