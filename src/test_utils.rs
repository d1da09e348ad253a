/// # Test Utilities Module
///
/// Shared testing infrastructure for sqlhost.
///
/// This module provides:
/// - Isolated in-memory database fixtures with a sample schema
/// - A host runtime fixture with an open `sqlite3.db` object
/// - SqlHostError-specific assertion helpers
/// - Tracing output routed through the test harness
use crate::core::db::{BindArgs, Connection};
use crate::core::Result;
use crate::host::{HostTable, HostValue, LocalScope, Runtime};
use std::sync::Once;

/// Installs a fmt subscriber writing through the test harness, once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    });
}

/// Isolated database test fixture
pub struct DatabaseFixture {
    pub name: String,
    pub connection: Connection,
}

impl DatabaseFixture {
    /// Create a new empty in-memory database
    pub fn new(name: &str) -> Result<Self> {
        init_tracing();
        let connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(DatabaseFixture {
            name: name.to_string(),
            connection,
        })
    }

    /// Create fixture with sample data schema
    pub fn with_sample_data(name: &str) -> Result<Self> {
        let fixture = Self::new(name)?;
        fixture.setup_standard_schema()?;
        fixture.populate_sample_data()?;
        Ok(fixture)
    }

    /// Set up standard test schema
    pub fn setup_standard_schema(&self) -> Result<()> {
        self.connection.execute_batch(
            "
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                score REAL,
                avatar BLOB
            );

            CREATE TABLE posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );
        ",
        )
    }

    /// Populate with sample data through the binder
    pub fn populate_sample_data(&self) -> Result<()> {
        let users = [
            ("alice", "alice@example.com", Some(9.5)),
            ("bob", "bob@example.com", None),
            ("charlie", "charlie@example.com", Some(7.25)),
        ];
        for (username, email, score) in users {
            let args = [HostValue::from(username), HostValue::from(email), HostValue::from(score)];
            self.connection.update(
                "INSERT INTO users (username, email, score) VALUES (?, ?, ?)",
                &args,
            )?;
        }

        let posts = [(1, "Welcome to Rust"), (2, "My Trip to Paris"), (1, "Binding SQLite")];
        for (user_id, title) in posts {
            let mut row = HostTable::new();
            row.set_field("user_id", user_id);
            row.set_field("title", title);
            self.connection
                .update("INSERT INTO posts (user_id, title) VALUES (:user_id, :title)", &row)?;
        }

        Ok(())
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: &str) -> Result<i64> {
        let row = self
            .connection
            .query_one(&format!("SELECT count(*) AS n FROM {table}"), BindArgs::NONE)?;
        Ok(row.value("n").as_integer().unwrap_or_default())
    }
}

/// Host runtime with one open database object.
pub struct RuntimeFixture {
    pub runtime: Runtime,
    pub db: HostValue,
}

impl RuntimeFixture {
    pub fn new() -> Result<Self> {
        init_tracing();
        let mut runtime = Runtime::new();
        let db = runtime.open(":memory:")?;
        Ok(RuntimeFixture { runtime, db })
    }

    /// `db:method(args...)` with an empty local scope.
    pub fn db_call(&mut self, method: &str, args: &[HostValue]) -> Result<Vec<HostValue>> {
        let db = self.db.clone();
        self.runtime.call_method(&db, method, args, &LocalScope::new())
    }

    /// `target:method(args...)` with an explicit local scope.
    pub fn call_with_scope(
        &mut self,
        target: &HostValue,
        method: &str,
        args: &[HostValue],
        scope: &LocalScope,
    ) -> Result<Vec<HostValue>> {
        self.runtime.call_method(target, method, args, scope)
    }
}

/// Error testing utilities specific to SqlHostError patterns
pub mod error_testing {
    use std::fmt::Display;

    /// Verify error message quality (contains helpful information)
    pub fn verify_error_message_quality<T, E>(result: &std::result::Result<T, E>, context: &str)
    where
        E: Display,
    {
        if let Err(err) = result {
            let message = err.to_string();
            assert!(!message.is_empty(), "Error message should not be empty in {}", context);
            assert!(
                message.len() > 5,
                "Error message should be descriptive in {}: '{}'",
                context,
                message
            );
        } else {
            panic!("Expected error in {}", context);
        }
    }
}

#[macro_export]
macro_rules! assert_sqlhost_error {
    ($result:expr, $pattern:pat, $context:expr) => {
        match $result {
            Err($pattern) => {}
            Ok(_) => panic!("Expected {} error but got Ok in {}", stringify!($pattern), $context),
            Err(other) => panic!("Expected {} but got {:?} in {}", stringify!($pattern), other, $context),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlHostError;

    #[test]
    fn test_database_fixture_creation() {
        let fixture = DatabaseFixture::new("test_create").unwrap();
        assert_eq!(fixture.name, "test_create");
        assert!(fixture.connection.is_open());
    }

    #[test]
    fn test_sample_data_fixture() {
        let fixture = DatabaseFixture::with_sample_data("test_sample").unwrap();
        assert_eq!(fixture.count("users").unwrap(), 3);
        assert_eq!(fixture.count("posts").unwrap(), 3);
    }

    #[test]
    fn test_error_assertion_macro() {
        let result: Result<i32> = Err(SqlHostError::NoResults);
        assert_sqlhost_error!(result, SqlHostError::NoResults, "macro test");
    }

    #[test]
    fn test_error_message_quality() {
        let result: Result<()> = Err(SqlHostError::TooManyResults);
        error_testing::verify_error_message_quality(&result, "cardinality test");
    }
}
