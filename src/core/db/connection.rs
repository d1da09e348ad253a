/// Connection Management Module
///
/// This module provides database connection management: opening and
/// closing a database, the statement-producing conveniences (`prepare`,
/// `query`, `query_one`, `query_all`, `update`) and the savepoint-based
/// transaction wrapper.
///
/// A connection can be closed explicitly or by being dropped. Closing is
/// idempotent, and statements that outlive their connection can still be
/// finalized safely: the engine defers the actual close until the last
/// statement is released.
use std::cell::Cell;
use std::fmt;
use std::os::raw::c_int;
use std::rc::Rc;

use rusqlite::ffi;
use tracing::{debug, warn};

use super::binder::BindArgs;
use super::engine::RawDb;
use super::rows::{Row, Rows};
use super::statement::Statement;
use crate::core::{Result, SqlHostError};

/// Name of the savepoint wrapped around [`Connection::transaction`] bodies.
pub const SAVEPOINT_NAME: &str = "sqlhost_transaction";

/// Flags used when opening a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Open read-only; `create` is ignored when set
    pub read_only: bool,
    /// Create the database file if it does not exist
    pub create: bool,
    /// Interpret `file:` sources as URIs
    pub uri: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            read_only: false,
            create: true,
            uri: true,
        }
    }
}

impl OpenOptions {
    pub(crate) fn flags(&self) -> c_int {
        let mut flags = if self.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else if self.create {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        } else {
            ffi::SQLITE_OPEN_READWRITE
        };
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        flags
    }
}

/// State shared between a connection and the statements it prepared.
#[derive(Debug)]
pub(crate) struct Owner {
    path: String,
    open: Cell<bool>,
}

impl Owner {
    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.get()
    }
}

/// Result of a [`Connection::transaction`] call whose savepoint handling succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum TxOutcome<T, E> {
    /// The body returned `Ok`; its changes were released into the enclosing scope
    Committed(T),
    /// The body returned `Err`; its changes were rolled back
    RolledBack(E),
}

impl<T, E> TxOutcome<T, E> {
    pub fn is_committed(&self) -> bool {
        matches!(self, TxOutcome::Committed(_))
    }

    pub fn committed(self) -> Option<T> {
        match self {
            TxOutcome::Committed(value) => Some(value),
            TxOutcome::RolledBack(_) => None,
        }
    }

    pub fn into_result(self) -> std::result::Result<T, E> {
        match self {
            TxOutcome::Committed(value) => Ok(value),
            TxOutcome::RolledBack(err) => Err(err),
        }
    }
}

/// An open database plus the bookkeeping the binding layer needs.
pub struct Connection {
    db: Option<RawDb>,
    owner: Rc<Owner>,
    in_transaction: Cell<bool>,
}

impl Connection {
    /// Opens `path` read-write, creating the file if needed.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with(path, &OpenOptions::default())
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn open_with(path: &str, options: &OpenOptions) -> Result<Self> {
        let db = RawDb::open(path, options.flags()).map_err(|e| e.into_open(path))?;
        debug!(path, read_only = options.read_only, "opened database");

        Ok(Connection {
            db: Some(db),
            owner: Rc::new(Owner {
                path: path.to_string(),
                open: Cell::new(true),
            }),
            in_transaction: Cell::new(false),
        })
    }

    /// Closes the database. Calling it again, or dropping afterwards, is a no-op.
    pub fn close(&mut self) {
        if let Some(db) = self.db.take() {
            self.owner.open.set(false);
            drop(db);
            debug!(path = self.owner.path(), "closed database");
        }
    }

    pub fn is_open(&self) -> bool {
        self.db.is_some()
    }

    /// The source identifier the connection was opened with.
    pub fn source(&self) -> &str {
        self.owner.path()
    }

    /// Absolute filename reported by the engine; `None` for in-memory or closed.
    pub fn filename(&self) -> Option<String> {
        self.db.as_ref().and_then(RawDb::filename)
    }

    fn db(&self) -> Result<&RawDb> {
        self.db.as_ref().ok_or_else(|| SqlHostError::Closed {
            path: self.owner.path().to_string(),
        })
    }

    /// True when no explicit transaction or savepoint is open.
    pub fn is_autocommit(&self) -> Result<bool> {
        Ok(self.db()?.is_autocommit())
    }

    /// Rows changed by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> Result<i64> {
        Ok(self.db()?.changes())
    }

    /// Runs every statement in `sql`, discarding any rows.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.db()?.exec(sql).map_err(|e| e.into_step())
    }

    /// Compiles the first statement in `sql` and binds `args` to it.
    pub fn prepare<'a>(&self, sql: &str, args: impl Into<BindArgs<'a>>) -> Result<Statement> {
        let mut stmt = Statement::prepare(self.db()?, Rc::clone(&self.owner), sql)?;
        stmt.bind(args)?;
        Ok(stmt)
    }

    /// Prepares, binds and returns a lazy one-shot iterator that finalizes
    /// its statement when iteration ends.
    pub fn query<'a>(&self, sql: &str, args: impl Into<BindArgs<'a>>) -> Result<Rows<'static>> {
        Ok(Rows::one_shot(self.prepare(sql, args)?))
    }

    pub fn query_one<'a>(&self, sql: &str, args: impl Into<BindArgs<'a>>) -> Result<Row> {
        let mut stmt = self.prepare(sql, args)?;
        let result = stmt.query_one();
        stmt.finalize();
        result
    }

    pub fn query_all<'a>(&self, sql: &str, args: impl Into<BindArgs<'a>>) -> Result<Vec<Row>> {
        let mut stmt = self.prepare(sql, args)?;
        let result = stmt.query_all();
        stmt.finalize();
        result
    }

    /// Runs a non-row-producing statement and returns the change count.
    pub fn update<'a>(&self, sql: &str, args: impl Into<BindArgs<'a>>) -> Result<i64> {
        let mut stmt = self.prepare(sql, args)?;
        let result = stmt.update();
        stmt.finalize();
        result
    }

    /// Runs `body` inside a savepoint.
    ///
    /// `Ok` from the body releases the savepoint and yields
    /// [`TxOutcome::Committed`]. `Err` rolls back to and releases the
    /// savepoint and yields [`TxOutcome::RolledBack`] carrying the body's
    /// error unchanged, even if the rollback itself fails. A panic in the
    /// body rolls back before unwinding continues. The outer `Err` is
    /// reserved for failures to open or release the savepoint.
    pub fn transaction<T, E, F>(&self, body: F) -> Result<TxOutcome<T, E>>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
    {
        if self.in_transaction.get() {
            return Err(SqlHostError::NestedTransaction);
        }

        self.execute_batch(&format!("SAVEPOINT {SAVEPOINT_NAME}"))?;
        self.in_transaction.set(true);
        let guard = SavepointGuard {
            conn: self,
            armed: true,
        };

        match body(self) {
            Ok(value) => {
                guard.release()?;
                debug!(path = self.source(), "transaction committed");
                Ok(TxOutcome::Committed(value))
            }
            Err(err) => {
                guard.rollback();
                debug!(path = self.source(), "transaction rolled back");
                Ok(TxOutcome::RolledBack(err))
            }
        }
    }

    fn rollback_savepoint(&self) -> Result<()> {
        self.execute_batch(&format!(
            "ROLLBACK TO {SAVEPOINT_NAME}; RELEASE {SAVEPOINT_NAME}"
        ))
    }
}

/// Rolls the savepoint back unless it was explicitly released.
struct SavepointGuard<'c> {
    conn: &'c Connection,
    armed: bool,
}

impl SavepointGuard<'_> {
    fn release(mut self) -> Result<()> {
        self.conn
            .execute_batch(&format!("RELEASE {SAVEPOINT_NAME}"))?;
        self.armed = false;
        Ok(())
    }

    /// Rolls back, logging rather than returning a failure so the body's
    /// error is what reaches the caller.
    fn rollback(mut self) {
        self.armed = false;
        if let Err(e) = self.conn.rollback_savepoint() {
            warn!(error = %e, "failed to roll back savepoint");
        }
    }
}

impl Drop for SavepointGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.conn.rollback_savepoint() {
                warn!(error = %e, "failed to roll back savepoint");
            }
        }
        self.conn.in_transaction.set(false);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.owner.path())
            .field("open", &self.is_open())
            .finish()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_open() {
            return write!(f, "sqlite3: (closed)");
        }
        match self.filename() {
            Some(name) => write!(f, "sqlite3: {}", name),
            None => write!(f, "sqlite3: {}", self.owner.path()),
        }
    }
}
