/// Statement Lifecycle Module
///
/// A [`Statement`] owns exactly one native prepared-statement handle and
/// drives it through `Prepared → Bound → Executing → Exhausted`, back to
/// `Prepared` via [`Statement::reset`], and finally to `Finalized`.
///
/// Finalization is idempotent. It happens on an explicit
/// [`Statement::finalize`] call or when the wrapper is dropped, whichever
/// comes first.
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::binder::{bind_all, BindArgs};
use super::connection::Owner;
use super::engine::{RawDb, RawStatement};
use super::rows::{self, Row, Rows};
use crate::core::{Result, SqlHostError};

/// Lifecycle state of a [`Statement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Compiled, no values bound; ready to bind
    Prepared,
    /// Values bound, not yet stepped
    Bound,
    /// At least one row has been produced
    Executing,
    /// End of results reached, or the last step failed; reset to run again
    Exhausted,
    /// Native handle released
    Finalized,
}

/// A prepared statement bound to the connection it was compiled on.
///
/// Not safe to iterate from two places at once: [`Statement::query`] borrows
/// the statement mutably for as long as the returned rows are alive.
pub struct Statement {
    raw: Option<RawStatement>,
    state: StatementState,
    owner: Rc<Owner>,
}

impl Statement {
    pub(crate) fn prepare(db: &RawDb, owner: Rc<Owner>, sql: &str) -> Result<Statement> {
        let (raw, tail) = db.prepare(sql).map_err(|e| e.into_prepare())?;

        let tail = tail.trim();
        if !tail.is_empty() {
            warn!(ignored = tail, "only the first SQL statement is compiled");
        }
        debug!(sql, "prepared statement");

        Ok(Statement {
            raw: Some(raw),
            state: StatementState::Prepared,
            owner,
        })
    }

    fn raw(&self) -> Result<&RawStatement> {
        self.raw.as_ref().ok_or(SqlHostError::Finalized)
    }

    /// The live handle, provided the owning connection is still open.
    fn live(&mut self) -> Result<&mut RawStatement> {
        let raw = self.raw.as_mut().ok_or(SqlHostError::Finalized)?;
        if !self.owner.is_open() {
            return Err(SqlHostError::Closed {
                path: self.owner.path().to_string(),
            });
        }
        Ok(raw)
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    pub fn is_finalized(&self) -> bool {
        self.raw.is_none()
    }

    /// Source identifier of the connection this statement was prepared on.
    pub fn database(&self) -> &str {
        self.owner.path()
    }

    pub fn parameter_count(&self) -> Result<usize> {
        Ok(self.raw()?.parameter_count())
    }

    /// Engine-reported name of the 1-based parameter, sigil included.
    pub fn parameter_name(&self, index: usize) -> Result<Option<String>> {
        Ok(self.raw()?.parameter_name(index).map(str::to_string))
    }

    pub fn column_names(&self) -> Result<Vec<String>> {
        let raw = self.raw()?;
        Ok((0..raw.column_count()).map(|i| raw.column_name(i)).collect())
    }

    pub fn sql(&self) -> Result<String> {
        Ok(self.raw()?.sql())
    }

    /// Binds a fresh parameter set.
    ///
    /// Only valid in the `Prepared` state, i.e. straight after preparation or
    /// after [`Statement::reset`]. On failure no values remain bound.
    pub fn bind<'a>(&mut self, args: impl Into<BindArgs<'a>>) -> Result<()> {
        match self.state {
            StatementState::Prepared => {}
            StatementState::Finalized => return Err(SqlHostError::Finalized),
            state => {
                return Err(SqlHostError::InvalidState {
                    operation: "bind",
                    state,
                })
            }
        }

        let raw = self.live()?;
        if let Err(e) = bind_all(&mut *raw, args.into()) {
            raw.clear_bindings();
            return Err(e);
        }
        self.state = StatementState::Bound;
        Ok(())
    }

    /// Clears bound values and the execution cursor, returning to `Prepared`.
    pub fn reset(&mut self) -> Result<()> {
        let raw = self.live()?;
        raw.reset();
        raw.clear_bindings();
        self.state = StatementState::Prepared;
        trace!("statement reset");
        Ok(())
    }

    /// Rewinds the cursor while keeping bound values.
    pub(crate) fn rewind(&mut self) {
        if let Some(raw) = self.raw.as_mut() {
            raw.reset();
            self.state = StatementState::Bound;
        }
    }

    /// Releases the native handle. Safe to call any number of times.
    pub fn finalize(&mut self) {
        if self.raw.take().is_some() {
            debug!(database = self.owner.path(), "statement finalized");
        }
        self.state = StatementState::Finalized;
    }

    /// Advances one row.
    ///
    /// Returns `Ok(None)` at end of results. Once exhausted the statement
    /// keeps returning `Ok(None)` until it is reset.
    pub fn step(&mut self) -> Result<Option<Row>> {
        match self.state {
            StatementState::Finalized => return Err(SqlHostError::Finalized),
            StatementState::Exhausted => return Ok(None),
            _ => {}
        }

        let raw = self.live()?;
        match raw.step() {
            Ok(true) => {
                let row = Row::read(raw);
                self.state = StatementState::Executing;
                trace!(columns = row.len(), "step produced a row");
                Ok(Some(row))
            }
            Ok(false) => {
                self.state = StatementState::Exhausted;
                Ok(None)
            }
            Err(e) => {
                self.state = StatementState::Exhausted;
                Err(e.into_step())
            }
        }
    }

    /// Lazy, pull-based rows. The statement stays live when they run out.
    pub fn query(&mut self) -> Result<Rows<'_>> {
        self.raw()?;
        Ok(Rows::borrowed(self))
    }

    /// Exactly one row; zero rows is `NoResults`, more than one `TooManyResults`.
    pub fn query_one(&mut self) -> Result<Row> {
        rows::collect_one(self)
    }

    /// Every remaining row in engine order; possibly empty.
    pub fn query_all(&mut self) -> Result<Vec<Row>> {
        rows::collect_all(self)
    }

    /// Runs a statement that produces no rows and returns the engine's change count.
    ///
    /// An exhausted statement has already run; it must be reset first.
    pub fn update(&mut self) -> Result<i64> {
        if self.state == StatementState::Exhausted {
            return Err(SqlHostError::InvalidState {
                operation: "update",
                state: self.state,
            });
        }
        match self.step()? {
            Some(_) => {
                self.rewind();
                Err(SqlHostError::ReturnedRows)
            }
            None => Ok(self.raw()?.changes()),
        }
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("state", &self.state)
            .field("database", &self.owner.path())
            .finish()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw {
            Some(raw) => write!(f, "sqlite3.stmt: {}", raw.sql()),
            None => write!(f, "sqlite3.stmt: (finalized)"),
        }
    }
}
