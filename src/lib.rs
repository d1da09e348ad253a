//! sqlhost: a SQLite parameter-binding and result-marshalling layer for
//! embedding in host scripting runtimes.
//!
//! Native callers use [`Connection`] and [`Statement`] directly. A host
//! runtime drives the same operations through the [`Runtime`] object heap,
//! which exposes the `sqlite3.db` and `sqlite3.stmt` object kinds.

// Core infrastructure modules
pub mod config;
pub mod core;

// Host-facing modules
pub mod host;

pub use crate::core::db::{
    BindArgs, Connection, OpenOptions, Row, Rows, Statement, StatementState, TxOutcome,
};
pub use crate::core::{Result, SqlHostError};
pub use crate::host::{HostTable, HostValue, LocalScope, Runtime};

#[cfg(test)]
mod test_utils;
