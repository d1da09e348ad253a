/// Database Module
///
/// This module provides the statement lifecycle and marshalling layer,
/// organized into focused submodules.
///
/// ## Architecture
///
/// Leaf-first:
/// - **Engine boundary** (`engine.rs`): owned native database and statement handles
/// - **Value conversion** (`convert.rs`): host values to SQL scalars and back
/// - **Parameter binding** (`binder.rs`): the three argument-supply modes
/// - **Statement lifecycle** (`statement.rs`): prepare, bind, step, reset, finalize
/// - **Row iteration** (`rows.rs`): lazy, single-result and all-results reads
/// - **Connection management** (`connection.rs`): open/close, one-shot queries, transactions
///
/// ## Threading
///
/// Connections and statements hold raw engine handles and are neither `Send`
/// nor `Sync`. Every call runs to completion on the caller's thread.
pub mod binder;
pub mod connection;
pub mod convert;
mod engine;
pub mod rows;
pub mod statement;

pub use binder::{BindArgs, ParameterSet};
pub use connection::{Connection, OpenOptions, TxOutcome, SAVEPOINT_NAME};
pub use rows::{Row, Rows};
pub use statement::{Statement, StatementState};
