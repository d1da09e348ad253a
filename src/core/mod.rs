/// Core Module for sqlhost
///
/// This module contains the binding/marshalling core: the engine boundary,
/// value conversion, parameter binding, the statement lifecycle, row
/// iteration and connection management, together with the shared error type.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{Result, SqlHostError};
