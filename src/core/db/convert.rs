/// Value Conversion Module
///
/// Bidirectional conversion between host values and SQL scalars.
///
/// Host → SQL:
/// - string → TEXT (bytes copied by the engine at bind time)
/// - integer → INTEGER (64-bit)
/// - float → REAL
/// - nil → NULL
/// - anything else → `UnsupportedType`, never a silent coercion
///
/// SQL → host:
/// - INTEGER → integer, REAL → float, NULL → nil
/// - TEXT and BLOB → string of the exact stored byte length
use rusqlite::types::ValueRef;

use crate::core::{Result, SqlHostError};
use crate::host::HostValue;

/// Converts the host value supplied for 1-based parameter `position`.
pub fn to_native(position: usize, value: &HostValue) -> Result<ValueRef<'_>> {
    match value {
        HostValue::String(bytes) => Ok(ValueRef::Text(bytes)),
        HostValue::Integer(i) => Ok(ValueRef::Integer(*i)),
        HostValue::Number(n) => Ok(ValueRef::Real(*n)),
        HostValue::Nil => Ok(ValueRef::Null),
        other => Err(SqlHostError::UnsupportedType {
            position,
            type_name: other.type_name(),
        }),
    }
}

/// Converts a column value read from the engine into an owned host value.
pub fn to_host(value: ValueRef<'_>) -> HostValue {
    match value {
        ValueRef::Integer(i) => HostValue::Integer(i),
        ValueRef::Real(f) => HostValue::Number(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => HostValue::String(bytes.to_vec()),
        ValueRef::Null => HostValue::Nil,
    }
}
