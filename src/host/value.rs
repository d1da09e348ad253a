//! Host value exchange: the values a host scripting runtime passes into and
//! receives from the binding layer.

use std::collections::HashMap;
use std::fmt;

/// Identifier of a userdata object living in a host [`Runtime`](crate::host::Runtime) heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub(crate) usize);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "userdata#{}", self.0)
    }
}

/// A value on the host's call stack.
///
/// Integers and floats are distinct subtypes of the host number type.
/// Strings are byte sequences with no encoding assumption.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(Vec<u8>),
    Table(HostTable),
    /// Opaque reference to a host function, identified by name
    Function(String),
    Userdata(ObjectId),
}

impl HostValue {
    /// The host-visible type name, as reported in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Nil => "nil",
            HostValue::Boolean(_) => "boolean",
            HostValue::Integer(_) | HostValue::Number(_) => "number",
            HostValue::String(_) => "string",
            HostValue::Table(_) => "table",
            HostValue::Function(_) => "function",
            HostValue::Userdata(_) => "userdata",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HostValue::String(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The string contents, if this is a string holding valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            HostValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            HostValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&HostTable> {
        match self {
            HostValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<ObjectId> {
        match self {
            HostValue::Userdata(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Integer(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Integer(i64::from(value))
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Boolean(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.as_bytes().to_vec())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value.into_bytes())
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(value: Vec<u8>) -> Self {
        HostValue::String(value)
    }
}

impl From<&[u8]> for HostValue {
    fn from(value: &[u8]) -> Self {
        HostValue::String(value.to_vec())
    }
}

impl From<HostTable> for HostValue {
    fn from(value: HostTable) -> Self {
        HostValue::Table(value)
    }
}

impl From<ObjectId> for HostValue {
    fn from(value: ObjectId) -> Self {
        HostValue::Userdata(value)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(HostValue::Nil, Into::into)
    }
}

/// Shared `Nil` returned by lookups that find nothing.
pub(crate) static NIL: HostValue = HostValue::Nil;

/// Key of a host table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableKey {
    Index(i64),
    Name(String),
}

impl From<i64> for TableKey {
    fn from(value: i64) -> Self {
        TableKey::Index(value)
    }
}

impl From<&str> for TableKey {
    fn from(value: &str) -> Self {
        TableKey::Name(value.to_string())
    }
}

impl From<String> for TableKey {
    fn from(value: String) -> Self {
        TableKey::Name(value)
    }
}

/// Associative host structure keyed by integer index or string name.
///
/// Assigning `Nil` removes the key, so a present entry is never `Nil`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostTable {
    entries: HashMap<TableKey, HostValue>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        HostTable {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Builds a sequence table with `values` at indices `1..=n`.
    pub fn sequence<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<HostValue>,
    {
        let mut table = HostTable::new();
        for (i, value) in values.into_iter().enumerate() {
            table.set_index(i as i64 + 1, value);
        }
        table
    }

    pub fn get(&self, key: &TableKey) -> &HostValue {
        self.entries.get(key).unwrap_or(&NIL)
    }

    pub fn get_index(&self, index: i64) -> &HostValue {
        self.get(&TableKey::Index(index))
    }

    pub fn get_field(&self, name: &str) -> &HostValue {
        self.get(&TableKey::Name(name.to_string()))
    }

    pub fn set(&mut self, key: impl Into<TableKey>, value: impl Into<HostValue>) {
        let key = key.into();
        match value.into() {
            HostValue::Nil => {
                self.entries.remove(&key);
            }
            value => {
                self.entries.insert(key, value);
            }
        }
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<HostValue>) {
        self.set(TableKey::Name(name.to_string()), value);
    }

    pub fn set_index(&mut self, index: i64, value: impl Into<HostValue>) {
        self.set(TableKey::Index(index), value);
    }

    /// Appends at `len() + 1`.
    pub fn push(&mut self, value: impl Into<HostValue>) {
        let next = self.len() as i64 + 1;
        self.set_index(next, value);
    }

    /// Length of the 1-based sequence prefix.
    pub fn len(&self) -> usize {
        let mut n = 0;
        while self.entries.contains_key(&TableKey::Index(n as i64 + 1)) {
            n += 1;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries of any key kind.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TableKey, &HostValue)> {
        self.entries.iter()
    }

    /// Values of the sequence prefix in index order.
    pub fn sequence_values(&self) -> impl Iterator<Item = &HostValue> {
        (1..=self.len() as i64).map(move |i| self.get_index(i))
    }
}

impl<K: Into<TableKey>, V: Into<HostValue>> FromIterator<(K, V)> for HostTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = HostTable::new();
        for (k, v) in iter {
            table.set(k, v);
        }
        table
    }
}
