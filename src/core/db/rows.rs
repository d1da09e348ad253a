/// Row Iteration Module
///
/// Three ways of consuming a statement's results:
///
/// - [`Rows`]: lazy and pull-based, one row per `next()` call
/// - [`collect_one`]: exactly one row
/// - [`collect_all`]: every remaining row, buffered
///
/// Each row is a fresh column-name → value mapping. Duplicate column names
/// collapse with the later column winning, and NULL columns are simply
/// absent from the host table produced by [`Row::into_table`].
use std::iter::FusedIterator;

use tracing::trace;

use super::convert::to_host;
use super::engine::RawStatement;
use super::statement::Statement;
use crate::core::{Result, SqlHostError};
use crate::host::value::NIL;
use crate::host::{HostTable, HostValue};

/// One result row, columns in result order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, HostValue)>,
}

impl Row {
    pub(crate) fn read(raw: &RawStatement) -> Row {
        (0..raw.data_count())
            .map(|i| (raw.column_name(i), to_host(raw.column_value(i))))
            .collect()
    }

    /// Value of the named column. With duplicate names the last one wins.
    pub fn get(&self, name: &str) -> Option<&HostValue> {
        self.columns
            .iter()
            .rev()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Like [`Row::get`], but an absent column reads as `Nil`.
    pub fn value(&self, name: &str) -> &HostValue {
        self.get(name).unwrap_or(&NIL)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &HostValue> {
        self.columns.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Converts into the host-side representation of a row.
    pub fn into_table(self) -> HostTable {
        let mut table = HostTable::with_capacity(self.columns.len());
        for (name, value) in self.columns {
            table.set_field(&name, value);
        }
        table
    }
}

impl FromIterator<(String, HostValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, HostValue)>>(iter: I) -> Self {
        Row {
            columns: iter.into_iter().collect(),
        }
    }
}

enum Cursor<'s> {
    /// Owned by the iterator and finalized when it ends or fails
    OneShot(Statement),
    /// Caller's statement, left live when iteration ends
    Borrowed(&'s mut Statement),
}

impl Cursor<'_> {
    fn statement(&mut self) -> &mut Statement {
        match self {
            Cursor::OneShot(stmt) => stmt,
            Cursor::Borrowed(stmt) => &mut **stmt,
        }
    }
}

/// Lazy row iterator.
///
/// Yields `Ok(row)` per row and stops after the first `Err`. A one-shot
/// iterator (from a connection-level query) releases its statement as soon
/// as iteration finishes, fails, or the iterator is dropped.
pub struct Rows<'s> {
    cursor: Cursor<'s>,
    done: bool,
}

impl<'s> Rows<'s> {
    pub(crate) fn borrowed(stmt: &'s mut Statement) -> Self {
        Rows {
            cursor: Cursor::Borrowed(stmt),
            done: false,
        }
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(self.cursor, Cursor::OneShot(_))
    }

    fn finish(&mut self) {
        self.done = true;
        if let Cursor::OneShot(stmt) = &mut self.cursor {
            stmt.finalize();
        }
    }
}

impl Rows<'static> {
    pub(crate) fn one_shot(stmt: Statement) -> Self {
        Rows {
            cursor: Cursor::OneShot(stmt),
            done: false,
        }
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.statement().step() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                trace!("rows exhausted");
                self.finish();
                None
            }
            Err(e) => {
                self.finish();
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Rows<'_> {}

/// Steps `stmt` for exactly one row.
///
/// With more than one row available the cursor is rewound, bindings kept,
/// and `TooManyResults` returned.
pub fn collect_one(stmt: &mut Statement) -> Result<Row> {
    let row = stmt.step()?.ok_or(SqlHostError::NoResults)?;
    if stmt.step()?.is_some() {
        stmt.rewind();
        return Err(SqlHostError::TooManyResults);
    }
    Ok(row)
}

/// Steps `stmt` to the end, buffering every row.
pub fn collect_all(stmt: &mut Statement) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = stmt.step()? {
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::{BindArgs, Connection, StatementState};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE t (a INTEGER, b TEXT);
            INSERT INTO t VALUES (1, 'one');
            INSERT INTO t VALUES (2, NULL);
            INSERT INTO t VALUES (3, 'three');
        ",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_duplicate_columns_last_wins() {
        let conn = setup();
        let row = conn.query_one("SELECT 1 AS x, 2 AS x", BindArgs::NONE).unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("x"), Some(&HostValue::Integer(2)));

        let table = row.into_table();
        assert_eq!(table.entry_count(), 1);
        assert_eq!(table.get_field("x").as_integer(), Some(2));
    }

    #[test]
    fn test_null_columns_absent_from_table() {
        let conn = setup();
        let row = conn.query_one("SELECT a, b FROM t WHERE a = 2", BindArgs::NONE).unwrap();
        assert_eq!(row.get("b"), Some(&HostValue::Nil));
        assert_eq!(row.get("c"), None);

        let table = row.into_table();
        assert_eq!(table.entry_count(), 1);
        assert!(table.get_field("b").is_nil());
    }

    #[test]
    fn test_lazy_iteration_in_order() {
        let conn = setup();
        let mut stmt = conn.prepare("SELECT a FROM t ORDER BY a", BindArgs::NONE).unwrap();
        let mut rows = stmt.query().unwrap();
        assert!(!rows.is_one_shot());

        let first = rows.next().unwrap().unwrap();
        assert_eq!(first.value("a").as_integer(), Some(1));
        let rest: Vec<i64> = rows.map(|r| r.unwrap().value("a").as_integer().unwrap()).collect();
        assert_eq!(rest, vec![2, 3]);

        assert_eq!(stmt.state(), StatementState::Exhausted);
        assert!(!stmt.is_finalized());
    }

    #[test]
    fn test_one_shot_rows_finalize_at_end() {
        let conn = setup();
        let mut rows = conn.query("SELECT a FROM t", BindArgs::NONE).unwrap();
        assert!(rows.is_one_shot());
        assert_eq!(rows.by_ref().count(), 3);
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_step_error_ends_iteration() {
        let conn = setup();
        // abs() of the minimum integer overflows at step time.
        let mut rows = conn
            .query("SELECT abs(-9223372036854775807 - 1)", BindArgs::NONE)
            .unwrap();
        match rows.next() {
            Some(Err(SqlHostError::Step { .. })) => {}
            other => panic!("Expected Step error, got {:?}", other),
        }
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_collect_one_cardinality() {
        let conn = setup();
        let mut stmt = conn.prepare("SELECT a FROM t WHERE a > ?", &[HostValue::from(5)]).unwrap();
        assert!(matches!(collect_one(&mut stmt), Err(SqlHostError::NoResults)));

        let mut stmt = conn.prepare("SELECT a FROM t WHERE a > ?", &[HostValue::from(1)]).unwrap();
        assert!(matches!(collect_one(&mut stmt), Err(SqlHostError::TooManyResults)));
        // Rewound with bindings intact.
        assert_eq!(stmt.state(), StatementState::Bound);
        assert_eq!(collect_all(&mut stmt).unwrap().len(), 2);
    }

    #[test]
    fn test_collect_all_empty() {
        let conn = setup();
        let mut stmt = conn.prepare("SELECT a FROM t WHERE 0", BindArgs::NONE).unwrap();
        assert!(collect_all(&mut stmt).unwrap().is_empty());
    }
}
