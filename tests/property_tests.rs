//! Property-based tests for value conversion and parameter binding
//!
//! These tests verify, through property-based testing, that:
//! - Supported host values survive a trip through the engine unchanged
//! - Table, positional and caller-local binding resolve the same values
//! - Missing values always bind NULL

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use sqlhost::{BindArgs, Connection, HostTable, HostValue, LocalScope, Row};

    fn echo(conn: &Connection, args: BindArgs<'_>, sql: &str) -> Row {
        conn.query_one(sql, args).unwrap()
    }

    fn arb_scalar() -> impl Strategy<Value = HostValue> {
        prop_oneof![
            Just(HostValue::Nil),
            any::<i64>().prop_map(HostValue::Integer),
            any::<f64>()
                .prop_filter("NaN binds as NULL", |f| !f.is_nan())
                .prop_map(HostValue::Number),
            prop::collection::vec(any::<u8>(), 0..64).prop_map(HostValue::String),
        ]
    }

    fn select_list(n: usize, param: impl Fn(usize) -> String) -> String {
        let columns: Vec<String> = (1..=n).map(|i| format!("{} AS c{}", param(i), i)).collect();
        format!("SELECT {}", columns.join(", "))
    }

    proptest! {
        #[test]
        fn scalar_round_trip(value in arb_scalar()) {
            let conn = Connection::open_in_memory().unwrap();
            let args = [value.clone()];
            let row = echo(&conn, BindArgs::from(&args), "SELECT ? AS v");
            prop_assert_eq!(row.value("v"), &value);
        }

        #[test]
        fn binding_modes_agree(values in prop::collection::vec(arb_scalar(), 1..8)) {
            let conn = Connection::open_in_memory().unwrap();
            let n = values.len();

            let positional = echo(&conn, BindArgs::from(&values), &select_list(n, |_| "?".to_string()));

            let table: HostTable = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("p{}", i + 1), v.clone()))
                .collect();
            let named = echo(&conn, BindArgs::from(&table), &select_list(n, |i| format!(":p{}", i)));

            let scope: LocalScope = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("p{}", i + 1), v.clone()))
                .collect();
            let locals = echo(&conn, BindArgs::from(&scope), &select_list(n, |i| format!("@p{}", i)));

            prop_assert_eq!(&positional, &named);
            prop_assert_eq!(&named, &locals);
            for (i, value) in values.iter().enumerate() {
                let column = format!("c{}", i + 1);
                prop_assert_eq!(positional.value(&column), value);
            }
        }

        #[test]
        fn missing_positional_values_bind_null(
            values in prop::collection::vec(any::<i64>(), 0..4),
            extra in 1usize..4,
        ) {
            let conn = Connection::open_in_memory().unwrap();
            let args: Vec<HostValue> = values.iter().copied().map(HostValue::from).collect();
            let n = values.len() + extra;

            let row = echo(&conn, BindArgs::from(&args), &select_list(n, |_| "?".to_string()));
            prop_assert_eq!(row.len(), n);
            for i in values.len()..n {
                let column = format!("c{}", i + 1);
                prop_assert!(row.value(&column).is_nil(), "{} not NULL", column);
            }
        }

        #[test]
        fn table_index_lookup_for_unnamed(values in prop::collection::vec(any::<i64>(), 1..6)) {
            let conn = Connection::open_in_memory().unwrap();
            let table = HostTable::sequence(values.iter().copied());
            let row = echo(&conn, BindArgs::from(&table), &select_list(values.len(), |_| "?".to_string()));
            for (i, value) in values.iter().enumerate() {
                let column = format!("c{}", i + 1);
                prop_assert_eq!(row.value(&column).as_integer(), Some(*value));
            }
        }
    }
}
