//! Binding registration and the host object heap.
//!
//! The two object kinds, `sqlite3.db` and `sqlite3.stmt`, are described
//! once per process by a [`TypeDescriptor`] holding the kind's operation
//! table. A [`Runtime`] owns the live userdata objects, dispatches method
//! calls through those tables, and runs each kind's `__gc` finalizer when
//! the host collects an object or the runtime itself goes away.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::core::db::{BindArgs, Connection, OpenOptions, Row, Statement};
use crate::core::{Result, SqlHostError};
use crate::host::{HostTable, HostValue, LocalScope, ObjectId};

/// Type name of connection objects.
pub const DB_TYPE: &str = "sqlite3.db";
/// Type name of statement objects.
pub const STMT_TYPE: &str = "sqlite3.stmt";

/// A host-callable operation on an object of one kind.
///
/// Receives the runtime, the target object, the call's arguments (excluding
/// the target itself) and the caller's local scope.
pub type Method = fn(&mut Runtime, ObjectId, &[HostValue], &LocalScope) -> Result<Vec<HostValue>>;

/// A module-level host function.
pub type Function = fn(&mut Runtime, &[HostValue]) -> Result<Vec<HostValue>>;

/// Operation table of one object kind.
pub struct TypeDescriptor {
    name: &'static str,
    methods: HashMap<&'static str, Method>,
}

impl TypeDescriptor {
    fn new(name: &'static str, methods: &[(&'static str, Method)]) -> Self {
        TypeDescriptor {
            name,
            methods: methods.iter().copied().collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn method(&self, name: &str) -> Option<Method> {
        self.methods.get(name).copied()
    }

    /// Operation names, sorted.
    pub fn method_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.methods.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Everything the binding layer exposes to the host.
pub struct Registry {
    db: TypeDescriptor,
    stmt: TypeDescriptor,
    functions: HashMap<&'static str, Function>,
}

impl Registry {
    pub fn kind(&self, name: &str) -> Option<&TypeDescriptor> {
        match name {
            DB_TYPE => Some(&self.db),
            STMT_TYPE => Some(&self.stmt),
            _ => None,
        }
    }

    pub fn function(&self, name: &str) -> Option<Function> {
        self.functions.get(name).copied()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<_> = self.functions.keys().collect();
        functions.sort_unstable();
        f.debug_struct("Registry")
            .field("db", &self.db)
            .field("stmt", &self.stmt)
            .field("functions", &functions)
            .finish()
    }
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    debug!("registering {} and {}", DB_TYPE, STMT_TYPE);
    Registry {
        db: TypeDescriptor::new(
            DB_TYPE,
            &[
                ("prepare", db_prepare),
                ("query", db_query),
                ("queryone", db_query_one),
                ("queryall", db_query_all),
                ("update", db_update),
                ("close", db_close),
                ("__tostring", db_tostring),
                ("__gc", db_close),
            ],
        ),
        stmt: TypeDescriptor::new(
            STMT_TYPE,
            &[
                ("next", stmt_next),
                ("__call", stmt_next),
                ("bind", stmt_bind),
                ("reset", stmt_reset),
                ("queryone", stmt_query_one),
                ("queryall", stmt_query_all),
                ("update", stmt_update),
                ("finalize", stmt_finalize),
                ("__tostring", stmt_tostring),
                ("__gc", stmt_finalize),
            ],
        ),
        functions: HashMap::from([("open", open as Function)]),
    }
});

/// The process-wide registry, initialized on first use.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Payload of a host userdata object.
#[derive(Debug)]
pub enum Userdata {
    Db(Connection),
    Stmt {
        stmt: Statement,
        /// Finalizes itself when iteration reaches the end or fails
        one_shot: bool,
    },
}

impl Userdata {
    pub fn type_name(&self) -> &'static str {
        match self {
            Userdata::Db(_) => DB_TYPE,
            Userdata::Stmt { .. } => STMT_TYPE,
        }
    }
}

/// Host object heap.
pub struct Runtime {
    objects: HashMap<ObjectId, Userdata>,
    next_id: usize,
    options: OpenOptions,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_options(OpenOptions::default())
    }

    /// A runtime whose `open` uses `options` for every connection.
    pub fn with_options(options: OpenOptions) -> Self {
        Lazy::force(&REGISTRY);
        Runtime {
            objects: HashMap::new(),
            next_id: 1,
            options,
        }
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn type_of(&self, id: ObjectId) -> Option<&'static str> {
        self.objects.get(&id).map(Userdata::type_name)
    }

    pub fn get(&self, id: ObjectId) -> Option<&Userdata> {
        self.objects.get(&id)
    }

    fn insert(&mut self, data: Userdata) -> HostValue {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(id, data);
        HostValue::Userdata(id)
    }

    /// Calls a module-level function such as `open`.
    pub fn call_function(&mut self, name: &str, args: &[HostValue]) -> Result<Vec<HostValue>> {
        let function = REGISTRY
            .function(name)
            .ok_or_else(|| SqlHostError::HostCall(format!("attempt to call a nil value (field '{name}')")))?;
        function(self, args)
    }

    /// Shorthand for the module's `open(source)`.
    pub fn open(&mut self, source: &str) -> Result<HostValue> {
        let db = Connection::open_with(source, &self.options)?;
        Ok(self.insert(Userdata::Db(db)))
    }

    /// Dispatches `target:method(args...)` through the target kind's table.
    pub fn call_method(
        &mut self,
        target: &HostValue,
        method: &str,
        args: &[HostValue],
        scope: &LocalScope,
    ) -> Result<Vec<HostValue>> {
        let id = match target {
            HostValue::Userdata(id) => *id,
            other => {
                return Err(SqlHostError::HostCall(format!(
                    "attempt to index a {} value",
                    other.type_name()
                )))
            }
        };
        let kind = self
            .type_of(id)
            .and_then(|name| REGISTRY.kind(name))
            .ok_or_else(|| SqlHostError::HostCall(format!("{id} is no longer alive")))?;
        let handler = kind.method(method).ok_or_else(|| {
            SqlHostError::HostCall(format!(
                "attempt to call a nil value (method '{method}')"
            ))
        })?;
        handler(self, id, args, scope)
    }

    /// Host `tostring(target)`.
    pub fn tostring(&mut self, target: &HostValue) -> Result<String> {
        let result = self.call_method(target, "__tostring", &[], &LocalScope::new())?;
        Ok(result
            .first()
            .and_then(HostValue::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Host garbage collection of one object: runs its finalizer and frees it.
    ///
    /// Returns `false` if the object was already collected.
    pub fn collect(&mut self, id: ObjectId) -> bool {
        if !self.contains(id) {
            return false;
        }
        if let Err(e) = self.call_method(&HostValue::Userdata(id), "__gc", &[], &LocalScope::new()) {
            debug!(%id, error = %e, "finalizer failed");
        }
        self.objects.remove(&id);
        true
    }

    fn connection(&self, id: ObjectId, op: &str) -> Result<&Connection> {
        match self.objects.get(&id) {
            Some(Userdata::Db(db)) => Ok(db),
            other => Err(bad_self(op, DB_TYPE, other)),
        }
    }

    fn connection_mut(&mut self, id: ObjectId, op: &str) -> Result<&mut Connection> {
        match self.objects.get_mut(&id) {
            Some(Userdata::Db(db)) => Ok(db),
            other => Err(bad_self(op, DB_TYPE, other.map(|u| &*u))),
        }
    }

    fn statement(&mut self, id: ObjectId, op: &str) -> Result<(&mut Statement, bool)> {
        match self.objects.get_mut(&id) {
            Some(Userdata::Stmt { stmt, one_shot }) => Ok((stmt, *one_shot)),
            other => Err(bad_self(op, STMT_TYPE, other.map(|u| &*u))),
        }
    }

    /// A statement the host may rebind and re-run; one-shot query results are not.
    fn reusable_statement(&mut self, id: ObjectId, op: &str) -> Result<&mut Statement> {
        match self.statement(id, op)? {
            (_, true) => Err(SqlHostError::HostCall(format!(
                "cannot call '{op}' on a one-shot query result; use db:prepare for a reusable statement"
            ))),
            (stmt, false) => Ok(stmt),
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let mut ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        // Newest first, so statements go before the connections they came from.
        ids.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        for id in ids {
            self.collect(id);
        }
    }
}

fn bad_self(op: &str, expected: &str, got: Option<&Userdata>) -> SqlHostError {
    let got = got.map_or("no value", Userdata::type_name);
    SqlHostError::HostCall(format!("calling '{op}' on bad self ({expected} expected, got {got})"))
}

/// Argument `n` (1-based, as the host numbers it) as a string.
fn check_str<'a>(args: &'a [HostValue], n: usize, op: &str) -> Result<&'a str> {
    let value = args.get(n - 1).unwrap_or(&crate::host::value::NIL);
    value.as_str().ok_or_else(|| {
        SqlHostError::HostCall(format!(
            "bad argument #{n} to '{op}' (string expected, got {})",
            value.type_name()
        ))
    })
}

fn row_value(row: Row) -> HostValue {
    HostValue::Table(row.into_table())
}

fn rows_value(rows: Vec<Row>) -> HostValue {
    HostValue::Table(HostTable::sequence(rows.into_iter().map(Row::into_table)))
}

fn open(rt: &mut Runtime, args: &[HostValue]) -> Result<Vec<HostValue>> {
    let source = check_str(args, 1, "open")?;
    Ok(vec![rt.open(source)?])
}

fn db_prepare(rt: &mut Runtime, id: ObjectId, args: &[HostValue], scope: &LocalScope) -> Result<Vec<HostValue>> {
    let sql = check_str(args, 1, "prepare")?;
    let stmt = rt
        .connection(id, "prepare")?
        .prepare(sql, BindArgs::from_call(&args[1..], scope))?;
    Ok(vec![rt.insert(Userdata::Stmt { stmt, one_shot: false })])
}

fn db_query(rt: &mut Runtime, id: ObjectId, args: &[HostValue], scope: &LocalScope) -> Result<Vec<HostValue>> {
    let sql = check_str(args, 1, "query")?;
    let stmt = rt
        .connection(id, "query")?
        .prepare(sql, BindArgs::from_call(&args[1..], scope))?;
    Ok(vec![rt.insert(Userdata::Stmt { stmt, one_shot: true })])
}

fn db_query_one(rt: &mut Runtime, id: ObjectId, args: &[HostValue], scope: &LocalScope) -> Result<Vec<HostValue>> {
    let sql = check_str(args, 1, "queryone")?;
    let row = rt
        .connection(id, "queryone")?
        .query_one(sql, BindArgs::from_call(&args[1..], scope))?;
    Ok(vec![row_value(row)])
}

fn db_query_all(rt: &mut Runtime, id: ObjectId, args: &[HostValue], scope: &LocalScope) -> Result<Vec<HostValue>> {
    let sql = check_str(args, 1, "queryall")?;
    let rows = rt
        .connection(id, "queryall")?
        .query_all(sql, BindArgs::from_call(&args[1..], scope))?;
    Ok(vec![rows_value(rows)])
}

fn db_update(rt: &mut Runtime, id: ObjectId, args: &[HostValue], scope: &LocalScope) -> Result<Vec<HostValue>> {
    let sql = check_str(args, 1, "update")?;
    let changes = rt
        .connection(id, "update")?
        .update(sql, BindArgs::from_call(&args[1..], scope))?;
    Ok(vec![HostValue::Integer(changes)])
}

fn db_close(rt: &mut Runtime, id: ObjectId, _args: &[HostValue], _scope: &LocalScope) -> Result<Vec<HostValue>> {
    rt.connection_mut(id, "close")?.close();
    Ok(Vec::new())
}

fn db_tostring(rt: &mut Runtime, id: ObjectId, _args: &[HostValue], _scope: &LocalScope) -> Result<Vec<HostValue>> {
    let text = rt.connection(id, "__tostring")?.to_string();
    Ok(vec![HostValue::from(text)])
}

fn stmt_next(rt: &mut Runtime, id: ObjectId, _args: &[HostValue], _scope: &LocalScope) -> Result<Vec<HostValue>> {
    let (stmt, one_shot) = rt.statement(id, "next")?;
    let step = stmt.step();
    if one_shot && !matches!(step, Ok(Some(_))) {
        stmt.finalize();
    }
    match step? {
        Some(row) => Ok(vec![row_value(row)]),
        None => Ok(vec![HostValue::Nil]),
    }
}

fn stmt_bind(rt: &mut Runtime, id: ObjectId, args: &[HostValue], scope: &LocalScope) -> Result<Vec<HostValue>> {
    let stmt = rt.reusable_statement(id, "bind")?;
    stmt.bind(BindArgs::from_call(args, scope))?;
    Ok(vec![HostValue::Userdata(id)])
}

fn stmt_reset(rt: &mut Runtime, id: ObjectId, _args: &[HostValue], _scope: &LocalScope) -> Result<Vec<HostValue>> {
    let stmt = rt.reusable_statement(id, "reset")?;
    stmt.reset()?;
    Ok(vec![HostValue::Userdata(id)])
}

fn stmt_query_one(rt: &mut Runtime, id: ObjectId, _args: &[HostValue], _scope: &LocalScope) -> Result<Vec<HostValue>> {
    let stmt = rt.reusable_statement(id, "queryone")?;
    Ok(vec![row_value(stmt.query_one()?)])
}

fn stmt_query_all(rt: &mut Runtime, id: ObjectId, _args: &[HostValue], _scope: &LocalScope) -> Result<Vec<HostValue>> {
    let stmt = rt.reusable_statement(id, "queryall")?;
    Ok(vec![rows_value(stmt.query_all()?)])
}

fn stmt_update(rt: &mut Runtime, id: ObjectId, _args: &[HostValue], _scope: &LocalScope) -> Result<Vec<HostValue>> {
    let stmt = rt.reusable_statement(id, "update")?;
    Ok(vec![HostValue::Integer(stmt.update()?)])
}

fn stmt_finalize(rt: &mut Runtime, id: ObjectId, _args: &[HostValue], _scope: &LocalScope) -> Result<Vec<HostValue>> {
    let (stmt, _) = rt.statement(id, "finalize")?;
    stmt.finalize();
    Ok(Vec::new())
}

fn stmt_tostring(rt: &mut Runtime, id: ObjectId, _args: &[HostValue], _scope: &LocalScope) -> Result<Vec<HostValue>> {
    let (stmt, _) = rt.statement(id, "__tostring")?;
    Ok(vec![HostValue::from(stmt.to_string())])
}
