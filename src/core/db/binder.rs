/// Parameter Binding Module
///
/// Resolves a statement's parameters from one of three argument-supply modes
/// and binds each resolved value to the prepared statement.
///
/// ## Modes
///
/// - **Table**: one associative structure. Unnamed parameters (`?`, `?NNN`)
///   are looked up by their 1-based index, named ones (`:x`, `@x`, `$x`) by
///   the name with its sigil stripped. Missing keys bind NULL.
/// - **Positional**: a flat sequence. Missing trailing values bind NULL,
///   extra trailing values are ignored. Applied from the last index down to 1.
/// - **Locals**: an explicit [`LocalScope`] standing in for the caller's local
///   variables. Only named parameters are allowed.
///
/// Resolution runs to completion before the first engine call, so a type or
/// naming error never leaves a statement half bound.
use rusqlite::types::ValueRef;
use tracing::trace;

use super::convert::to_native;
use super::engine::RawStatement;
use crate::core::{Result, SqlHostError};
use crate::host::value::NIL;
use crate::host::{HostTable, HostValue, LocalScope};

/// The engine-facing side of a statement as seen by the binder.
pub(crate) trait ParameterTarget {
    fn parameter_count(&self) -> usize;
    fn parameter_name(&self, index: usize) -> Option<&str>;
    fn bind_value(&mut self, index: usize, value: ValueRef<'_>) -> Result<()>;
}

impl ParameterTarget for RawStatement {
    fn parameter_count(&self) -> usize {
        RawStatement::parameter_count(self)
    }

    fn parameter_name(&self, index: usize) -> Option<&str> {
        RawStatement::parameter_name(self, index)
    }

    fn bind_value(&mut self, index: usize, value: ValueRef<'_>) -> Result<()> {
        self.bind(index, value).map_err(|e| e.into_bind())
    }
}

/// Argument-supply mode for one bind.
#[derive(Debug, Clone, Copy)]
pub enum BindArgs<'a> {
    Table(&'a HostTable),
    Positional(&'a [HostValue]),
    Locals(&'a LocalScope),
}

impl<'a> BindArgs<'a> {
    /// No arguments: every parameter binds NULL.
    pub const NONE: BindArgs<'static> = BindArgs::Positional(&[]);

    /// Selects the mode from the shape of a host call's trailing arguments.
    ///
    /// No arguments selects caller-local binding over `scope`; a leading table
    /// selects table binding; anything else is positional.
    pub fn from_call(args: &'a [HostValue], scope: &'a LocalScope) -> Self {
        match args {
            [] => BindArgs::Locals(scope),
            [HostValue::Table(table), ..] => BindArgs::Table(table),
            _ => BindArgs::Positional(args),
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            BindArgs::Table(_) => "table",
            BindArgs::Positional(_) => "positional",
            BindArgs::Locals(_) => "locals",
        }
    }
}

impl<'a> From<&'a HostTable> for BindArgs<'a> {
    fn from(table: &'a HostTable) -> Self {
        BindArgs::Table(table)
    }
}

impl<'a> From<&'a [HostValue]> for BindArgs<'a> {
    fn from(values: &'a [HostValue]) -> Self {
        BindArgs::Positional(values)
    }
}

impl<'a, const N: usize> From<&'a [HostValue; N]> for BindArgs<'a> {
    fn from(values: &'a [HostValue; N]) -> Self {
        BindArgs::Positional(values)
    }
}

impl<'a> From<&'a Vec<HostValue>> for BindArgs<'a> {
    fn from(values: &'a Vec<HostValue>) -> Self {
        BindArgs::Positional(values)
    }
}

impl<'a> From<&'a LocalScope> for BindArgs<'a> {
    fn from(scope: &'a LocalScope) -> Self {
        BindArgs::Locals(scope)
    }
}

fn is_named(name: &str) -> bool {
    matches!(name.as_bytes().first(), Some(b':' | b'@' | b'$'))
}

/// Parameter name with its one-character sigil removed.
fn strip_sigil(name: &str) -> &str {
    name.get(1..).unwrap_or("")
}

/// Resolved values keyed by 1-based parameter index, in binding order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSet<'a> {
    slots: Vec<(usize, ValueRef<'a>)>,
}

impl<'a> ParameterSet<'a> {
    pub(crate) fn resolve<T>(target: &T, args: BindArgs<'a>) -> Result<Self>
    where
        T: ParameterTarget + ?Sized,
    {
        let count = target.parameter_count();
        let mut slots = Vec::with_capacity(count);

        match args {
            BindArgs::Table(table) => {
                for index in 1..=count {
                    let value = match target.parameter_name(index) {
                        Some(name) if !name.starts_with('?') => table.get_field(strip_sigil(name)),
                        _ => table.get_index(index as i64),
                    };
                    slots.push((index, to_native(index, value)?));
                }
            }
            BindArgs::Positional(values) => {
                for index in (1..=count).rev() {
                    let value = values.get(index - 1).unwrap_or(&NIL);
                    slots.push((index, to_native(index, value)?));
                }
            }
            BindArgs::Locals(scope) => {
                for index in 1..=count {
                    let name = match target.parameter_name(index) {
                        Some(name) if is_named(name) => strip_sigil(name),
                        _ => return Err(SqlHostError::UnnamedParameter { position: index }),
                    };
                    slots.push((index, to_native(index, scope.get(name))?));
                }
            }
        }

        Ok(ParameterSet { slots })
    }

    /// Binds every slot in order, stopping at the first engine failure.
    pub(crate) fn apply<T>(&self, target: &mut T) -> Result<()>
    where
        T: ParameterTarget + ?Sized,
    {
        for (index, value) in &self.slots {
            trace!(index, "binding parameter");
            target.bind_value(*index, *value)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The value resolved for the 1-based parameter `index`.
    pub fn get(&self, index: usize) -> Option<ValueRef<'a>> {
        self.slots.iter().find(|(i, _)| *i == index).map(|(_, v)| *v)
    }

    /// Slots in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, ValueRef<'a>)> + '_ {
        self.slots.iter().copied()
    }
}

/// Resolves `args` against `target` and binds the result.
pub(crate) fn bind_all<T>(target: &mut T, args: BindArgs<'_>) -> Result<()>
where
    T: ParameterTarget + ?Sized,
{
    let params = ParameterSet::resolve(&*target, args)?;
    trace!(mode = args.mode_name(), count = params.len(), "resolved parameters");
    params.apply(target)
}
