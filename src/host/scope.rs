//! Explicit named-argument context.
//!
//! Caller-local binding resolves named SQL parameters against variables in
//! scope at the call site. A `LocalScope` is that scope, built by the caller
//! and passed in, instead of being discovered by walking the host call stack.

use std::collections::HashMap;

use crate::host::value::{HostValue, NIL};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalScope {
    vars: HashMap<String, HostValue>,
}

impl LocalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`LocalScope::set`].
    pub fn with(mut self, name: &str, value: impl Into<HostValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Declares or shadows a variable. A later declaration replaces an earlier one.
    pub fn set(&mut self, name: &str, value: impl Into<HostValue>) {
        self.vars.insert(name.to_string(), value.into());
    }

    /// Current value of `name`, or `Nil` when no such variable is in scope.
    pub fn get(&self, name: &str) -> &HostValue {
        self.vars.get(name).unwrap_or(&NIL)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<V: Into<HostValue>> FromIterator<(String, V)> for LocalScope {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        LocalScope {
            vars: iter.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_variable_is_nil() {
        let scope = LocalScope::new().with("id", 7);
        assert_eq!(scope.get("id"), &HostValue::Integer(7));
        assert!(scope.get("name").is_nil());
        assert!(!scope.contains("name"));
    }

    #[test]
    fn test_shadowing_replaces() {
        let mut scope = LocalScope::new().with("x", 1);
        scope.set("x", "shadowed");
        assert_eq!(scope.get("x").as_str(), Some("shadowed"));
        assert_eq!(scope.len(), 1);
    }
}
