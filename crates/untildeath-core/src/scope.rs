//! Lexical scope chain: parent-linked nodes mapping names to values, with a
//! per-node set of names flagged read-only.

use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub type ScopeRef = Rc<RefCell<Scope>>;

#[derive(Debug)]
pub struct Scope {
    parent: Option<ScopeRef>,
    variables: HashMap<String, Value>,
    constants: HashSet<String>,
}

impl Scope {
    pub fn new_root() -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            parent: None,
            variables: HashMap::new(),
            constants: HashSet::new(),
        }))
    }

    pub fn new_child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            parent: Some(Rc::clone(parent)),
            variables: HashMap::new(),
            constants: HashSet::new(),
        }))
    }

    /// Always writes into this node, shadowing any outer binding of the
    /// same name.
    pub fn define(&mut self, name: impl Into<String>, value: Value, constant: bool) {
        let name = name.into();
        if constant {
            self.constants.insert(name.clone());
        }
        self.variables.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.variables.get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.borrow().get(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.variables.contains_key(name)
            || self.parent.as_ref().map(|p| p.borrow().has(name)).unwrap_or(false)
    }

    /// Walks the parent chain and writes at the nearest existing binding.
    /// Returns `Err(true)` if the name is bound but read-only, `Err(false)`
    /// if the name is unbound anywhere in the chain.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), SetError> {
        if self.variables.contains_key(name) {
            if self.constants.contains(name) {
                return Err(SetError::ReadOnly);
            }
            self.variables.insert(name.to_string(), value);
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().set(name, value),
            None => Err(SetError::Unbound),
        }
    }

    /// Snapshot of every binding defined directly in this node, without
    /// walking the parent chain. Used to capture a module's top-level
    /// exports once its evaluator finishes running.
    pub fn all_own_bindings(&self) -> IndexMap<String, Value> {
        self.variables.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetError {
    Unbound,
    ReadOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowing_defines_in_current_scope() {
        let root = Scope::new_root();
        root.borrow_mut().define("x", Value::Int(1), false);
        let child = Scope::new_child(&root);
        child.borrow_mut().define("x", Value::Int(2), false);

        assert_eq!(child.borrow().get("x"), Some(Value::Int(2)));
        assert_eq!(root.borrow().get("x"), Some(Value::Int(1)));
    }

    #[test]
    fn set_walks_to_nearest_binding() {
        let root = Scope::new_root();
        root.borrow_mut().define("x", Value::Int(1), false);
        let child = Scope::new_child(&root);

        child.borrow_mut().set("x", Value::Int(9)).unwrap();
        assert_eq!(root.borrow().get("x"), Some(Value::Int(9)));
    }

    #[test]
    fn set_rejects_constants() {
        let root = Scope::new_root();
        root.borrow_mut().define("x", Value::Int(1), true);
        let err = root.borrow_mut().set("x", Value::Int(2)).unwrap_err();
        assert_eq!(err, SetError::ReadOnly);
    }

    #[test]
    fn set_rejects_unbound_names() {
        let root = Scope::new_root();
        let err = root.borrow_mut().set("nope", Value::Void).unwrap_err();
        assert_eq!(err, SetError::Unbound);
    }
}
