//! The dynamically-typed value representation shared by the evaluator,
//! builtins, and scope chain.

use crate::ast::{Pos, Stmt};
use crate::scope::ScopeRef;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A user-defined function: parameter names, body, and the scope it closed
/// over at definition time.
#[derive(Debug)]
pub struct RiteDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub closure: ScopeRef,
    pub pos: Pos,
}

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type MapRef = Rc<RefCell<IndexMap<String, Value>>>;

#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<String>),
    Array(ArrayRef),
    Map(MapRef),
    Rite(Rc<RiteDef>),
    Builtin(&'static str),
    Entity(String),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Value {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    /// Host-language type name, as surfaced by `TYPEOF`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "VOID",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Str(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Map(_) => "MAP",
            Value::Rite(_) => "RITE",
            Value::Builtin(_) => "RITE",
            Value::Entity(_) => "ENTITY",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Void => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.borrow().is_empty(),
            Value::Map(m) => !m.borrow().is_empty(),
            Value::Rite(_) | Value::Builtin(_) | Value::Entity(_) => true,
        }
    }

    pub fn stringify(&self) -> String {
        match self {
            Value::Void => "VOID".to_string(),
            Value::Bool(true) => "ALIVE".to_string(),
            Value::Bool(false) => "DEAD".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => s.as_str().to_string(),
            Value::Array(a) => {
                let inner = a
                    .borrow()
                    .iter()
                    .map(Value::stringify)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{inner}]")
            }
            Value::Map(m) => {
                let inner = m
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.stringify()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{inner}}}")
            }
            Value::Rite(r) => format!("<rite {}>", r.name),
            Value::Builtin(name) => format!("<builtin {name}>"),
            Value::Entity(name) => format!("<entity {name}>"),
        }
    }

    /// Structural equality, matching the source language's `==`. Closures
    /// and entities compare by identity (there is no useful structural
    /// notion for either).
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.equals(w)).unwrap_or(false))
            }
            (Value::Entity(a), Value::Entity(b)) => a == b,
            (Value::Rite(a), Value::Rite(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

/// Prints floats the way the source language requires: always with a
/// decimal point, never in exponential form for ordinary magnitudes.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NAN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INFINITY" } else { "-INFINITY" }.to_string();
    }
    let s = format!("{f}");
    if s.contains('.') || s.contains('e') || s.contains('E') {
        s
    } else {
        format!("{s}.0")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stringifies_canonically() {
        assert_eq!(Value::Void.stringify(), "VOID");
        assert_eq!(Value::Bool(true).stringify(), "ALIVE");
        assert_eq!(Value::Bool(false).stringify(), "DEAD");
        assert_eq!(Value::Float(5.0).stringify(), "5.0");
        assert_eq!(Value::Int(5).stringify(), "5");
    }

    #[test]
    fn truthiness_rules() {
        assert!(!Value::Void.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Float(0.0).truthy());
        assert!(!Value::str("").truthy());
        assert!(!Value::array(vec![]).truthy());
        assert!(Value::str("x").truthy());
        assert!(Value::Int(1).truthy());
    }

    #[test]
    fn arrays_are_shared_by_reference() {
        let arr = Value::array(vec![Value::Int(1)]);
        let Value::Array(rc) = &arr else { unreachable!() };
        let clone = arr.clone();
        let Value::Array(rc2) = &clone else { unreachable!() };
        assert!(Rc::ptr_eq(rc, rc2));
    }

    #[test]
    fn structural_equality_for_arrays() {
        let a = Value::array(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::array(vec![Value::Int(1), Value::Int(2)]);
        assert!(a.equals(&b));
    }
}
