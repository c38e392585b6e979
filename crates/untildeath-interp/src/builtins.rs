//! Named host functions the evaluator dispatches `CallExpr`s to by name.
//! Every entry validates its operand types itself and fails with a
//! `Runtime` error carrying a human-readable message; array/map builtins
//! never mutate their argument, they return a new collection.

use crate::error::{AthError, EvalResult};
use indexmap::IndexMap;
use rand::Rng;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::OnceLock;
use untildeath_core::value::Value;

pub type BuiltinFn = fn(&[Value]) -> EvalResult<Value>;

fn table() -> &'static HashMap<&'static str, BuiltinFn> {
    static TABLE: OnceLock<HashMap<&'static str, BuiltinFn>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut m: HashMap<&'static str, BuiltinFn> = HashMap::new();
        m.insert("UTTER", utter);
        m.insert("HEED", heed);
        m.insert("SCRY", scry);
        m.insert("INSCRIBE", inscribe);
        m.insert("TYPEOF", typeof_);
        m.insert("LENGTH", length);
        m.insert("PARSE_INT", parse_int);
        m.insert("PARSE_FLOAT", parse_float);
        m.insert("STRING", string);
        m.insert("INT", int_);
        m.insert("FLOAT", float_);
        m.insert("CHAR", char_);
        m.insert("CODE", code);
        m.insert("BIN", bin);
        m.insert("HEX", hex);
        m.insert("APPEND", append);
        m.insert("PREPEND", prepend);
        m.insert("SLICE", slice);
        m.insert("FIRST", first);
        m.insert("LAST", last);
        m.insert("CONCAT", concat);
        m.insert("KEYS", keys);
        m.insert("VALUES", values);
        m.insert("HAS", has);
        m.insert("SET", set_);
        m.insert("DELETE", delete);
        m.insert("SPLIT", split);
        m.insert("JOIN", join);
        m.insert("SUBSTRING", substring);
        m.insert("UPPERCASE", uppercase);
        m.insert("LOWERCASE", lowercase);
        m.insert("TRIM", trim);
        m.insert("REPLACE", replace);
        m.insert("RANDOM", random);
        m.insert("RANDOM_INT", random_int);
        m.insert("TIME", time);
        m
    })
}

pub fn lookup(name: &str) -> Option<BuiltinFn> {
    table().get(name).copied()
}

/// Returns the table's own `'static` copy of `name`, for stashing a bare
/// builtin reference in a `Value::Builtin` without leaking an allocation
/// per lookup.
pub fn canonical_name(name: &str) -> Option<&'static str> {
    table().get_key_value(name).map(|(k, _)| *k)
}

fn err(msg: impl Into<String>) -> EvalResult<Value> {
    Err(AthError::runtime(msg).into())
}

fn as_str(v: &Value) -> Option<&str> {
    match v {
        Value::Str(s) => Some(s.as_str()),
        _ => None,
    }
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

// ============ I/O ============

fn utter(args: &[Value]) -> EvalResult<Value> {
    let line = args
        .iter()
        .map(Value::stringify)
        .collect::<Vec<_>>()
        .join(" ");
    println!("{line}");
    Ok(Value::Void)
}

fn heed(_args: &[Value]) -> EvalResult<Value> {
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) => Ok(Value::str("")),
        Ok(_) => {
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            Ok(Value::str(line))
        }
        Err(_) => Ok(Value::str("")),
    }
}

fn scry(args: &[Value]) -> EvalResult<Value> {
    let path = match args.first() {
        None | Some(Value::Void) => {
            let mut buf = String::new();
            return match std::io::stdin().read_to_string(&mut buf) {
                Ok(_) => Ok(Value::str(buf)),
                Err(e) => err(format!("Cannot read stdin: {e}")),
            };
        }
        Some(v) => v,
    };
    let Some(path) = as_str(path) else {
        return err(format!("SCRY expects string path or VOID, got {}", path.type_name()));
    };
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Value::str(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            err(format!("File not found: {path}"))
        }
        Err(e) => err(format!("Cannot read file: {e}")),
    }
}

fn inscribe(args: &[Value]) -> EvalResult<Value> {
    let [path, content] = args else {
        return err("INSCRIBE expects a path and content");
    };
    let Some(path) = as_str(path) else {
        return err(format!("INSCRIBE expects string path, got {}", path.type_name()));
    };
    let content = match content {
        Value::Str(s) => s.as_str().to_string(),
        other => other.stringify(),
    };
    let mut file = match std::fs::File::create(path) {
        Ok(f) => f,
        Err(e) => return err(format!("Cannot write file: {e}")),
    };
    if let Err(e) = file.write_all(content.as_bytes()) {
        return err(format!("Cannot write file: {e}"));
    }
    Ok(Value::Void)
}

// ============ Type operations ============

fn typeof_(args: &[Value]) -> EvalResult<Value> {
    let v = args.first().unwrap_or(&Value::Void);
    Ok(Value::str(v.type_name()))
}

fn length(args: &[Value]) -> EvalResult<Value> {
    match args.first() {
        Some(Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
        Some(Value::Array(a)) => Ok(Value::Int(a.borrow().len() as i64)),
        Some(other) => err(format!("LENGTH expects string or array, got {}", other.type_name())),
        None => err("LENGTH expects string or array, got VOID"),
    }
}

fn parse_int(args: &[Value]) -> EvalResult<Value> {
    let Some(Value::Str(s)) = args.first() else {
        return err(format!(
            "PARSE_INT expects string, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    if s.contains('.') {
        return err(format!("Cannot parse '{s}' as integer"));
    }
    s.parse::<i64>()
        .map(Value::Int)
        .or_else(|_| err(format!("Cannot parse '{s}' as integer")))
}

fn parse_float(args: &[Value]) -> EvalResult<Value> {
    let Some(Value::Str(s)) = args.first() else {
        return err(format!(
            "PARSE_FLOAT expects string, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    s.parse::<f64>()
        .map(Value::Float)
        .or_else(|_| err(format!("Cannot parse '{s}' as float")))
}

fn string(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::str(args.first().unwrap_or(&Value::Void).stringify()))
}

fn int_(args: &[Value]) -> EvalResult<Value> {
    match args.first() {
        Some(Value::Float(f)) => Ok(Value::Int(f.trunc() as i64)),
        Some(Value::Int(i)) => Ok(Value::Int(*i)),
        other => err(format!(
            "INT expects number, got {}",
            other.map(Value::type_name).unwrap_or("VOID")
        )),
    }
}

fn float_(args: &[Value]) -> EvalResult<Value> {
    match args.first() {
        Some(Value::Int(i)) => Ok(Value::Float(*i as f64)),
        Some(Value::Float(f)) => Ok(Value::Float(*f)),
        other => err(format!(
            "FLOAT expects number, got {}",
            other.map(Value::type_name).unwrap_or("VOID")
        )),
    }
}

fn char_(args: &[Value]) -> EvalResult<Value> {
    let Some(code) = args.first().and_then(as_int) else {
        return err(format!(
            "CHAR expects integer, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    match u32::try_from(code).ok().and_then(char::from_u32) {
        Some(c) => Ok(Value::str(c.to_string())),
        None => err(format!("Invalid code point: {code}")),
    }
}

fn code(args: &[Value]) -> EvalResult<Value> {
    let Some(s) = args.first().and_then(as_str) else {
        return err(format!(
            "CODE expects string, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    match s.chars().next() {
        Some(c) => Ok(Value::Int(c as i64)),
        None => err("CODE called on empty string"),
    }
}

fn bin(args: &[Value]) -> EvalResult<Value> {
    let Some(i) = args.first().and_then(as_int) else {
        return err(format!(
            "BIN expects integer, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    Ok(Value::str(format!("{i:b}")))
}

fn hex(args: &[Value]) -> EvalResult<Value> {
    let Some(i) = args.first().and_then(as_int) else {
        return err(format!(
            "HEX expects integer, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    Ok(Value::str(format!("{i:X}")))
}

// ============ Array operations ============

fn append(args: &[Value]) -> EvalResult<Value> {
    let [Value::Array(a), v] = args else {
        return err(format!(
            "APPEND expects array, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    let mut result = a.borrow().clone();
    result.push(v.clone());
    Ok(Value::array(result))
}

fn prepend(args: &[Value]) -> EvalResult<Value> {
    let [Value::Array(a), v] = args else {
        return err(format!(
            "PREPEND expects array, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    let mut result = vec![v.clone()];
    result.extend(a.borrow().iter().cloned());
    Ok(Value::array(result))
}

fn slice(args: &[Value]) -> EvalResult<Value> {
    let [Value::Array(a), start, end] = args else {
        return err(format!(
            "SLICE expects array, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    let (Some(start), Some(end)) = (as_int(start), as_int(end)) else {
        return err("SLICE expects integer indices");
    };
    let a = a.borrow();
    let start = start.clamp(0, a.len() as i64) as usize;
    let end = end.clamp(0, a.len() as i64) as usize;
    if start >= end {
        return Ok(Value::array(Vec::new()));
    }
    Ok(Value::array(a[start..end].to_vec()))
}

fn first(args: &[Value]) -> EvalResult<Value> {
    let Some(Value::Array(a)) = args.first() else {
        return err(format!(
            "FIRST expects array, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    a.borrow()
        .first()
        .cloned()
        .ok_or_else(|| AthError::runtime("FIRST called on empty array").into())
}

fn last(args: &[Value]) -> EvalResult<Value> {
    let Some(Value::Array(a)) = args.first() else {
        return err(format!(
            "LAST expects array, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    a.borrow()
        .last()
        .cloned()
        .ok_or_else(|| AthError::runtime("LAST called on empty array").into())
}

fn concat(args: &[Value]) -> EvalResult<Value> {
    let [Value::Array(a), Value::Array(b)] = args else {
        return err("CONCAT expects two arrays");
    };
    let mut result = a.borrow().clone();
    result.extend(b.borrow().iter().cloned());
    Ok(Value::array(result))
}

// ============ Map operations ============

fn keys(args: &[Value]) -> EvalResult<Value> {
    let Some(Value::Map(m)) = args.first() else {
        return err(format!(
            "KEYS expects map, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    Ok(Value::array(m.borrow().keys().map(Value::str).collect()))
}

fn values(args: &[Value]) -> EvalResult<Value> {
    let Some(Value::Map(m)) = args.first() else {
        return err(format!(
            "VALUES expects map, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    Ok(Value::array(m.borrow().values().cloned().collect()))
}

fn has(args: &[Value]) -> EvalResult<Value> {
    let [Value::Map(m), key] = args else {
        return err(format!(
            "HAS expects map, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    let Some(key) = as_str(key) else {
        return err("HAS expects a string key");
    };
    Ok(Value::Bool(m.borrow().contains_key(key)))
}

fn set_(args: &[Value]) -> EvalResult<Value> {
    let [Value::Map(m), key, value] = args else {
        return err(format!(
            "SET expects map, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    let Some(key) = as_str(key) else {
        return err("SET expects a string key");
    };
    let mut result = m.borrow().clone();
    result.insert(key.to_string(), value.clone());
    Ok(Value::map(result))
}

fn delete(args: &[Value]) -> EvalResult<Value> {
    let [Value::Map(m), key] = args else {
        return err(format!(
            "DELETE expects map, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    let Some(key) = as_str(key) else {
        return err("DELETE expects a string key");
    };
    let mut result = m.borrow().clone();
    result.shift_remove(key);
    Ok(Value::map(result))
}

// ============ String operations ============

fn split(args: &[Value]) -> EvalResult<Value> {
    let [Value::Str(s), Value::Str(delim)] = args else {
        return err("SPLIT expects two strings");
    };
    if delim.is_empty() {
        return Ok(Value::array(s.chars().map(|c| Value::str(c.to_string())).collect()));
    }
    Ok(Value::array(
        s.split(delim.as_str()).map(Value::str).collect(),
    ))
}

fn join(args: &[Value]) -> EvalResult<Value> {
    let [Value::Array(a), delim] = args else {
        return err(format!(
            "JOIN expects array, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    let Some(delim) = as_str(delim) else {
        return err(format!("JOIN expects string delimiter, got {}", delim.type_name()));
    };
    let parts: Vec<String> = a.borrow().iter().map(Value::stringify).collect();
    Ok(Value::str(parts.join(delim)))
}

fn substring(args: &[Value]) -> EvalResult<Value> {
    let [Value::Str(s), start, end] = args else {
        return err(format!(
            "SUBSTRING expects string, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    let (Some(start), Some(end)) = (as_int(start), as_int(end)) else {
        return err("SUBSTRING expects integer indices");
    };
    let chars: Vec<char> = s.chars().collect();
    let start = start.clamp(0, chars.len() as i64) as usize;
    let end = end.clamp(0, chars.len() as i64) as usize;
    if start >= end {
        return Ok(Value::str(""));
    }
    Ok(Value::str(chars[start..end].iter().collect::<String>()))
}

fn uppercase(args: &[Value]) -> EvalResult<Value> {
    let Some(s) = args.first().and_then(as_str) else {
        return err(format!(
            "UPPERCASE expects string, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    Ok(Value::str(s.to_uppercase()))
}

fn lowercase(args: &[Value]) -> EvalResult<Value> {
    let Some(s) = args.first().and_then(as_str) else {
        return err(format!(
            "LOWERCASE expects string, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    Ok(Value::str(s.to_lowercase()))
}

fn trim(args: &[Value]) -> EvalResult<Value> {
    let Some(s) = args.first().and_then(as_str) else {
        return err(format!(
            "TRIM expects string, got {}",
            args.first().map(Value::type_name).unwrap_or("VOID")
        ));
    };
    Ok(Value::str(s.trim().to_string()))
}

fn replace(args: &[Value]) -> EvalResult<Value> {
    let [Value::Str(s), Value::Str(old), Value::Str(new)] = args else {
        return err("REPLACE expects three strings");
    };
    Ok(Value::str(s.replace(old.as_str(), new.as_str())))
}

// ============ Utility ============

fn random(_args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Float(rand::thread_rng().gen_range(0.0..1.0)))
}

fn random_int(args: &[Value]) -> EvalResult<Value> {
    let [min_v, max_v] = args else {
        return err("RANDOM_INT expects two integers");
    };
    let (Some(min_v), Some(max_v)) = (as_int(min_v), as_int(max_v)) else {
        return err("RANDOM_INT expects two integers");
    };
    if min_v > max_v {
        return err("RANDOM_INT expects two integers");
    }
    Ok(Value::Int(rand::thread_rng().gen_range(min_v..=max_v)))
}

fn time(_args: &[Value]) -> EvalResult<Value> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    Ok(Value::Int(now.as_millis() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_does_not_mutate_input() {
        let original = Value::array(vec![Value::Int(1)]);
        let result = lookup("APPEND").unwrap()(&[original.clone(), Value::Int(2)]).unwrap();
        if let Value::Array(a) = &original {
            assert_eq!(a.borrow().len(), 1);
        }
        if let Value::Array(a) = result {
            assert_eq!(a.borrow().len(), 2);
        }
    }

    #[test]
    fn length_rejects_wrong_type() {
        let err = lookup("LENGTH").unwrap()(&[Value::Int(3)]).unwrap_err();
        match err {
            crate::error::EvalSignal::Error(AthError::Runtime { message, .. }) => {
                assert!(message.contains("LENGTH expects string or array"));
            }
            _ => panic!("expected runtime error"),
        }
    }

    #[test]
    fn split_with_empty_delimiter_splits_chars() {
        let result = lookup("SPLIT").unwrap()(&[Value::str("ab"), Value::str("")]).unwrap();
        if let Value::Array(a) = result {
            assert_eq!(a.borrow().len(), 2);
        } else {
            panic!("expected array");
        }
    }

    #[test]
    fn random_int_is_inclusive() {
        for _ in 0..20 {
            let v = lookup("RANDOM_INT").unwrap()(&[Value::Int(1), Value::Int(1)]).unwrap();
            assert_eq!(v, Value::Int(1));
        }
    }
}
