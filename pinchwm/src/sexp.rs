//! Plist helpers over `lexpr` values, shared by the IPC dispatcher and the
//! replay reader.

use lexpr::Value;

/// Find the value following `:key` in a plist.
/// Handles both `Value::Keyword("key")` (elisp parser) and
/// `Value::Symbol(":key")` (default parser) forms.
pub fn plist_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    // Walk key/value pairs; only the car of each pair is a key.
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => &**k == key,
            Value::Symbol(s) => **s == *prefixed,
            _ => false,
        };
        let Value::Cons(val) = pair.cdr() else {
            return None;
        };
        if is_key {
            return Some(val.car());
        }
        current = val.cdr();
    }
    None
}

/// Extract a plist value rendered as a plain string; keywords lose their
/// leading colon.
pub fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let val = plist_get(value, key)?;
    Some(match val {
        Value::Keyword(v) => v.to_string(),
        Value::Symbol(v) => v.strip_prefix(':').unwrap_or(&**v).to_string(),
        Value::String(v) => v.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => bool_atom(*b).to_string(),
        Value::Null | Value::Nil => "nil".to_string(),
        other => other.to_string(),
    })
}

pub fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

pub fn get_string(value: &Value, key: &str) -> Option<String> {
    get_keyword(value, key)
}

/// Treats "nil" as false, anything else as true.
pub fn get_bool(value: &Value, key: &str) -> Option<bool> {
    get_keyword(value, key).map(|s| s != "nil")
}

pub fn get_float(value: &Value, key: &str) -> Option<f64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// True for `nil`, `()` and `#nil`.
pub fn is_nil(value: &Value) -> bool {
    match value {
        Value::Null | Value::Nil => true,
        Value::Symbol(s) => &**s == "nil",
        _ => false,
    }
}

/// Top-level elements of a proper list.  Improper tails are ignored.
pub fn list_items(value: &Value) -> Vec<&Value> {
    let mut items = Vec::new();
    let mut current = value;
    while let Value::Cons(pair) = current {
        items.push(pair.car());
        current = pair.cdr();
    }
    items
}

/// Numeric value of an atom.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Escape a string for s-expression output.
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render a bool as `t` / `nil`.
pub fn bool_atom(b: bool) -> &'static str {
    if b {
        "t"
    } else {
        "nil"
    }
}
