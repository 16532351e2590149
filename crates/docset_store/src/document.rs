//! Document representation and field helpers.

use serde_json::{Map, Value};

/// A schemaless document: an ordered map of field name to JSON value.
pub type Document = Map<String, Value>;

/// The reserved identity field of every stored document.
pub const ID_FIELD: &str = "_id";

/// Returns the identity value of a document, if present.
pub fn doc_id(doc: &Document) -> Option<&Value> {
    doc.get(ID_FIELD)
}

/// Approximate stored size of a document in bytes.
///
/// Capped collections use this for byte-cap accounting. The figure is the
/// compact JSON length, which is stable across insert and read-back.
pub fn doc_size(doc: &Document) -> u64 {
    serde_json::to_string(doc).map(|s| s.len() as u64).unwrap_or(0)
}

/// Resolves a dotted field path (`"a.b.c"`) against a document.
pub fn field_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut current: &Value = doc.get(path.split('.').next()?)?;
    for segment in path.split('.').skip(1) {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Evaluates a stage expression against a document.
///
/// `"$field"` references resolve through [`field_path`]; any other value is
/// a literal.
pub fn eval_expr(doc: &Document, expr: &Value) -> Value {
    match expr {
        Value::String(s) if s.starts_with('$') => {
            field_path(doc, &s[1..]).cloned().unwrap_or(Value::Null)
        }
        other => other.clone(),
    }
}

/// Total order over JSON values used for sorting and min/max accumulators.
///
/// Nulls sort first, then booleans, numbers, strings, arrays, objects.
pub fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let fx = x.as_f64().unwrap_or(f64::NAN);
            let fy = y.as_f64().unwrap_or(f64::NAN);
            fx.partial_cmp(&fy).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xv, yv) in x.iter().zip(y.iter()) {
                let ord = compare_values(xv, yv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Canonical grouping key for a JSON value.
///
/// Map/reduce and `$group` bucket documents by this form, so keys that are
/// JSON-equal land in the same bucket regardless of number representation.
pub fn canonical_key(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            Some(f) => format!("{f}"),
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}
