//! Server-side evaluation of filters, projections, and groupings.
//!
//! This module is the `MemoryStore`'s execution engine for the pipeline
//! stages and match specs that a remote document store would run natively.

use crate::document::{canonical_key, compare_values, eval_expr, field_path, Document, ID_FIELD};
use crate::error::{StoreError, StoreResult};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Evaluates a `$match` spec against a document.
///
/// The spec is an object of `field: literal` equality conditions and
/// `field: {"$op": operand}` comparisons. Supported operators: `$eq`,
/// `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`.
pub fn matches(doc: &Document, spec: &Value) -> StoreResult<bool> {
    let Some(conditions) = spec.as_object() else {
        return Err(StoreError::unsupported("$match spec must be an object"));
    };

    for (field, condition) in conditions {
        let actual = field_path(doc, field).cloned().unwrap_or(Value::Null);
        if !condition_holds(&actual, condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn condition_holds(actual: &Value, condition: &Value) -> StoreResult<bool> {
    let Some(ops) = condition.as_object() else {
        return Ok(actual == condition);
    };

    // An object without operator keys is a literal match on a nested doc.
    if !ops.keys().any(|k| k.starts_with('$')) {
        return Ok(actual == condition);
    }

    for (op, operand) in ops {
        let ord = || compare_values(actual, operand);
        let holds = match op.as_str() {
            "$eq" => actual == operand,
            "$ne" => actual != operand,
            "$gt" => !actual.is_null() && ord() == Ordering::Greater,
            "$gte" => !actual.is_null() && ord() != Ordering::Less,
            "$lt" => !actual.is_null() && ord() == Ordering::Less,
            "$lte" => !actual.is_null() && ord() != Ordering::Greater,
            "$in" => operand
                .as_array()
                .map(|candidates| candidates.contains(actual))
                .unwrap_or(false),
            other => {
                return Err(StoreError::unsupported(format!(
                    "unknown match operator `{other}`"
                )))
            }
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Applies a `$project` spec to a document.
///
/// Fields mapped to `1`/`true` are included verbatim; fields mapped to a
/// `"$path"` string are computed references. `_id` is kept unless mapped to
/// `0`/`false`.
pub fn project(doc: &Document, spec: &Value) -> StoreResult<Document> {
    let Some(fields) = spec.as_object() else {
        return Err(StoreError::unsupported("$project spec must be an object"));
    };

    let mut out = Map::new();
    let id_suppressed = match fields.get(ID_FIELD) {
        Some(Value::Bool(false)) => true,
        Some(Value::Number(n)) => n.as_i64() == Some(0),
        _ => false,
    };

    if !id_suppressed {
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.to_string(), id.clone());
        }
    }

    for (name, selector) in fields {
        if name == ID_FIELD {
            continue;
        }
        match selector {
            Value::Number(n) if n.as_i64() == Some(0) => {}
            Value::Bool(false) => {}
            Value::Number(_) | Value::Bool(true) => {
                if let Some(value) = field_path(doc, name) {
                    out.insert(name.clone(), value.clone());
                }
            }
            Value::String(path) if path.starts_with('$') => {
                out.insert(name.clone(), eval_expr(doc, selector));
            }
            other => {
                return Err(StoreError::unsupported(format!(
                    "unsupported projection selector for `{name}`: {other}"
                )))
            }
        }
    }
    Ok(out)
}

/// Applies a `$group` spec to a document set.
///
/// The spec's `_id` entry is the grouping expression; every other entry is
/// an accumulator object: `{"$sum": expr}`, `{"$avg": expr}`,
/// `{"$min": expr}`, `{"$max": expr}`, or `{"$count": {}}`.
pub fn group(docs: &[Document], spec: &Value) -> StoreResult<Vec<Document>> {
    let Some(fields) = spec.as_object() else {
        return Err(StoreError::unsupported("$group spec must be an object"));
    };
    let key_expr = fields
        .get(ID_FIELD)
        .ok_or_else(|| StoreError::unsupported("$group spec requires an _id expression"))?;

    // Buckets keep first-seen order so grouped output is deterministic.
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, (Value, Vec<&Document>)> = HashMap::new();

    for doc in docs {
        let key = eval_expr(doc, key_expr);
        let bucket_id = canonical_key(&key);
        buckets
            .entry(bucket_id.clone())
            .or_insert_with(|| {
                order.push(bucket_id.clone());
                (key, Vec::new())
            })
            .1
            .push(doc);
    }

    let mut results = Vec::with_capacity(order.len());
    for bucket_id in order {
        let (key, members) = &buckets[&bucket_id];
        let mut out = Map::new();
        out.insert(ID_FIELD.to_string(), key.clone());

        for (name, accumulator) in fields {
            if name == ID_FIELD {
                continue;
            }
            out.insert(name.clone(), accumulate(members, accumulator)?);
        }
        results.push(out);
    }
    Ok(results)
}

fn accumulate(members: &[&Document], accumulator: &Value) -> StoreResult<Value> {
    let Some(acc) = accumulator.as_object() else {
        return Err(StoreError::unsupported(
            "group accumulator must be an object",
        ));
    };
    let (op, expr) = acc
        .iter()
        .next()
        .ok_or_else(|| StoreError::unsupported("empty group accumulator"))?;

    let numbers = || {
        members
            .iter()
            .filter_map(|doc| eval_expr(doc, expr).as_f64())
            .collect::<Vec<_>>()
    };

    let value = match op.as_str() {
        "$sum" => Value::from(numbers().iter().sum::<f64>()),
        "$avg" => {
            let nums = numbers();
            if nums.is_empty() {
                Value::Null
            } else {
                Value::from(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        "$min" => members
            .iter()
            .map(|doc| eval_expr(doc, expr))
            .filter(|v| !v.is_null())
            .min_by(compare_values)
            .unwrap_or(Value::Null),
        "$max" => members
            .iter()
            .map(|doc| eval_expr(doc, expr))
            .filter(|v| !v.is_null())
            .max_by(compare_values)
            .unwrap_or(Value::Null),
        "$count" => Value::from(members.len() as u64),
        other => {
            return Err(StoreError::unsupported(format!(
                "unknown group accumulator `{other}`"
            )))
        }
    };
    Ok(value)
}

/// Applies an `$unwind` spec (`"$field"`), emitting one document per array
/// element. Documents where the field is missing or not an array are
/// dropped, matching the operator's default behavior.
pub fn unwind(docs: Vec<Document>, spec: &Value) -> StoreResult<Vec<Document>> {
    let Some(path) = spec.as_str().and_then(|s| s.strip_prefix('$')) else {
        return Err(StoreError::unsupported("$unwind spec must be a \"$field\" path"));
    };

    let mut out = Vec::new();
    for doc in docs {
        let Some(Value::Array(items)) = doc.get(path).cloned() else {
            continue;
        };
        for item in items {
            let mut copy = doc.clone();
            copy.insert(path.to_string(), item);
            out.push(copy);
        }
    }
    Ok(out)
}

/// Sorts documents by a `$sort` spec (`{"field": 1 | -1, ...}`).
pub fn sort_docs(docs: &mut [Document], spec: &Value) -> StoreResult<()> {
    let Some(keys) = spec.as_object() else {
        return Err(StoreError::unsupported("$sort spec must be an object"));
    };
    let keys: Vec<(String, bool)> = keys
        .iter()
        .map(|(field, dir)| (field.clone(), dir.as_i64().unwrap_or(1) >= 0))
        .collect();

    docs.sort_by(|a, b| {
        for (field, ascending) in &keys {
            let av = field_path(a, field).cloned().unwrap_or(Value::Null);
            let bv = field_path(b, field).cloned().unwrap_or(Value::Null);
            let ord = compare_values(&av, &bv);
            if ord != Ordering::Equal {
                return if *ascending { ord } else { ord.reverse() };
            }
        }
        Ordering::Equal
    });
    Ok(())
}
