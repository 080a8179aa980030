//! Evaluation of parsed expressions over JSON documents.
//!
//! Comparison rules:
//! - Numbers compare numerically (integers exactly, otherwise as `f64`)
//! - Strings compare lexically, booleans `false < true`
//! - `null` equals only `null`; other mismatched types never satisfy `<`, `>`, `==`
//!
//! Request parameters arrive as text, so a parameter is first read as the type
//! of the field it is compared against: a string field compares against the
//! parameter's text form, a number or bool field against the parsed text.
//!
//! Sorting uses a total order across types: null < bool < number < string <
//! array < object, and is stable.

use serde_json::{Map, Number, Value};
use std::borrow::Cow;
use std::cmp::Ordering;

use super::{CompareOp, Expr, FieldPath, Method, Operand, Selector, SortKey};
use crate::query::stream::AggregateFn;

/// Walk a member path through nested objects.
pub fn resolve<'a>(doc: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.0.iter().try_fold(doc, |current, segment| current.get(segment))
}

fn operand<'a>(op: &'a Operand, params: &'a [Value]) -> Option<&'a Value> {
    match op {
        Operand::Param(i) => params.get(*i),
        Operand::Literal(v) => Some(v),
    }
}

/// Read `param` as the JSON type of `actual`. Unconvertible values are left as is.
pub fn coerce_to<'a>(param: &'a Value, actual: &Value) -> Cow<'a, Value> {
    match (actual, param) {
        (Value::String(_), Value::Number(_) | Value::Bool(_)) => {
            Cow::Owned(Value::String(param.to_string()))
        }
        (Value::Number(_), Value::String(text)) => {
            match serde_json::from_str::<Number>(text.trim()) {
                Ok(n) => Cow::Owned(Value::Number(n)),
                Err(_) => Cow::Borrowed(param),
            }
        }
        (Value::Bool(_), Value::String(text)) => match text.trim().parse::<bool>() {
            Ok(b) => Cow::Owned(Value::Bool(b)),
            Err(_) => Cow::Borrowed(param),
        },
        _ => Cow::Borrowed(param),
    }
}

fn text_of(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        _ => None,
    }
}

fn equal_coerced(actual: &Value, param: &Value) -> bool {
    compare_values(actual, &coerce_to(param, actual)) == Some(Ordering::Equal)
}

/// Compare two values of the same kind. `None` when they are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return Some(a.cmp(&b));
    }
    x.as_f64()?.partial_cmp(&y.as_f64()?)
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used for sorting, MIN and MAX. Missing sorts with `null`.
fn total_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match type_rank(a).cmp(&type_rank(b)) {
        Ordering::Equal => compare_values(a, b).unwrap_or(Ordering::Equal),
        other => other,
    }
}

/// Does `doc` satisfy `expr` with the given positional parameters?
pub fn matches(expr: &Expr, doc: &Value, params: &[Value]) -> bool {
    match expr {
        Expr::Or(terms) => terms.iter().any(|t| matches(t, doc, params)),
        Expr::And(terms) => terms.iter().all(|t| matches(t, doc, params)),
        Expr::Not(inner) => !matches(inner, doc, params),
        Expr::Compare { field, op, value } => {
            let Some(expected) = operand(value, params) else {
                return false;
            };
            let actual = resolve(doc, field).unwrap_or(&Value::Null);
            let ordering = compare_values(actual, &coerce_to(expected, actual));
            match op {
                CompareOp::Eq => ordering == Some(Ordering::Equal),
                CompareOp::NotEq => ordering != Some(Ordering::Equal),
                CompareOp::Lt => ordering == Some(Ordering::Less),
                CompareOp::LtEq => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                CompareOp::Gt => ordering == Some(Ordering::Greater),
                CompareOp::GtEq => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            }
        }
        Expr::Call { field, method, arg } => {
            let (Some(actual), Some(arg)) = (resolve(doc, field), operand(arg, params)) else {
                return false;
            };
            call(*method, actual, arg)
        }
        Expr::Between { field, low, high } => {
            let (Some(low), Some(high)) = (operand(low, params), operand(high, params)) else {
                return false;
            };
            let actual = resolve(doc, field).unwrap_or(&Value::Null);
            let above = matches!(
                compare_values(actual, &coerce_to(low, actual)),
                Some(Ordering::Greater | Ordering::Equal)
            );
            let below = matches!(
                compare_values(actual, &coerce_to(high, actual)),
                Some(Ordering::Less | Ordering::Equal)
            );
            above && below
        }
    }
}

fn call(method: Method, actual: &Value, arg: &Value) -> bool {
    match (method, actual, arg) {
        // Collection field: membership of the argument.
        (Method::Contains, Value::Array(items), needle) => {
            items.iter().any(|item| equal_coerced(item, needle))
        }
        // Collection argument: membership of the field value.
        (Method::Contains, value, Value::Array(items)) => {
            items.iter().any(|item| equal_coerced(value, item))
        }
        (_, Value::String(s), arg) => {
            let Some(pattern) = text_of(arg) else {
                return false;
            };
            match method {
                Method::StartsWith => s.starts_with(pattern.as_ref()),
                Method::EndsWith => s.ends_with(pattern.as_ref()),
                Method::Contains => s.contains(pattern.as_ref()),
            }
        }
        _ => false,
    }
}

/// Stable multi-key sort.
pub fn sort_documents(docs: &mut [Value], keys: &[SortKey]) {
    docs.sort_by(|a, b| {
        for key in keys {
            let ordering = total_order(resolve(a, &key.field), resolve(b, &key.field));
            let ordering = if key.ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Reshape a document according to a projection selector.
pub fn project(doc: &Value, selector: &Selector) -> Value {
    match selector {
        Selector::Field(path) => resolve(doc, path).cloned().unwrap_or(Value::Null),
        Selector::Record(paths) => {
            let mut record = Map::new();
            for path in paths {
                record.insert(
                    path.leaf().to_string(),
                    resolve(doc, path).cloned().unwrap_or(Value::Null),
                );
            }
            Value::Object(record)
        }
    }
}

/// Apply an aggregate function to the selected values.
///
/// - `Count`: non-null values
/// - `Sum`: integer when every input is an integer, else float; `0` when empty
/// - `Average`: float; `None` when empty
/// - `Min` / `Max`: by the sort order; `None` when empty
pub fn fold_aggregate(func: AggregateFn, values: &[Value]) -> Option<Value> {
    let present = values.iter().filter(|v| !v.is_null());

    match func {
        AggregateFn::Count => Some(Value::from(present.count() as u64)),
        AggregateFn::Min => present.min_by(|a, b| total_order(Some(a), Some(b))).cloned(),
        AggregateFn::Max => present.max_by(|a, b| total_order(Some(a), Some(b))).cloned(),
        AggregateFn::Sum => {
            let numbers: Vec<&Number> = present.filter_map(|v| v.as_number()).collect();
            Some(sum_numbers(&numbers))
        }
        AggregateFn::Average => {
            let numbers: Vec<f64> = present.filter_map(Value::as_f64).collect();
            if numbers.is_empty() {
                return None;
            }
            let avg = numbers.iter().sum::<f64>() / numbers.len() as f64;
            Number::from_f64(avg).map(Value::Number)
        }
    }
}

fn sum_numbers(numbers: &[&Number]) -> Value {
    let integral: Option<i64> = numbers
        .iter()
        .try_fold(0i64, |acc, n| acc.checked_add(n.as_i64()?));
    match integral {
        Some(total) => Value::from(total),
        None => {
            let total: f64 = numbers.iter().filter_map(|n| n.as_f64()).sum();
            Number::from_f64(total)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }
    }
}
