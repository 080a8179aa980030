/// Normalized query → query stream compiler.
///
/// Converts the store-independent query model into the textual stages a
/// dynamic-expression evaluator understands:
///
/// | Operator                         | Fragment                      |
/// |----------------------------------|-------------------------------|
/// | Equals .. GreaterEqual           | `field <op> @i`               |
/// | StartsWith / EndsWith            | `field.StartsWith(@i)`        |
/// | Contains / InCollection          | `field.Contains(@i)`          |
/// | InBetween                        | `field Between @i and @i+1`   |
///
/// Conditions are joined left to right with their `AND` / `OR` term and no
/// grouping parentheses. Mixed chains bind with the evaluator's own precedence.
use serde_json::Value;

use super::stream::{Ordering, Predicate, Projection, QueryStream};
use super::types::{Condition, ConditionOp, DataQuery, OrderBy};

/// Compile conditions into a single predicate. `None` when there is nothing to filter.
pub fn compile_conditions(conditions: &[Condition]) -> Option<Predicate> {
    if conditions.is_empty() {
        return None;
    }

    let mut text = String::new();
    let mut params: Vec<Value> = Vec::new();
    let last = conditions.len() - 1;

    for (n, condition) in conditions.iter().enumerate() {
        let i = params.len();
        let field = &condition.field;

        match condition.op {
            ConditionOp::Equals
            | ConditionOp::NotEqual
            | ConditionOp::Less
            | ConditionOp::LessEqual
            | ConditionOp::Greater
            | ConditionOp::GreaterEqual => {
                let alias = condition.op.alias().unwrap_or("==");
                text.push_str(&format!("{} {} @{}", field, alias, i));
                params.push(condition.value.clone());
            }
            ConditionOp::StartsWith => {
                text.push_str(&format!("{}.StartsWith(@{})", field, i));
                params.push(condition.value.clone());
            }
            ConditionOp::EndsWith => {
                text.push_str(&format!("{}.EndsWith(@{})", field, i));
                params.push(condition.value.clone());
            }
            ConditionOp::Contains | ConditionOp::InCollection => {
                text.push_str(&format!("{}.Contains(@{})", field, i));
                params.push(condition.value.clone());
            }
            ConditionOp::InBetween => {
                text.push_str(&format!("{} Between @{} and @{}", field, i, i + 1));
                let mut range = split_range(&condition.value);
                range.resize(condition.op.arity(), Value::Null);
                params.extend(range);
            }
        }

        if n != last {
            text.push(' ');
            text.push_str(condition.term.keyword());
            text.push(' ');
        }
    }

    Some(Predicate { text, params })
}

/// Split a comma-joined range value into its endpoints.
///
/// Each endpoint is read as a JSON scalar when it parses as one (`5`, `true`),
/// otherwise it stays text. The caller fits the result to the operator's
/// arity, padding a short range with `null`.
fn split_range(value: &Value) -> Vec<Value> {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    raw.split(',').map(|part| parse_scalar(part.trim())).collect()
}

/// Parse `raw` as a JSON scalar, falling back to a string value.
pub fn parse_scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v) if !v.is_object() && !v.is_array() => v,
        _ => Value::String(raw.to_string()),
    }
}

/// Compile an order spec into `field ASC|DESC` terms. `None` for a missing or empty spec.
pub fn compile_ordering(order_by: Option<&OrderBy>) -> Option<Ordering> {
    let order_by = order_by.filter(|o| !o.is_empty())?;
    let terms: Vec<String> = order_by
        .keys()
        .map(|(field, asc)| format!("{} {}", field, if asc { "ASC" } else { "DESC" }))
        .collect();
    Some(Ordering(terms.join(",")))
}

/// Compile a field subset into a projection selector.
pub fn compile_projection(fields: Option<&[String]>) -> Option<Projection> {
    match fields {
        None | Some([]) => None,
        Some([single]) => Some(Projection(single.clone())),
        Some(many) => Some(Projection(format!("new({})", many.join(",")))),
    }
}

pub fn apply_conditions(stream: QueryStream, conditions: &[Condition]) -> QueryStream {
    match compile_conditions(conditions) {
        Some(predicate) => stream.filter(predicate),
        None => stream,
    }
}

pub fn apply_sorting(stream: QueryStream, order_by: Option<&OrderBy>) -> QueryStream {
    match compile_ordering(order_by) {
        Some(ordering) => stream.order_by(ordering),
        None => stream,
    }
}

/// Skip when `skip > 0`, take when `take >= 1`; anything else is a no-op.
pub fn apply_limits(
    mut stream: QueryStream,
    skip: Option<usize>,
    take: Option<usize>,
) -> QueryStream {
    if let Some(n) = skip.filter(|n| *n > 0) {
        stream = stream.skip(n);
    }
    if let Some(n) = take.filter(|n| *n >= 1) {
        stream = stream.take(n);
    }
    stream
}

pub fn apply_specific_fields(stream: QueryStream, fields: Option<&[String]>) -> QueryStream {
    match compile_projection(fields) {
        Some(projection) => stream.select(projection),
        None => stream,
    }
}

/// The shared composition every native-paging adapter uses:
/// conditions, then sorting, then limits, then projection.
pub fn compose(stream: QueryStream, q: &DataQuery) -> QueryStream {
    let stream = apply_conditions(stream, &q.conditions);
    let stream = apply_sorting(stream, q.order_by.as_ref());
    let stream = apply_limits(stream, q.offset, q.rows);
    apply_specific_fields(stream, q.fields())
}
