//! Request-parameter conventions.
//!
//! Turns flat `key=value` request parameters into a [`DataQuery`]:
//!
//! ```text
//! NumberGreaterThan=5        -> Number > 5
//! NameStartsWith=Test        -> Name.StartsWith("Test")
//! NumberBetween=2,4          -> Number Between 2 and 4
//! NumberIn=1,3,5             -> Number in [1, 3, 5]
//! Skip=2 Take=5              -> offset / rows
//! OrderBy=Name,-Number       -> Name ASC, Number DESC
//! Fields=Name,Number         -> projection
//! Include=SUM(Number) Total  -> aggregate requests
//! ```
//!
//! Suffixes are stripped blindly unless the caller names the document's
//! fields: a key that is itself a known field (`LoggedIn`, `CheckIn`) is always
//! an equality, see [`parse_request_with_fields`].

use serde_json::Value;

use super::compiler::{compile_conditions, compile_ordering, compile_projection, parse_scalar};
use super::types::{AggregateRequest, Condition, ConditionOp, DataQuery, OrderBy};
use crate::error::{DataSourceError, Result};
use crate::expr::{parse_ordering, parse_predicate, parse_projection};

/// Operator suffixes, longest first so `GreaterThanOrEqualTo` wins over `GreaterThan`.
const SUFFIXES: &[(&str, ConditionOp)] = &[
    ("GreaterThanOrEqualTo", ConditionOp::GreaterEqual),
    ("LessThanOrEqualTo", ConditionOp::LessEqual),
    ("GreaterThan", ConditionOp::Greater),
    ("LessThan", ConditionOp::Less),
    ("NotEqualTo", ConditionOp::NotEqual),
    ("StartsWith", ConditionOp::StartsWith),
    ("EndsWith", ConditionOp::EndsWith),
    ("Contains", ConditionOp::Contains),
    ("Between", ConditionOp::InBetween),
    ("In", ConditionOp::InCollection),
];

/// A parsed request: the query plus whatever the `Include` key asked for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub query: DataQuery,
    pub aggregates: Vec<AggregateRequest>,
    pub include_total: bool,
}

/// Parse request parameters in order. Conditions keep the parameter order.
pub fn parse_request<I, K, V>(params: I) -> Result<QueryRequest>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    parse_request_with_fields(params, &[])
}

/// Like [`parse_request`], treating keys in `known_fields` as plain field names.
///
/// Field names must form valid expressions; a malformed one fails here with
/// [`DataSourceError::Expression`] rather than later in the store.
pub fn parse_request_with_fields<I, K, V>(params: I, known_fields: &[&str]) -> Result<QueryRequest>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut request = QueryRequest::default();

    for (key, value) in params {
        let key = key.as_ref().trim();
        let value = value.as_ref().trim();

        if key.eq_ignore_ascii_case("Skip") {
            request.query.offset = Some(parse_count("Skip", value)?);
        } else if key.eq_ignore_ascii_case("Take") {
            request.query.rows = Some(parse_count("Take", value)?);
        } else if key.eq_ignore_ascii_case("OrderBy") {
            request.query.order_by = parse_order_by(value);
        } else if key.eq_ignore_ascii_case("Fields") {
            request.query = request.query.with_fields(split_list(value));
        } else if key.eq_ignore_ascii_case("Include") {
            for item in split_top_level(value) {
                if item.eq_ignore_ascii_case("Total") {
                    request.include_total = true;
                } else {
                    request.aggregates.push(parse_aggregate(item));
                }
            }
        } else if !key.is_empty() {
            request
                .query
                .conditions
                .push(parse_condition_among(key, value, known_fields));
        }
    }

    validate(&request.query)?;
    Ok(request)
}

/// Compile `q` and parse the result back, as a store evaluating it would.
fn validate(q: &DataQuery) -> Result<()> {
    if let Some(predicate) = compile_conditions(&q.conditions) {
        parse_predicate(&predicate.text)?;
    }
    if let Some(ordering) = compile_ordering(q.order_by.as_ref()) {
        parse_ordering(&ordering.0)?;
    }
    if let Some(projection) = compile_projection(q.fields()) {
        parse_projection(&projection.0)?;
    }
    Ok(())
}

fn parse_count(name: &'static str, value: &str) -> Result<usize> {
    value
        .parse::<usize>()
        .map_err(|_| DataSourceError::invalid_argument(name, format!("'{}' is not a count", value)))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// `Name,-Number` ascending by Name, then descending by Number.
fn parse_order_by(value: &str) -> Option<OrderBy> {
    let mut order = OrderBy::default();
    for field in split_list(value) {
        match field.strip_prefix('-') {
            Some(name) => order = order.then(name.trim(), false),
            None => order = order.then(field, true),
        }
    }
    if order.is_empty() {
        None
    } else {
        Some(order)
    }
}

/// Map `FieldSuffix=value` onto a condition. No known suffix means equality.
pub fn parse_condition(key: &str, value: &str) -> Condition {
    parse_condition_among(key, value, &[])
}

/// Map `FieldSuffix=value` onto a condition, unless `key` names a known field.
///
/// String operators keep the value as text; other values are read as JSON
/// scalars and matched against the field's type when evaluated.
pub fn parse_condition_among(key: &str, value: &str, known_fields: &[&str]) -> Condition {
    if known_fields.contains(&key) {
        return Condition::eq(key, parse_scalar(value));
    }
    for (suffix, op) in SUFFIXES {
        if let Some(field) = key.strip_suffix(suffix).filter(|f| !f.is_empty()) {
            let value = match op {
                ConditionOp::StartsWith
                | ConditionOp::EndsWith
                | ConditionOp::Contains
                | ConditionOp::InBetween => Value::String(value.to_string()),
                ConditionOp::InCollection => {
                    Value::Array(value.split(',').map(|v| parse_scalar(v.trim())).collect())
                }
                _ => parse_scalar(value),
            };
            return Condition::new(field, *op, value);
        }
    }
    Condition::eq(key, parse_scalar(value))
}

/// Split on commas that are not inside parentheses.
fn split_top_level(value: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(value[start..].trim());
    items.into_iter().filter(|s| !s.is_empty()).collect()
}

/// `SUM(Number) NumberSum`, `COUNT(*) as Total` or a bare `NAME`.
pub fn parse_aggregate(item: &str) -> AggregateRequest {
    let Some(open) = item.find('(') else {
        return AggregateRequest::new(item.trim(), Vec::new());
    };
    let name = item[..open].trim();
    let close = item[open..].find(')').map(|i| open + i).unwrap_or(item.len());
    let args = item[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let rest = item.get(close + 1..).unwrap_or("").trim();
    let alias = match rest.split_once(char::is_whitespace) {
        Some((kw, alias)) if kw.eq_ignore_ascii_case("as") => alias.trim(),
        _ => rest,
    };

    let mut request = AggregateRequest::new(name, args);
    if !alias.is_empty() {
        request.alias = Some(alias.to_string());
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_suffix_operators() {
        let cases = vec![
            ("NumberGreaterThan", ConditionOp::Greater),
            ("NumberGreaterThanOrEqualTo", ConditionOp::GreaterEqual),
            ("NumberLessThan", ConditionOp::Less),
            ("NumberLessThanOrEqualTo", ConditionOp::LessEqual),
            ("NumberNotEqualTo", ConditionOp::NotEqual),
        ];
        for (key, op) in cases {
            let c = parse_condition(key, "5");
            assert_eq!(c.field, "Number", "{}", key);
            assert_eq!(c.op, op, "{}", key);
            assert_eq!(c.value, json!(5));
        }
    }

    #[test]
    fn test_string_operators_keep_text() {
        let cases = vec![
            ("NameStartsWith", ConditionOp::StartsWith),
            ("NameEndsWith", ConditionOp::EndsWith),
            ("NameContains", ConditionOp::Contains),
        ];
        for (key, op) in cases {
            let c = parse_condition(key, "9");
            assert_eq!(c.field, "Name", "{}", key);
            assert_eq!(c.op, op, "{}", key);
            assert_eq!(c.value, json!("9"));
        }
    }

    #[test]
    fn test_known_fields_are_not_stripped() {
        let c = parse_condition("LoggedIn", "true");
        assert_eq!((c.field.as_str(), c.op), ("Logged", ConditionOp::InCollection));

        let known = ["LoggedIn", "CheckIn", "Name"];
        let c = parse_condition_among("LoggedIn", "true", &known);
        assert_eq!(c.field, "LoggedIn");
        assert_eq!(c.op, ConditionOp::Equals);
        assert_eq!(c.value, json!(true));

        let req = parse_request_with_fields(
            [("CheckIn", "2020"), ("CheckInGreaterThan", "2019"), ("NameIn", "a,b")],
            &known,
        )
        .unwrap();
        let ops: Vec<(&str, ConditionOp)> = req
            .query
            .conditions
            .iter()
            .map(|c| (c.field.as_str(), c.op))
            .collect();
        assert_eq!(
            ops,
            vec![
                ("CheckIn", ConditionOp::Equals),
                ("CheckIn", ConditionOp::Greater),
                ("Name", ConditionOp::InCollection),
            ]
        );
    }

    #[test]
    fn test_plain_key_is_equality() {
        let c = parse_condition("Name", "TestExample3");
        assert_eq!(c.op, ConditionOp::Equals);
        assert_eq!(c.value, json!("TestExample3"));
    }

    #[test]
    fn test_suffix_alone_is_a_field_name() {
        let c = parse_condition("In", "x");
        assert_eq!(c.field, "In");
        assert_eq!(c.op, ConditionOp::Equals);
    }

    #[test]
    fn test_in_and_between_values() {
        let c = parse_condition("NumberIn", "1, 3,five");
        assert_eq!(c.op, ConditionOp::InCollection);
        assert_eq!(c.value, json!([1, 3, "five"]));

        let c = parse_condition("NumberBetween", "2,4");
        assert_eq!(c.op, ConditionOp::InBetween);
        assert_eq!(c.value, json!("2,4"));
    }

    #[test]
    fn test_reserved_keys() {
        let req = parse_request([
            ("Skip", "2"),
            ("Take", "5"),
            ("OrderBy", "Name,-Number"),
            ("Fields", "Name, Number"),
        ])
        .unwrap();
        assert_eq!(req.query.offset, Some(2));
        assert_eq!(req.query.rows, Some(5));
        assert_eq!(
            req.query.order_by,
            Some(OrderBy::asc("Name").then("Number", false))
        );
        assert_eq!(req.query.fields().map(|f| f.len()), Some(2));
        assert!(req.query.conditions.is_empty());
    }

    #[test]
    fn test_malformed_take() {
        let err = parse_request([("Take", "-1")]).unwrap_err();
        assert!(matches!(
            err,
            DataSourceError::InvalidArgument { name: "Take", .. }
        ));
    }

    #[test]
    fn test_malformed_field_names() {
        for (key, value) in [
            ("Na;me", "x"),
            ("OrderBy", "Name,-Num ber"),
            ("Fields", "Name,Num#ber"),
        ] {
            let err = parse_request([(key, value)]).unwrap_err();
            assert!(
                matches!(err, DataSourceError::Expression(_)),
                "{}={}: {:?}",
                key,
                value,
                err
            );
        }
        assert!(parse_request([("Address.City", "Springfield")]).is_ok());
    }

    #[test]
    fn test_include_aggregates() {
        let req = parse_request([(
            "Include",
            "SUM(Number) NumberSum, COUNT(*) as Total, Total, LAST(Name)",
        )])
        .unwrap();
        assert!(req.include_total);
        assert_eq!(req.aggregates.len(), 3);
        assert_eq!(req.aggregates[0].name, "SUM");
        assert_eq!(req.aggregates[0].args, vec!["Number".to_string()]);
        assert_eq!(req.aggregates[0].label(), "NumberSum");
        assert_eq!(req.aggregates[1].args, vec!["*".to_string()]);
        assert_eq!(req.aggregates[1].alias.as_deref(), Some("Total"));
        assert_eq!(req.aggregates[2].label(), "LAST(Name)");
    }

    #[test]
    fn test_conditions_keep_parameter_order() {
        let req = parse_request([("NumberGreaterThan", "5"), ("NameStartsWith", "Test")]).unwrap();
        let fields: Vec<&str> = req.query.conditions.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["Number", "Name"]);
    }
}
