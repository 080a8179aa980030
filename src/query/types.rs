//! Normalized query model.
//!
//! This module defines the store-independent description of a client's query:
//! - Filter conditions joined by logical terms
//! - Ordering (explicit or synthesized from the primary key)
//! - Pagination window (`offset` / `rows`)
//! - Field projection
//! - Aggregate requests (`COUNT`, `MIN`, `MAX`, `AVG`, `SUM`, `FIRST`, `LAST`)
//!
//! Every value here is request-scoped and consumed read-only by the adapters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A full normalized query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataQuery {
    pub conditions: Vec<Condition>,
    pub order_by: Option<OrderBy>,
    pub offset: Option<usize>,
    pub rows: Option<usize>,
    pub only_fields: Option<Vec<String>>,
}

impl DataQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Restrict the result shape to `fields`. An empty list clears the projection.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.only_fields = if fields.is_empty() { None } else { Some(fields) };
        self
    }

    /// Projection fields, if a non-empty set was requested.
    pub fn fields(&self) -> Option<&[String]> {
        self.only_fields
            .as_deref()
            .filter(|fields| !fields.is_empty())
    }

    /// The widened native window for stores that cannot skip: `rows + offset`.
    pub fn window(&self) -> Option<usize> {
        self.rows.map(|rows| rows + self.offset.unwrap_or(0))
    }
}

/// One filter term of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOp,
    pub value: Value,
    /// Joins this condition to the *next* one. Ignored on the last condition.
    #[serde(default)]
    pub term: QueryTerm,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: ConditionOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
            term: QueryTerm::And,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOp::Equals, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOp::Greater, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOp::Less, value)
    }

    pub fn between(field: impl Into<String>, low: impl fmt::Display, high: impl fmt::Display) -> Self {
        Self::new(
            field,
            ConditionOp::InBetween,
            Value::String(format!("{},{}", low, high)),
        )
    }

    /// Join the following condition with `OR` instead of `AND`.
    pub fn or(mut self) -> Self {
        self.term = QueryTerm::Or;
        self
    }
}

/// The closed operator vocabulary understood by the predicate builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOp {
    Equals,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    StartsWith,
    EndsWith,
    Contains,
    InCollection,
    InBetween,
}

impl ConditionOp {
    /// Textual operator symbol for binary comparisons.
    pub fn alias(&self) -> Option<&'static str> {
        match self {
            ConditionOp::Equals => Some("=="),
            ConditionOp::NotEqual => Some("!="),
            ConditionOp::Less => Some("<"),
            ConditionOp::LessEqual => Some("<="),
            ConditionOp::Greater => Some(">"),
            ConditionOp::GreaterEqual => Some(">="),
            ConditionOp::StartsWith
            | ConditionOp::EndsWith
            | ConditionOp::Contains
            | ConditionOp::InCollection
            | ConditionOp::InBetween => None,
        }
    }

    /// Number of positional parameter slots this operator consumes.
    pub fn arity(&self) -> usize {
        match self {
            ConditionOp::InBetween => 2,
            _ => 1,
        }
    }
}

/// Logical join between consecutive conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryTerm {
    #[default]
    And,
    Or,
}

impl QueryTerm {
    pub fn keyword(&self) -> &'static str {
        match self {
            QueryTerm::And => "AND",
            QueryTerm::Or => "OR",
        }
    }
}

/// Ordering request: parallel field-name and direction lists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderBy {
    pub field_names: Vec<String>,
    pub ascending: Vec<bool>,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field_names: vec![field.into()],
            ascending: vec![true],
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field_names: vec![field.into()],
            ascending: vec![false],
        }
    }

    /// Append another sort key.
    pub fn then(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.field_names.push(field.into());
        self.ascending.push(ascending);
        self
    }

    /// Deterministic ordering synthesized when FIRST/LAST needs one.
    pub fn primary_key(primary_key: &str) -> Self {
        Self::asc(primary_key)
    }

    pub fn is_empty(&self) -> bool {
        self.field_names.is_empty()
    }

    /// A copy with every direction flipped.
    pub fn inverted(&self) -> Self {
        Self {
            field_names: self.field_names.clone(),
            ascending: self.ascending.iter().map(|asc| !asc).collect(),
        }
    }

    /// `(field, ascending)` pairs. A missing direction flag defaults to ascending.
    pub fn keys(&self) -> impl Iterator<Item = (&str, bool)> {
        self.field_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), self.ascending.get(i).copied().unwrap_or(true)))
    }
}

/// Fixed aggregate vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateName {
    Count,
    Min,
    Max,
    Avg,
    Sum,
    First,
    Last,
}

impl AggregateName {
    /// Case-insensitive lookup. Anything outside the vocabulary is not an aggregate.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "COUNT" => Some(AggregateName::Count),
            "MIN" => Some(AggregateName::Min),
            "MAX" => Some(AggregateName::Max),
            "AVG" => Some(AggregateName::Avg),
            "SUM" => Some(AggregateName::Sum),
            "FIRST" => Some(AggregateName::First),
            "LAST" => Some(AggregateName::Last),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateName::Count => "COUNT",
            AggregateName::Min => "MIN",
            AggregateName::Max => "MAX",
            AggregateName::Avg => "AVG",
            AggregateName::Sum => "SUM",
            AggregateName::First => "FIRST",
            AggregateName::Last => "LAST",
        }
    }
}

impl fmt::Display for AggregateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One aggregate requested alongside (or instead of) the result rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    /// Raw name as requested; may be outside the aggregate vocabulary.
    pub name: String,
    pub args: Vec<String>,
    pub alias: Option<String>,
}

impl AggregateRequest {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
            alias: None,
        }
    }

    pub fn aggregate(&self) -> Option<AggregateName> {
        AggregateName::parse(&self.name)
    }

    /// Key under which the result is reported: the alias, else `NAME(args)`.
    pub fn label(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => format!("{}({})", self.name, self.args.join(",")),
        }
    }
}

/// The field named by an aggregate's first argument, or `None` for a whole-row
/// (`*` or blank) argument. A trailing alias (`Name FirstName`) is ignored.
pub fn aggregate_field(args: &[String]) -> Option<&str> {
    let first = args.first()?.split_whitespace().next()?;
    if first == "*" {
        None
    } else {
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_query_is_empty() {
        let q = DataQuery::default();
        assert!(q.conditions.is_empty());
        assert!(q.order_by.is_none());
        assert!(q.fields().is_none());
        assert!(q.window().is_none());
    }

    #[test]
    fn test_empty_field_list_clears_projection() {
        let q = DataQuery::new().with_fields(Vec::<String>::new());
        assert!(q.only_fields.is_none());

        let q = DataQuery::new().with_fields(["Name"]);
        assert_eq!(q.fields(), Some(&["Name".to_string()][..]));
    }

    #[test]
    fn test_window_widens_by_offset() {
        let q = DataQuery::new().with_offset(2).with_rows(5);
        assert_eq!(q.window(), Some(7));

        let q = DataQuery::new().with_rows(5);
        assert_eq!(q.window(), Some(5));

        // No row count means no ceiling, whatever the offset.
        let q = DataQuery::new().with_offset(3);
        assert_eq!(q.window(), None);
    }

    #[test]
    fn test_operator_aliases() {
        assert_eq!(ConditionOp::Equals.alias(), Some("=="));
        assert_eq!(ConditionOp::NotEqual.alias(), Some("!="));
        assert_eq!(ConditionOp::GreaterEqual.alias(), Some(">="));
        assert_eq!(ConditionOp::StartsWith.alias(), None);
        assert_eq!(ConditionOp::InBetween.arity(), 2);
        assert_eq!(ConditionOp::Contains.arity(), 1);
    }

    #[test]
    fn test_order_by_inverted_leaves_original() {
        let order = OrderBy::asc("Name").then("Number", false);
        let inverted = order.inverted();
        assert_eq!(inverted.ascending, vec![false, true]);
        assert_eq!(order.ascending, vec![true, false]);
        assert_eq!(inverted.field_names, order.field_names);
    }

    #[test]
    fn test_order_by_keys_default_ascending() {
        let order = OrderBy {
            field_names: vec!["A".into(), "B".into()],
            ascending: vec![false],
        };
        let keys: Vec<_> = order.keys().collect();
        assert_eq!(keys, vec![("A", false), ("B", true)]);
    }

    #[test]
    fn test_aggregate_name_parse() {
        assert_eq!(AggregateName::parse("sum"), Some(AggregateName::Sum));
        assert_eq!(AggregateName::parse(" Avg "), Some(AggregateName::Avg));
        assert_eq!(AggregateName::parse("LAST"), Some(AggregateName::Last));
        assert_eq!(AggregateName::parse("MEDIAN"), None);
        assert_eq!(AggregateName::parse(""), None);
    }

    #[test]
    fn test_aggregate_field() {
        assert_eq!(aggregate_field(&[]), None);
        assert_eq!(aggregate_field(&["*".into()]), None);
        assert_eq!(aggregate_field(&["  ".into()]), None);
        assert_eq!(aggregate_field(&["Number".into()]), Some("Number"));
        assert_eq!(aggregate_field(&["Name FirstName".into()]), Some("Name"));
    }

    #[test]
    fn test_aggregate_label() {
        let mut req = AggregateRequest::new("SUM", vec!["Number".into()]);
        assert_eq!(req.label(), "SUM(Number)");
        req.alias = Some("NumberSum".into());
        assert_eq!(req.label(), "NumberSum");
    }

    #[test]
    fn test_condition_serialization_defaults_term() {
        let json = r#"{"field":"Name","op":"StartsWith","value":"Test"}"#;
        let c: Condition = serde_json::from_str(json).unwrap();
        assert_eq!(c.term, QueryTerm::And);
        assert_eq!(c.value, json!("Test"));
    }

    #[test]
    fn test_between_value_is_comma_joined() {
        let c = Condition::between("Number", 2, 4);
        assert_eq!(c.value, json!("2,4"));
        assert_eq!(c.op, ConditionOp::InBetween);
    }
}
