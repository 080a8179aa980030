//! Composed, store-bound query streams.
//!
//! A `QueryStream` is the Rust stand-in for a dynamic queryable chain: a scope
//! (which collection / partition / index to read) plus an ordered list of
//! stages. Stage order is significant and preserved exactly as composed, so
//! `Take(5).Where(..)` and `Where(..).Take(5)` are different queries.
//!
//! ```text
//! Scope ── Where ── OrderBy ── Skip ── Take ── Select ──> terminal (rows | ScalarOp)
//! ```

use serde_json::Value;
use std::fmt;

use crate::store::ConsistencyLevel;

/// Where a stream reads from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scope {
    pub database: Option<String>,
    pub collection: String,
    pub partition_key: Option<String>,
    pub index_name: Option<String>,
    pub is_map_reduce: bool,
    pub consistency: Option<ConsistencyLevel>,
}

impl Scope {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    pub fn in_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// `database/collection`, or just the collection when no database is set.
    pub fn path(&self) -> String {
        match &self.database {
            Some(db) => format!("{}/{}", db, self.collection),
            None => self.collection.clone(),
        }
    }
}

/// Compiled textual filter plus its positional parameter values (`@0`, `@1`, ...).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    pub text: String,
    pub params: Vec<Value>,
}

/// Compiled ordering clause, e.g. `Name ASC,Number DESC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering(pub String);

/// Compiled projection selector: `Name` or `new(Name,Number)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection(pub String);

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Where(Predicate),
    OrderBy(Ordering),
    Skip(usize),
    Take(usize),
    Select(Projection),
}

/// Aggregate functions a store evaluates natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    Min,
    Max,
    Sum,
    Average,
}

impl AggregateFn {
    /// Evaluator method name; `AVG` maps to `Average`, the rest are capitalized.
    pub fn method_name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "Count",
            AggregateFn::Min => "Min",
            AggregateFn::Max => "Max",
            AggregateFn::Sum => "Sum",
            AggregateFn::Average => "Average",
        }
    }
}

/// Terminal operation evaluated by the store instead of materializing rows.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarOp {
    Count,
    First,
    Last,
    Aggregate { func: AggregateFn, field: String },
}

impl fmt::Display for ScalarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarOp::Count => write!(f, "Count()"),
            ScalarOp::First => write!(f, "FirstOrDefault()"),
            ScalarOp::Last => write!(f, "Last()"),
            ScalarOp::Aggregate { func, field } => {
                write!(f, "Aggregate(\"{}\", \"{}\")", func.method_name(), field)
            }
        }
    }
}

/// A scoped, composable query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryStream {
    pub scope: Scope,
    pub stages: Vec<Stage>,
}

impl QueryStream {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            stages: Vec::new(),
        }
    }

    pub fn push(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn filter(self, predicate: Predicate) -> Self {
        self.push(Stage::Where(predicate))
    }

    pub fn order_by(self, ordering: Ordering) -> Self {
        self.push(Stage::OrderBy(ordering))
    }

    pub fn skip(self, n: usize) -> Self {
        self.push(Stage::Skip(n))
    }

    pub fn take(self, n: usize) -> Self {
        self.push(Stage::Take(n))
    }

    pub fn select(self, projection: Projection) -> Self {
        self.push(Stage::Select(projection))
    }

    pub fn has_skip(&self) -> bool {
        self.stages.iter().any(|s| matches!(s, Stage::Skip(_)))
    }
}

impl fmt::Display for QueryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scope.path())?;
        for stage in &self.stages {
            match stage {
                Stage::Where(p) => {
                    let params: Vec<String> = p.params.iter().map(|v| v.to_string()).collect();
                    write!(f, ".Where(\"{}\", [{}])", p.text, params.join(", "))?
                }
                Stage::OrderBy(o) => write!(f, ".OrderBy(\"{}\")", o.0)?,
                Stage::Skip(n) => write!(f, ".Skip({})", n)?,
                Stage::Take(n) => write!(f, ".Take({})", n)?,
                Stage::Select(p) => write!(f, ".Select(\"{}\")", p.0)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_path() {
        assert_eq!(Scope::collection("Docs").path(), "Docs");
        assert_eq!(
            Scope::collection("Docs").in_database("test").path(),
            "test/Docs"
        );
    }

    #[test]
    fn test_stages_keep_composition_order() {
        let stream = QueryStream::new(Scope::collection("Docs"))
            .take(5)
            .filter(Predicate {
                text: "Number > @0".into(),
                params: vec![json!(5)],
            });
        assert!(matches!(stream.stages[0], Stage::Take(5)));
        assert!(matches!(stream.stages[1], Stage::Where(_)));
        assert!(!stream.has_skip());
    }

    #[test]
    fn test_display_renders_chain() {
        let stream = QueryStream::new(Scope::collection("Docs"))
            .filter(Predicate {
                text: "Name.StartsWith(@0)".into(),
                params: vec![json!("Test")],
            })
            .order_by(Ordering("Name ASC".into()))
            .skip(2)
            .take(5)
            .select(Projection("Name".into()));
        assert_eq!(
            stream.to_string(),
            "Docs.Where(\"Name.StartsWith(@0)\", [\"Test\"]).OrderBy(\"Name ASC\").Skip(2).Take(5).Select(\"Name\")"
        );
        assert!(stream.has_skip());
    }

    #[test]
    fn test_method_names() {
        assert_eq!(AggregateFn::Average.method_name(), "Average");
        assert_eq!(AggregateFn::Sum.method_name(), "Sum");
        let op = ScalarOp::Aggregate {
            func: AggregateFn::Max,
            field: "Number".into(),
        };
        assert_eq!(op.to_string(), "Aggregate(\"Max\", \"Number\")");
    }
}
