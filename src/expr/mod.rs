/// Dynamic expression language.
///
/// The query compiler emits predicates, orderings and projections as text
/// (`Number > @0 AND Name.StartsWith(@1)`, `Name ASC`, `new(Name,Number)`).
/// This module is the evaluator side of that contract:
///
/// ```text
/// text ──> parser.rs ──> Expr / SortKey / Selector ──> eval.rs ──> documents
/// ```
///
/// Stores that execute queries in-process (see `store::memory`) parse the
/// compiled text here and evaluate it over JSON documents.
pub mod eval;
pub mod parser;

use serde_json::Value;

pub use eval::{compare_values, fold_aggregate, matches, project, resolve, sort_documents};
pub use parser::{parse_ordering, parse_predicate, parse_projection};

/// Dotted member path, e.g. `Address.City`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(pub Vec<String>);

impl FieldPath {
    /// Split `Address.City` into its segments.
    pub fn dotted(path: &str) -> Self {
        FieldPath(path.split('.').map(|s| s.trim().to_string()).collect())
    }

    /// Final segment; used as the key of a synthesized record.
    pub fn leaf(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// String / collection member calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    StartsWith,
    EndsWith,
    Contains,
}

impl Method {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "StartsWith" => Some(Method::StartsWith),
            "EndsWith" => Some(Method::EndsWith),
            "Contains" => Some(Method::Contains),
            _ => None,
        }
    }
}

/// Right-hand side of a term: a positional parameter or an inline literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Param(usize),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Not(Box<Expr>),
    Compare {
        field: FieldPath,
        op: CompareOp,
        value: Operand,
    },
    Call {
        field: FieldPath,
        method: Method,
        arg: Operand,
    },
    Between {
        field: FieldPath,
        low: Operand,
        high: Operand,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: FieldPath,
    pub ascending: bool,
}

/// Result shape of a projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Single member passthrough.
    Field(FieldPath),
    /// Synthesized record holding only the listed members.
    Record(Vec<FieldPath>),
}
