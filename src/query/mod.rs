//! Store-independent query model and its compilation into query streams.

pub mod compiler;
pub mod request;
pub mod stream;
pub mod types;

pub use compiler::{
    apply_conditions, apply_limits, apply_sorting, apply_specific_fields, compile_conditions,
    compile_ordering, compile_projection, compose,
};
pub use request::{parse_request, parse_request_with_fields, QueryRequest};
pub use stream::{AggregateFn, Predicate, QueryStream, ScalarOp, Scope, Stage};
pub use types::{
    aggregate_field, AggregateName, AggregateRequest, Condition, ConditionOp, DataQuery, OrderBy,
    QueryTerm,
};
