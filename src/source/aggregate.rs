//! Aggregate evaluation shared by every adapter.
//!
//! - `COUNT(*)` / `COUNT()` is the adapter's own `count`
//! - `FIRST(f)` sorts (by the primary key when no order was given) and takes the
//!   first row of the window
//! - `LAST(f)` takes the true last row when the store supports it; otherwise the
//!   order is inverted and it behaves as `FIRST`
//! - `MIN`, `MAX`, `SUM`, `AVG`, `COUNT(f)` fold over the sorted, limited stream
//!
//! When `LAST` is emulated, rows with equal sort keys come back in stored order
//! under both directions (the sort is stable), so the emulation returns the
//! first of a tied group where a native `LAST` returns the last of it.

use serde_json::Value;
use tracing::debug;

use super::DataSource;
use crate::cancel::CancellationToken;
use crate::error::{DataSourceError, Result};
use crate::query::compiler::{apply_conditions, apply_limits, apply_sorting, apply_specific_fields};
use crate::query::stream::{AggregateFn, QueryStream, ScalarOp};
use crate::query::types::{aggregate_field, AggregateName, DataQuery, OrderBy};

/// Evaluate `name(args)` over `q`. `Ok(None)` for names outside the aggregate vocabulary.
pub async fn select_aggregate<S>(
    source: &S,
    q: &DataQuery,
    name: &str,
    args: &[String],
    cancel: &CancellationToken,
) -> Result<Option<Value>>
where
    S: DataSource + ?Sized,
{
    let Some(aggregate) = AggregateName::parse(name) else {
        debug!(aggregate = name, "not an aggregate");
        return Ok(None);
    };
    let field = aggregate_field(args);
    debug!(aggregate = %aggregate, field = ?field, "selecting aggregate");

    match aggregate {
        AggregateName::Count if field.is_none() => {
            let count = source.count(q, cancel).await?;
            Ok(Some(Value::from(count)))
        }
        AggregateName::First => select_edge(source, q, field, false, cancel).await,
        AggregateName::Last if source.supports_last() => {
            select_native_last(source, q, field, cancel).await
        }
        AggregateName::Last => select_edge(source, q, field, true, cancel).await,
        AggregateName::Count => fold(source, q, AggregateFn::Count, field, cancel).await,
        AggregateName::Min => fold(source, q, AggregateFn::Min, field, cancel).await,
        AggregateName::Max => fold(source, q, AggregateFn::Max, field, cancel).await,
        AggregateName::Sum => fold(source, q, AggregateFn::Sum, field, cancel).await,
        AggregateName::Avg => fold(source, q, AggregateFn::Average, field, cancel).await,
    }
}

/// The order FIRST / LAST sort by: the requested one, or ascending primary key.
fn edge_order<S: DataSource + ?Sized>(source: &S, q: &DataQuery, invert: bool) -> OrderBy {
    let order = q
        .order_by
        .clone()
        .filter(|o| !o.is_empty())
        .unwrap_or_else(|| OrderBy::primary_key(source.primary_key()));
    if invert {
        order.inverted()
    } else {
        order
    }
}

fn project_field(stream: QueryStream, field: Option<&str>) -> QueryStream {
    match field {
        Some(field) => {
            let fields = [field.to_string()];
            apply_specific_fields(stream, Some(&fields[..]))
        }
        None => stream,
    }
}

/// First row under the (possibly inverted) edge order.
async fn select_edge<S>(
    source: &S,
    q: &DataQuery,
    field: Option<&str>,
    invert: bool,
    cancel: &CancellationToken,
) -> Result<Option<Value>>
where
    S: DataSource + ?Sized,
{
    let order = edge_order(source, q, invert);
    let stream = apply_conditions(source.init_query(q), &q.conditions);
    let stream = apply_sorting(stream, Some(&order));

    let stream = if source.supports_skip() {
        project_field(apply_limits(stream, q.offset, q.rows), field)
    } else {
        // No offset without native skip: the edge is the first row overall.
        project_field(stream, field).take(1)
    };

    source.execute_scalar(&stream, &ScalarOp::First, cancel).await
}

async fn select_native_last<S>(
    source: &S,
    q: &DataQuery,
    field: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Option<Value>>
where
    S: DataSource + ?Sized,
{
    let stream = apply_conditions(source.init_query(q), &q.conditions);
    let stream = apply_sorting(stream, q.order_by.as_ref());
    let stream = project_field(apply_limits(stream, q.offset, q.rows), field);
    source.execute_scalar(&stream, &ScalarOp::Last, cancel).await
}

async fn fold<S>(
    source: &S,
    q: &DataQuery,
    func: AggregateFn,
    field: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Option<Value>>
where
    S: DataSource + ?Sized,
{
    let Some(field) = field else {
        return Err(DataSourceError::invalid_argument(
            "args",
            format!("{} needs a field argument", func.method_name()),
        ));
    };

    let stream = apply_conditions(source.init_query(q), &q.conditions);
    let stream = apply_sorting(stream, q.order_by.as_ref());
    let stream = apply_limits(stream, q.offset, q.rows);

    if let Some(fields) = q.fields() {
        debug!(key = field, fields = ?fields, "grouping is not applied to aggregates");
    }

    let op = ScalarOp::Aggregate {
        func,
        field: field.to_string(),
    };
    source.execute_scalar(&stream, &op, cancel).await
}
