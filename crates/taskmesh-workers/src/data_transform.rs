use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use taskmesh_agent::{worker_agent, Agent, AgentBehavior, LogLevel};
use taskmesh_core::{AgentConfig, Message, Task, TaskmeshError, TaskmeshResult};
use tracing::debug;

/// Factory key of the data transformer.
pub const DATA_TRANSFORMER_TYPE: &str = "data-transformer";

/// Capabilities a data transformer declares by default.
pub const DATA_TRANSFORMER_CAPABILITIES: [&str; 3] =
    ["data-filtering", "data-mapping", "data-aggregation"];

/// Default concurrency limit of a data transformer.
pub const DATA_TRANSFORMER_MAX_CONCURRENT: usize = 5;

/// Comparison applied by a [`Predicate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// Equal.
    #[default]
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Substring for strings, element for arrays.
    Contains,
    /// Field is present and not null.
    Exists,
}

/// A declarative filter on one field. Dotted paths reach nested objects.
#[derive(Debug, Clone, Deserialize)]
pub struct Predicate {
    /// Field path such as `age` or `address.city`.
    pub field: String,
    /// Comparison, `eq` by default.
    #[serde(default)]
    pub op: FilterOp,
    /// Right-hand side of the comparison.
    #[serde(default)]
    pub value: Value,
}

impl Predicate {
    /// Whether an item passes the filter.
    pub fn matches(&self, item: &Value) -> bool {
        let field = lookup(item, &self.field);
        match self.op {
            FilterOp::Exists => field.is_some_and(|v| !v.is_null()),
            FilterOp::Eq => field.is_some_and(|v| loosely_equal(v, &self.value)),
            FilterOp::Ne => !field.is_some_and(|v| loosely_equal(v, &self.value)),
            FilterOp::Gt => compare(field, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(compare(field, &self.value), Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lt => compare(field, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(compare(field, &self.value), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::Contains => match field {
                Some(Value::String(s)) => self.value.as_str().is_some_and(|needle| s.contains(needle)),
                Some(Value::Array(items)) => items.iter().any(|v| loosely_equal(v, &self.value)),
                _ => false,
            },
        }
    }
}

/// Aggregation over a numeric field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    /// Number of items; needs no field.
    #[default]
    Count,
    /// Sum.
    Sum,
    /// Mean, 0 when no value is numeric.
    Avg,
    /// Minimum, null when no value is numeric.
    Min,
    /// Maximum, null when no value is numeric.
    Max,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

#[derive(Debug, Deserialize)]
struct TransformJob {
    action: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    options: TransformOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransformOptions {
    filter: Option<Predicate>,
    fields: Option<Vec<String>>,
    sort_key: Option<String>,
    #[serde(default)]
    sort_order: SortOrder,
    aggregate_field: Option<String>,
    #[serde(default)]
    aggregate_operation: Aggregate,
}

fn lookup<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(item, |current, key| current.get(key))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            matches!((as_number(left), as_number(right)), (Some(a), Some(b)) if a == b)
        }
        _ => left == right,
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => as_number(left)?.partial_cmp(&as_number(right)?),
    }
}

fn compare(field: Option<&Value>, value: &Value) -> Option<Ordering> {
    compare_values(field?, value)
}

fn as_array(data: Value) -> TaskmeshResult<Vec<Value>> {
    match data {
        Value::Array(items) => Ok(items),
        _ => Err(TaskmeshError::InvalidPayload("Data must be an array".into())),
    }
}

/// Keep the items matching `predicate`; everything when there is none.
pub fn filter(data: Vec<Value>, predicate: Option<&Predicate>) -> Vec<Value> {
    match predicate {
        Some(p) => data.into_iter().filter(|item| p.matches(item)).collect(),
        None => data,
    }
}

/// Project each object onto `fields`; items pass through when there are none.
///
/// Missing fields are left out. A dotted path is stored under its full name.
pub fn project(data: Vec<Value>, fields: Option<&[String]>) -> Vec<Value> {
    let Some(fields) = fields else {
        return data;
    };
    data.iter()
        .map(|item| {
            let projected: Map<String, Value> = fields
                .iter()
                .filter_map(|f| lookup(item, f).map(|v| (f.clone(), v.clone())))
                .collect();
            Value::Object(projected)
        })
        .collect()
}

/// Stable sort by `key`. Incomparable pairs keep their order.
pub fn sort(mut data: Vec<Value>, key: Option<&str>, order: SortOrder) -> Vec<Value> {
    let Some(key) = key else {
        return data;
    };
    data.sort_by(|a, b| {
        let ordering = match (lookup(a, key), lookup(b, key)) {
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        };
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    data
}

/// Apply `operation` over the numeric values of `field`.
pub fn aggregate(data: &[Value], field: Option<&str>, operation: Aggregate) -> TaskmeshResult<Value> {
    if operation == Aggregate::Count {
        return Ok(json!(data.len()));
    }
    let field = field.ok_or_else(|| {
        TaskmeshError::InvalidPayload(
            "Field is required for aggregation operations other than count".into(),
        )
    })?;
    let values: Vec<f64> = data
        .iter()
        .filter_map(|item| lookup(item, field).and_then(as_number))
        .filter(|v| !v.is_nan())
        .collect();

    let result = match operation {
        Aggregate::Count => json!(data.len()),
        Aggregate::Sum => json!(values.iter().sum::<f64>()),
        Aggregate::Avg if values.is_empty() => json!(0),
        Aggregate::Avg => json!(values.iter().sum::<f64>() / values.len() as f64),
        Aggregate::Min => values.iter().copied().reduce(f64::min).map_or(Value::Null, |v| json!(v)),
        Aggregate::Max => values.iter().copied().reduce(f64::max).map_or(Value::Null, |v| json!(v)),
    };
    Ok(result)
}

/// Filters, projects, sorts and aggregates arrays of JSON records.
///
/// Task payload: `{"action": "filter" | "map" | "sort" | "aggregate",
/// "data": [...], "options": {...}}`. Filters and projections are
/// declarative; no user code is evaluated.
#[derive(Debug, Default)]
pub struct DataTransformer;

#[async_trait]
impl AgentBehavior for DataTransformer {
    async fn on_initialize(&self, agent: &Arc<Agent>) -> TaskmeshResult<()> {
        agent.log(LogLevel::Info, "Data transform agent initialized");
        Ok(())
    }

    async fn on_terminate(&self, agent: &Arc<Agent>) -> TaskmeshResult<()> {
        agent.log(LogLevel::Info, "Data transform agent terminated");
        Ok(())
    }

    async fn on_execute(&self, _agent: &Arc<Agent>, task: &Task) -> TaskmeshResult<Value> {
        let job: TransformJob = serde_json::from_value(task.payload.clone())
            .map_err(|e| TaskmeshError::InvalidPayload(format!("transform job: {e}")))?;
        let options = job.options;

        let output = match job.action.as_str() {
            "filter" => json!({ "filtered": filter(as_array(job.data)?, options.filter.as_ref()) }),
            "map" => json!({ "mapped": project(as_array(job.data)?, options.fields.as_deref()) }),
            "sort" => json!({
                "sorted": sort(as_array(job.data)?, options.sort_key.as_deref(), options.sort_order)
            }),
            "aggregate" => {
                let data = as_array(job.data)?;
                let result = aggregate(
                    &data,
                    options.aggregate_field.as_deref(),
                    options.aggregate_operation,
                )?;
                json!({ "result": result })
            }
            other => {
                return Err(TaskmeshError::Agent(format!(
                    "Unknown transform action: {other}"
                )))
            }
        };
        Ok(output)
    }

    async fn on_message(&self, agent: &Arc<Agent>, message: Message) -> TaskmeshResult<()> {
        debug!(agent_id = %agent.id(), from = %message.from(), kind = %message.kind(), "Ignoring message");
        Ok(())
    }
}

/// Build a data transformer agent.
pub fn data_transformer(config: AgentConfig) -> Arc<Agent> {
    worker_agent(config, DataTransformer)
}
