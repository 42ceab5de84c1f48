//! Filter-expression compiler: from the declarative wire filter to a backend
//! query predicate.
//!
//! Wire syntax (JSON):
//! - Field node: `{"startDate": {"eq": "2024-01-01T00:00:00.000Z"}}`
//! - Combinators: `and` / `or` (array of filter objects), `not` (one object)
//! - Comparators: eq, ne, lt, le, gt, ge, in, notIn, between, startsWith,
//!   exists
//!
//! Multiple comparators on one field, and sibling nodes at one level, combine
//! by conjunction. The `id` field compiles against the store's primary-key
//! field name.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::errors::EngineError;
use crate::store::{storage_field_name, Document};

const COMBINATOR_AND: &str = "and";
const COMBINATOR_OR: &str = "or";
const COMBINATOR_NOT: &str = "not";

// ─── Wire tree ──────────────────────────────────────────────────────────

/// One node of the caller-supplied filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// `field → {comparator → value}`; comparator names are validated at
    /// compile time.
    Field {
        field: String,
        comparators: Map<String, Value>,
    },
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
}

impl FilterNode {
    /// Parses one wire filter object into its sibling nodes.
    ///
    /// `null` parses to no nodes. A top-level key that is neither a known
    /// combinator nor an object-valued field cannot be interpreted and is
    /// skipped with a warning.
    pub fn from_value(filter: &Value) -> Result<Vec<FilterNode>, EngineError> {
        let map = match filter {
            Value::Null => return Ok(Vec::new()),
            Value::Object(map) => map,
            other => {
                return Err(EngineError::InvalidInput(format!(
                    "filter must be an object, got `{other}`"
                )))
            }
        };

        let mut nodes = Vec::new();
        for (key, value) in map {
            match key.as_str() {
                COMBINATOR_AND => nodes.push(FilterNode::And(Self::child_nodes(key, value)?)),
                COMBINATOR_OR => nodes.push(FilterNode::Or(Self::child_nodes(key, value)?)),
                COMBINATOR_NOT => {
                    let children = FilterNode::from_value(value)?;
                    nodes.push(FilterNode::Not(Box::new(Self::grouped(children))));
                }
                field => match value {
                    Value::Object(comparators) => nodes.push(FilterNode::Field {
                        field: field.to_string(),
                        comparators: comparators.clone(),
                    }),
                    _ => {
                        tracing::warn!(key = field, "skipping unrecognised filter combinator");
                    }
                },
            }
        }
        Ok(nodes)
    }

    fn child_nodes(combinator: &str, value: &Value) -> Result<Vec<FilterNode>, EngineError> {
        let children = value.as_array().ok_or_else(|| {
            EngineError::InvalidInput(format!(
                "`{combinator}` filter requires an array of filter objects"
            ))
        })?;
        children
            .iter()
            .map(|child| Ok(Self::grouped(FilterNode::from_value(child)?)))
            .collect()
    }

    /// Sibling nodes of one filter object form an implicit conjunction.
    fn grouped(mut nodes: Vec<FilterNode>) -> FilterNode {
        match nodes.len() {
            1 => nodes.remove(0),
            _ => FilterNode::And(nodes),
        }
    }
}

// ─── Comparators ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Between,
    StartsWith,
    Exists,
}

impl Comparator {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => Comparator::Eq,
            "ne" => Comparator::Ne,
            "lt" => Comparator::Lt,
            "le" => Comparator::Le,
            "gt" => Comparator::Gt,
            "ge" => Comparator::Ge,
            "in" => Comparator::In,
            "notIn" => Comparator::NotIn,
            "between" => Comparator::Between,
            "startsWith" => Comparator::StartsWith,
            "exists" => Comparator::Exists,
            _ => return None,
        })
    }
}

// ─── Backend predicate ──────────────────────────────────────────────────

/// Backend query form produced by the compiler and consumed by stores.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Field { field: String, tests: Vec<Comparison> },
}

/// One test against a single document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Le(Value),
    Gt(Value),
    Ge(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Between(Value, Value),
    StartsWith(String),
    Exists(bool),
}

impl Predicate {
    /// An empty conjunction; matches every document.
    pub fn match_all() -> Predicate {
        Predicate::And(Vec::new())
    }

    /// Conjunction of the given parts, unwrapped when only one part remains.
    pub fn conjunction(mut parts: Vec<Predicate>) -> Predicate {
        match parts.len() {
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }

    /// True when this predicate applies no test at all.
    pub fn is_empty(&self) -> bool {
        matches!(self, Predicate::And(parts) if parts.is_empty())
    }

    /// Evaluates the predicate against one document.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Predicate::And(parts) => parts.iter().all(|part| part.matches(document)),
            Predicate::Or(parts) => parts.iter().any(|part| part.matches(document)),
            Predicate::Not(inner) => !inner.matches(document),
            Predicate::Field { field, tests } => {
                let value = document.get(field);
                tests.iter().all(|test| test.matches(value))
            }
        }
    }
}

impl Comparison {
    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Comparison::Eq(expected) => values_equal(value, expected),
            Comparison::Ne(expected) => !values_equal(value, expected),
            Comparison::Lt(bound) => ordered(value, bound) == Some(Ordering::Less),
            Comparison::Le(bound) => {
                matches!(ordered(value, bound), Some(Ordering::Less | Ordering::Equal))
            }
            Comparison::Gt(bound) => ordered(value, bound) == Some(Ordering::Greater),
            Comparison::Ge(bound) => {
                matches!(ordered(value, bound), Some(Ordering::Greater | Ordering::Equal))
            }
            Comparison::In(allowed) => allowed.iter().any(|v| values_equal(value, v)),
            Comparison::NotIn(denied) => !denied.iter().any(|v| values_equal(value, v)),
            Comparison::Between(lo, hi) => {
                matches!(ordered(value, lo), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(ordered(value, hi), Some(Ordering::Less | Ordering::Equal))
            }
            Comparison::StartsWith(prefix) => value
                .and_then(Value::as_str)
                .map(|s| {
                    s.to_ascii_lowercase()
                        .starts_with(&prefix.to_ascii_lowercase())
                })
                .unwrap_or(false),
            Comparison::Exists(expected) => value.is_some() == *expected,
        }
    }
}

/// An absent field compares equal to an explicit `null`.
fn values_equal(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(actual) => match (actual, expected) {
            (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
            (a, b) => a == b,
        },
    }
}

/// Ordering between a document value and a bound; `None` when the two are not
/// comparable (absent field or mismatched types).
fn ordered(value: Option<&Value>, bound: &Value) -> Option<Ordering> {
    match (value?, bound) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Total order over optional JSON values, used for sorting: absent and null
/// first, then booleans, numbers, strings, arrays, objects.
pub(crate) fn total_compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ─── Compiler ───────────────────────────────────────────────────────────

/// Compiles parsed filter nodes into one backend predicate. Pure and
/// recursive; sibling nodes combine by conjunction.
pub fn compile(nodes: &[FilterNode]) -> Result<Predicate, EngineError> {
    let parts = nodes
        .iter()
        .map(compile_node)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Predicate::conjunction(parts))
}

fn compile_node(node: &FilterNode) -> Result<Predicate, EngineError> {
    match node {
        FilterNode::And(children) => Ok(Predicate::And(compile_children(children)?)),
        FilterNode::Or(children) => Ok(Predicate::Or(compile_children(children)?)),
        FilterNode::Not(child) => Ok(Predicate::Not(Box::new(compile_node(child)?))),
        FilterNode::Field { field, comparators } => compile_field(field, comparators),
    }
}

fn compile_children(children: &[FilterNode]) -> Result<Vec<Predicate>, EngineError> {
    children.iter().map(compile_node).collect()
}

fn compile_field(field: &str, comparators: &Map<String, Value>) -> Result<Predicate, EngineError> {
    let mut tests = Vec::with_capacity(comparators.len());
    for (name, value) in comparators {
        let comparator = Comparator::parse(name).ok_or_else(|| EngineError::UnknownFilterOperator {
            operator: name.clone(),
            field: field.to_string(),
        })?;
        tests.push(build_comparison(comparator, value, field)?);
    }
    Ok(Predicate::Field {
        field: storage_field_name(field).to_string(),
        tests,
    })
}

fn build_comparison(
    comparator: Comparator,
    value: &Value,
    field: &str,
) -> Result<Comparison, EngineError> {
    Ok(match comparator {
        Comparator::Eq => Comparison::Eq(value.clone()),
        Comparator::Ne => Comparison::Ne(value.clone()),
        Comparator::Lt => Comparison::Lt(value.clone()),
        Comparator::Le => Comparison::Le(value.clone()),
        Comparator::Gt => Comparison::Gt(value.clone()),
        Comparator::Ge => Comparison::Ge(value.clone()),
        Comparator::In => Comparison::In(comparison_array("in", value, field)?),
        Comparator::NotIn => Comparison::NotIn(comparison_array("notIn", value, field)?),
        Comparator::Between => {
            let range = comparison_array("between", value, field)?;
            if range.len() != 2 {
                return Err(EngineError::InvalidInput(format!(
                    "`between` on field `{field}` requires a two-element array"
                )));
            }
            let mut range = range.into_iter();
            let lo = range.next().unwrap_or(Value::Null);
            let hi = range.next().unwrap_or(Value::Null);
            Comparison::Between(lo, hi)
        }
        Comparator::StartsWith => {
            let prefix = value.as_str().ok_or_else(|| {
                EngineError::InvalidInput(format!(
                    "`startsWith` on field `{field}` requires a string value"
                ))
            })?;
            Comparison::StartsWith(prefix.to_string())
        }
        Comparator::Exists => {
            let expected = value.as_bool().ok_or_else(|| {
                EngineError::InvalidInput(format!(
                    "`exists` on field `{field}` requires a boolean value"
                ))
            })?;
            Comparison::Exists(expected)
        }
    })
}

fn comparison_array(name: &str, value: &Value, field: &str) -> Result<Vec<Value>, EngineError> {
    value.as_array().cloned().ok_or_else(|| {
        EngineError::InvalidInput(format!("`{name}` on field `{field}` requires an array value"))
    })
}
