//! Condition evaluation: decides skip/eligible for a task whose dependencies
//! are satisfied. Pure reads over the graph store.
//!
//! Errors propagate out of [`evaluate`]; the state machine downgrades them to
//! "condition false" with a warning so one bad reference cannot stall the
//! whole DAG.

use graph::store::GraphError;
use serde_json::Value;
use thiserror::Error;

use crate::models::condition::{ConditionOperator, TaskCondition};
use crate::services::resolver::{self, ResolveCtx, ResolveError};

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("Invalid condition expression '{expression}': {reason}")]
    BadExpression { expression: String, reason: String },
}

pub async fn evaluate(
    condition: &TaskCondition,
    ctx: &ResolveCtx<'_>,
) -> Result<bool, ConditionError> {
    match condition {
        TaskCondition::NodeStatus { node, expected } => {
            let node_id = resolver::resolve(node, ctx).await?;
            let status = ctx.store.get_status(node_id).await?;
            Ok(status.is_some_and(|s| expected.contains(&s)))
        }
        TaskCondition::FieldValue {
            node,
            field_key,
            operator,
            value,
        } => {
            let node_id = resolver::resolve(node, ctx).await?;
            let node = ctx.store.get_node(node_id).await?;
            Ok(compare(operator, node.field(field_key), value.as_ref()))
        }
        TaskCondition::EdgeExists {
            edge_type,
            from_node,
            to_node,
        } => {
            let from = resolver::resolve(from_node, ctx).await?;
            let to = resolver::resolve(to_node, ctx).await?;
            Ok(ctx
                .store
                .edge_exists(ctx.workflow_id, edge_type, from, to)
                .await?)
        }
        TaskCondition::Expression { expression } => evaluate_expression(expression, ctx).await,
    }
}

/// Compare a (possibly absent) field value against an expected value.
/// Missing fields compare as JSON null; mismatched types compare false
/// rather than erroring.
pub fn compare(operator: &ConditionOperator, actual: Option<&Value>, expected: Option<&Value>) -> bool {
    let actual_or_null = actual.unwrap_or(&Value::Null);
    let expected_or_null = expected.unwrap_or(&Value::Null);
    match operator {
        ConditionOperator::IsSet => !actual_or_null.is_null(),
        ConditionOperator::IsNotSet => actual_or_null.is_null(),
        ConditionOperator::Eq => actual_or_null == expected_or_null,
        ConditionOperator::Neq => actual_or_null != expected_or_null,
        ConditionOperator::Gt | ConditionOperator::Gte | ConditionOperator::Lt | ConditionOperator::Lte => {
            compare_ordered(operator, actual_or_null, expected_or_null)
        }
        ConditionOperator::Contains => match (actual_or_null, expected_or_null) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle),
            (Value::Array(items), needle) => items.contains(needle),
            _ => false,
        },
    }
}

fn compare_ordered(operator: &ConditionOperator, actual: &Value, expected: &Value) -> bool {
    let ordering = match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    };
    match ordering {
        Some(ordering) => match operator {
            ConditionOperator::Gt => ordering.is_gt(),
            ConditionOperator::Gte => ordering.is_ge(),
            ConditionOperator::Lt => ordering.is_lt(),
            ConditionOperator::Lte => ordering.is_le(),
            _ => false,
        },
        None => false,
    }
}

/// Minimal expression form: `<field-path> <op> <literal>` evaluated against
/// the instance's root node. The path `status` reads the node status; any
/// other path walks dotted keys through the field map. Literals are JSON;
/// bare words read as strings.
async fn evaluate_expression(
    expression: &str,
    ctx: &ResolveCtx<'_>,
) -> Result<bool, ConditionError> {
    let (path, operator, literal) = parse_expression(expression)?;
    let root_id = ctx.root_node_id.ok_or_else(|| ConditionError::BadExpression {
        expression: expression.to_string(),
        reason: "expression conditions require a root-scoped instance".to_string(),
    })?;
    let node = ctx.store.get_node(root_id).await?;

    let actual = if path == "status" {
        node.status.clone().map(Value::String)
    } else {
        lookup_path(&node.fields, &path)
    };
    Ok(compare(&operator, actual.as_ref(), Some(&literal)))
}

fn lookup_path(fields: &std::collections::HashMap<String, Value>, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = fields.get(first)?.clone();
    for segment in segments {
        current = current.get(segment)?.clone();
    }
    Some(current)
}

fn parse_expression(
    expression: &str,
) -> Result<(String, ConditionOperator, Value), ConditionError> {
    // Two-character operators first so `>=` is not read as `>` + `=`.
    const OPERATORS: [(&str, ConditionOperator); 6] = [
        ("==", ConditionOperator::Eq),
        ("!=", ConditionOperator::Neq),
        (">=", ConditionOperator::Gte),
        ("<=", ConditionOperator::Lte),
        (">", ConditionOperator::Gt),
        ("<", ConditionOperator::Lt),
    ];

    for (token, operator) in OPERATORS {
        if let Some((lhs, rhs)) = expression.split_once(token) {
            let path = lhs.trim();
            let raw = rhs.trim();
            if path.is_empty() || raw.is_empty() {
                return Err(ConditionError::BadExpression {
                    expression: expression.to_string(),
                    reason: "missing operand".to_string(),
                });
            }
            let literal = serde_json::from_str(raw)
                .unwrap_or_else(|_| Value::String(raw.to_string()));
            return Ok((path.to_string(), operator, literal));
        }
    }
    Err(ConditionError::BadExpression {
        expression: expression.to_string(),
        reason: "no comparison operator found".to_string(),
    })
}
