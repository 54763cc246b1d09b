use crate::data::FlowData;
use crate::error::NodeError;
use serde_json::Value;

/// Boolean evaluation of an edge's condition rule against the current
/// payload. Must be deterministic for identical inputs within one execution.
///
/// The production system plugs a full expression-language interpreter in
/// here; the engine only depends on this contract.
pub trait RuleEvaluator: Send + Sync {
    fn evaluate(&self, rule: &str, data: &FlowData) -> Result<bool, NodeError>;
}

/// Built-in evaluator covering the rules flow authors typically write on
/// condition edges:
///
/// - literals: `true`, `false`
/// - comparisons: `==`, `!=`, `>`, `>=`, `<`, `<=` between business-field
///   paths (dot-separated) and literals (numbers, quoted strings, booleans)
/// - conjunctions: `&&`, `||` (no grouping; `&&` binds tighter)
///
/// A missing field makes its comparison false rather than failing the
/// context; malformed rules fail with `FLOW_ENGINE_CONDITION_RULE_ERROR`.
/// Operators inside quoted literals are not supported.
pub struct SimpleRuleEvaluator;

impl SimpleRuleEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn evaluate_and(&self, clause: &str, data: &FlowData, rule: &str) -> Result<bool, NodeError> {
        for term in clause.split("&&") {
            if !self.evaluate_term(term.trim(), data, rule)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn evaluate_term(&self, term: &str, data: &FlowData, rule: &str) -> Result<bool, NodeError> {
        if term.is_empty() {
            return Err(rule_error(rule, "empty term"));
        }

        for op in ["==", "!=", ">=", "<=", ">", "<"] {
            if let Some(index) = term.find(op) {
                let lhs = resolve_operand(term[..index].trim(), data, rule)?;
                let rhs = resolve_operand(term[index + op.len()..].trim(), data, rule)?;
                return Ok(compare(op, &lhs, &rhs));
            }
        }

        // Bare term: literal or field truthiness.
        match term {
            "true" => Ok(true),
            "false" => Ok(false),
            path => Ok(truthy(data.get(path))),
        }
    }
}

impl Default for SimpleRuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEvaluator for SimpleRuleEvaluator {
    fn evaluate(&self, rule: &str, data: &FlowData) -> Result<bool, NodeError> {
        let trimmed = rule.trim();
        if trimmed.is_empty() {
            return Err(rule_error(rule, "empty rule"));
        }
        for clause in trimmed.split("||") {
            if self.evaluate_and(clause.trim(), data, rule)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn rule_error(rule: &str, cause: &str) -> NodeError {
    NodeError::ConditionRule {
        rule: rule.to_string(),
        cause: cause.to_string(),
    }
}

/// Resolve one side of a comparison to a JSON value. Unresolvable field
/// paths become `Null` so the comparison can decide falsiness.
fn resolve_operand(token: &str, data: &FlowData, rule: &str) -> Result<Value, NodeError> {
    if token.is_empty() {
        return Err(rule_error(rule, "missing operand"));
    }
    if token == "true" {
        return Ok(Value::Bool(true));
    }
    if token == "false" {
        return Ok(Value::Bool(false));
    }
    if token == "null" {
        return Ok(Value::Null);
    }
    if let Ok(number) = token.parse::<f64>() {
        return serde_json::Number::from_f64(number)
            .map(Value::Number)
            .ok_or_else(|| rule_error(rule, "non-finite number literal"));
    }
    if (token.starts_with('\'') && token.ends_with('\'') && token.len() >= 2)
        || (token.starts_with('"') && token.ends_with('"') && token.len() >= 2)
    {
        return Ok(Value::String(token[1..token.len() - 1].to_string()));
    }
    if token.starts_with('\'') || token.starts_with('"') {
        return Err(rule_error(rule, "unterminated string literal"));
    }
    Ok(data.get(token).cloned().unwrap_or(Value::Null))
}

fn compare(op: &str, lhs: &Value, rhs: &Value) -> bool {
    match op {
        "==" => equals(lhs, rhs),
        "!=" => !equals(lhs, rhs),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(left), Some(right)) => match op {
                ">" => left > right,
                ">=" => left >= right,
                "<" => left < right,
                "<=" => left <= right,
                _ => false,
            },
            // Ordering over non-numeric operands (including missing fields)
            // is false, not an error.
            _ => false,
        },
    }
}

fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(left), Some(right)) => left == right,
        _ => lhs == rhs,
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None => false,
        Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
    }
}
