use watercore::{FlowData, NodeError, RuleEvaluator, SimpleRuleEvaluator};

fn data(business: serde_json::Value) -> FlowData {
    FlowData::new(business)
}

fn eval(rule: &str, business: serde_json::Value) -> bool {
    SimpleRuleEvaluator::new()
        .evaluate(rule, &data(business))
        .expect("rule should evaluate")
}

#[test]
fn boolean_literals() {
    assert!(eval("true", serde_json::json!({})));
    assert!(!eval("false", serde_json::json!({})));
}

#[test]
fn numeric_comparisons() {
    let payload = serde_json::json!({ "x": 5 });
    assert!(eval("x > 0", payload.clone()));
    assert!(eval("x >= 5", payload.clone()));
    assert!(!eval("x < 5", payload.clone()));
    assert!(eval("x <= 5", payload.clone()));
    assert!(eval("x == 5", payload.clone()));
    assert!(eval("x != 4", payload));
}

#[test]
fn negative_numbers_compare() {
    let payload = serde_json::json!({ "x": -1 });
    assert!(!eval("x > 0", payload.clone()));
    assert!(eval("x < 0", payload));
}

#[test]
fn string_equality_with_quotes() {
    let payload = serde_json::json!({ "status": "approved" });
    assert!(eval("status == 'approved'", payload.clone()));
    assert!(eval("status != 'rejected'", payload.clone()));
    assert!(eval(r#"status == "approved""#, payload));
}

#[test]
fn boolean_field_equality() {
    let payload = serde_json::json!({ "flag": true });
    assert!(eval("flag == true", payload.clone()));
    assert!(!eval("flag == false", payload));
}

#[test]
fn conjunctions_and_disjunctions() {
    let payload = serde_json::json!({ "x": 5, "y": 2 });
    assert!(eval("x > 0 && y < 10", payload.clone()));
    assert!(!eval("x > 0 && y > 10", payload.clone()));
    assert!(eval("x > 100 || y < 10", payload.clone()));
    assert!(!eval("x > 100 || y > 10", payload.clone()));
    // && binds tighter than ||
    assert!(eval("x > 100 && y > 10 || y == 2", payload));
}

#[test]
fn dot_paths_reach_nested_fields() {
    let payload = serde_json::json!({ "order": { "total": 42 } });
    assert!(eval("order.total > 40", payload.clone()));
    assert!(!eval("order.total > 50", payload));
}

#[test]
fn missing_field_comparisons_are_false() {
    let payload = serde_json::json!({ "x": 5 });
    assert!(!eval("y > 0", payload.clone()));
    assert!(!eval("y == 1", payload.clone()));
    // ... but a missing field still differs from a present one
    assert!(eval("y != 1", payload));
}

#[test]
fn bare_field_uses_truthiness() {
    assert!(eval("flag", serde_json::json!({ "flag": true })));
    assert!(!eval("flag", serde_json::json!({ "flag": false })));
    assert!(eval("name", serde_json::json!({ "name": "bob" })));
    assert!(!eval("name", serde_json::json!({ "name": "" })));
    assert!(!eval("missing", serde_json::json!({})));
}

#[test]
fn ordering_over_non_numbers_is_false() {
    let payload = serde_json::json!({ "name": "bob" });
    assert!(!eval("name > 0", payload.clone()));
    assert!(!eval("name < 0", payload));
}

#[test]
fn empty_rule_is_an_error() {
    let error = SimpleRuleEvaluator::new()
        .evaluate("   ", &data(serde_json::json!({})))
        .expect_err("empty rule should fail");
    assert_eq!(error.code(), "FLOW_ENGINE_CONDITION_RULE_ERROR");
    assert!(matches!(error, NodeError::ConditionRule { .. }));
}

#[test]
fn unterminated_string_is_an_error() {
    let error = SimpleRuleEvaluator::new()
        .evaluate("status == 'approved", &data(serde_json::json!({})))
        .expect_err("unterminated literal should fail");
    assert_eq!(error.code(), "FLOW_ENGINE_CONDITION_RULE_ERROR");
}

#[test]
fn evaluation_is_deterministic() {
    let evaluator = SimpleRuleEvaluator::new();
    let payload = data(serde_json::json!({ "x": 3 }));
    let first = evaluator.evaluate("x > 1 && x < 5", &payload).expect("evaluates");
    for _ in 0..10 {
        let again = evaluator.evaluate("x > 1 && x < 5", &payload).expect("evaluates");
        assert_eq!(first, again, "same rule and payload must agree");
    }
}
