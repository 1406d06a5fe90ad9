use std::sync::Arc;

use super::common::*;
use crate::policy::domain::{
    Decision, FIELD_HIDDEN_IN_CONTEXT, FIELD_POLICY_MISSING, FIELD_REQUIRED_IN_CONTEXT,
    FIELD_VISIBLE_IN_CONTEXT,
};
use crate::policy::expression::{ExpressionError, ExpressionEvaluator, Value};
use crate::policy::rules::{
    build_rule_candidates, evaluate_rule_candidates, RuleCandidate, RuleEvaluationError,
};

fn candidate(rule_id: &str, priority: i32, effective: &str, decision_expr: &str) -> RuleCandidate {
    RuleCandidate {
        rule_id: rule_id.to_string(),
        priority,
        effective_date: effective.parse().expect("valid date"),
        end_date: None,
        eligibility_expr: "true".to_string(),
        decision_expr: decision_expr.to_string(),
        reason_code: FIELD_VISIBLE_IN_CONTEXT.to_string(),
    }
}

#[test]
fn builder_derives_expressions_and_reasons() {
    let mut required = business_unit_draft(FIELD, BU_PRIMARY);
    required.required = true;
    let mut hidden = tenant_draft("cost_center");
    hidden.visible = false;
    let items = vec![item(required), item(hidden), item(tenant_draft("work_location"))];

    let candidates = build_rule_candidates(&items);
    assert_eq!(
        candidates[0].eligibility_expr,
        r#"ctx["business_unit_id"] == "10000001""#
    );
    assert_eq!(candidates[0].decision_expr, r#""allow""#);
    assert_eq!(candidates[0].reason_code, FIELD_REQUIRED_IN_CONTEXT);
    assert_eq!(candidates[0].rule_id, items[0].natural_key());

    assert_eq!(candidates[1].eligibility_expr, "true");
    assert_eq!(candidates[1].decision_expr, r#""deny""#);
    assert_eq!(candidates[1].reason_code, FIELD_HIDDEN_IN_CONTEXT);

    assert_eq!(candidates[2].reason_code, FIELD_VISIBLE_IN_CONTEXT);
}

#[test]
fn built_candidates_run_on_the_default_engine() {
    let mut override_draft = business_unit_draft(FIELD, BU_PRIMARY);
    override_draft.priority = 200;
    override_draft.required = true;
    let items = vec![item(override_draft), item(tenant_draft(FIELD))];
    let candidates = build_rule_candidates(&items);
    let evaluator = ExpressionEvaluator::default();

    let matched = evaluate_rule_candidates(&evaluator, &candidates, &eval_context(BU_PRIMARY))
        .expect("evaluation");
    assert_eq!(matched.decision, Decision::Allow);
    assert_eq!(matched.reason_code, FIELD_REQUIRED_IN_CONTEXT);
    assert_eq!(matched.eligibility_matched, 2);

    let fallback = evaluate_rule_candidates(&evaluator, &candidates, &eval_context(BU_OTHER))
        .expect("evaluation");
    assert_eq!(fallback.reason_code, FIELD_VISIBLE_IN_CONTEXT);
    assert_eq!(fallback.eligibility_matched, 1);
    assert_eq!(fallback.candidates_evaluated, 2);
}

#[test]
fn no_eligible_candidate_denies_as_missing() {
    let engine = Arc::new(FakeEngine::default().with("false", Ok(Value::Bool(false))));
    let mut only = candidate("r1", 100, "2026-01-01", "'allow'");
    only.eligibility_expr = "false".to_string();

    let result = evaluate_rule_candidates(&fake_evaluator(engine), &[only], &eval_context(""))
        .expect("evaluation");
    assert_eq!(result.decision, Decision::Deny);
    assert_eq!(result.reason_code, FIELD_POLICY_MISSING);
    assert!(result.selected.is_none());
    assert_eq!(result.eligibility_matched, 0);
    assert_eq!(result.candidates_evaluated, 1);
}

#[test]
fn no_candidates_at_all_denies_as_missing() {
    let evaluator = ExpressionEvaluator::default();
    let result =
        evaluate_rule_candidates(&evaluator, &[], &eval_context(BU_PRIMARY)).expect("evaluation");
    assert_eq!(result.decision, Decision::Deny);
    assert_eq!(result.reason_code, FIELD_POLICY_MISSING);
    assert_eq!(result.brief_explain().summary, "none of 0 candidates eligible");
}

#[test]
fn equal_priority_needs_strictly_later_date_to_win() {
    let engine = Arc::new(
        FakeEngine::default()
            .with("true", Ok(Value::Bool(true)))
            .with("'allow'", Ok(Value::String("allow".to_string()))),
    );
    let evaluator = fake_evaluator(engine);

    let tie = [
        candidate("first", 100, "2026-01-01", "'allow'"),
        candidate("second", 100, "2026-01-01", "'allow'"),
    ];
    let result = evaluate_rule_candidates(&evaluator, &tie, &eval_context("")).expect("ok");
    assert_eq!(result.selected.expect("winner").rule_id, "first");

    let later = [
        candidate("first", 100, "2026-01-01", "'allow'"),
        candidate("later", 100, "2026-02-01", "'allow'"),
        candidate("lower", 50, "2026-03-01", "'allow'"),
    ];
    let result = evaluate_rule_candidates(&evaluator, &later, &eval_context("")).expect("ok");
    assert_eq!(result.selected.expect("winner").rule_id, "later");
    assert_eq!(result.eligibility_matched, 3);
}

#[test]
fn unknown_decision_text_is_forced_to_deny() {
    let engine = Arc::new(
        FakeEngine::default()
            .with("true", Ok(Value::Bool(true)))
            .with("'maybe'", Ok(Value::String("Maybe".to_string())))
            .with("'ALLOW'", Ok(Value::String("ALLOW".to_string()))),
    );
    let evaluator = fake_evaluator(engine);

    let result = evaluate_rule_candidates(
        &evaluator,
        &[candidate("r1", 100, "2026-01-01", "'maybe'")],
        &eval_context(""),
    )
    .expect("ok");
    assert_eq!(result.decision, Decision::Deny);

    let result = evaluate_rule_candidates(
        &evaluator,
        &[candidate("r1", 100, "2026-01-01", "'ALLOW'")],
        &eval_context(""),
    )
    .expect("ok");
    assert_eq!(result.decision, Decision::Allow);
}

#[test]
fn blank_reason_is_backfilled_by_decision() {
    let engine = Arc::new(
        FakeEngine::default()
            .with("true", Ok(Value::Bool(true)))
            .with("'deny'", Ok(Value::String("deny".to_string())))
            .with("'allow'", Ok(Value::String("allow".to_string()))),
    );
    let evaluator = fake_evaluator(engine);

    let mut deny = candidate("r1", 100, "2026-01-01", "'deny'");
    deny.reason_code = " ".to_string();
    let result = evaluate_rule_candidates(&evaluator, &[deny], &eval_context("")).expect("ok");
    assert_eq!(result.reason_code, FIELD_POLICY_MISSING);

    let mut allow = candidate("r1", 100, "2026-01-01", "'allow'");
    allow.reason_code = String::new();
    let result = evaluate_rule_candidates(&evaluator, &[allow], &eval_context("")).expect("ok");
    assert_eq!(result.reason_code, FIELD_VISIBLE_IN_CONTEXT);
}

#[test]
fn expression_failures_abort_the_evaluation() {
    let engine = Arc::new(
        FakeEngine::default()
            .with("true", Ok(Value::Bool(true)))
            .with(
                "'boom'",
                Err(ExpressionError::Evaluation("coercion failed".to_string())),
            ),
    );
    let evaluator = fake_evaluator(engine);

    let err = evaluate_rule_candidates(
        &evaluator,
        &[candidate("r1", 100, "2026-01-01", "'boom'")],
        &eval_context(""),
    )
    .expect_err("decision failure");
    assert!(matches!(err, RuleEvaluationError::Decision { ref rule_id, .. } if rule_id == "r1"));

    let mut broken = candidate("r2", 100, "2026-01-01", "'allow'");
    broken.eligibility_expr = "not compiled".to_string();
    let err = evaluate_rule_candidates(&evaluator, &[broken], &eval_context(""))
        .expect_err("eligibility failure");
    assert!(matches!(
        err,
        RuleEvaluationError::Eligibility {
            source: ExpressionError::Compile(_),
            ..
        }
    ));
}

#[test]
fn brief_explain_names_the_selected_rule() {
    let evaluator = ExpressionEvaluator::default();
    let candidates = build_rule_candidates(&[item(tenant_draft(FIELD))]);
    let result = evaluate_rule_candidates(&evaluator, &candidates, &eval_context(BU_OTHER))
        .expect("evaluation");

    let brief = result.brief_explain();
    assert_eq!(brief.selected_rule_id.as_deref(), Some(candidates[0].rule_id.as_str()));
    assert!(brief.summary.starts_with("1 of 1 candidates eligible"));
}
