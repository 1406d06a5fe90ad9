use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{
    Decision, OrgLevel, PolicyItem, FIELD_HIDDEN_IN_CONTEXT, FIELD_POLICY_MISSING,
    FIELD_REQUIRED_IN_CONTEXT, FIELD_VISIBLE_IN_CONTEXT,
};
use super::expression::{EvalContext, ExpressionError, ExpressionEvaluator};

/// Expression-driven rule derived from one registry item. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleCandidate {
    pub rule_id: String,
    pub priority: i32,
    pub effective_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub eligibility_expr: String,
    pub decision_expr: String,
    pub reason_code: String,
}

impl RuleCandidate {
    pub fn from_item(item: &PolicyItem) -> Self {
        let eligibility_expr = match item.org_level {
            OrgLevel::BusinessUnit => format!(
                "ctx[\"business_unit_id\"] == {}",
                quote(&item.business_unit_id)
            ),
            OrgLevel::Tenant => "true".to_string(),
        };
        let (decision, reason_code) = if !item.visible {
            (Decision::Deny, FIELD_HIDDEN_IN_CONTEXT)
        } else if item.required {
            (Decision::Allow, FIELD_REQUIRED_IN_CONTEXT)
        } else {
            (Decision::Allow, FIELD_VISIBLE_IN_CONTEXT)
        };

        Self {
            rule_id: item.natural_key(),
            priority: item.priority,
            effective_date: item.effective_date,
            end_date: item.end_date,
            eligibility_expr,
            decision_expr: quote(decision.as_str()),
            reason_code: reason_code.to_string(),
        }
    }
}

pub fn build_rule_candidates(items: &[PolicyItem]) -> Vec<RuleCandidate> {
    items.iter().map(RuleCandidate::from_item).collect()
}

/// Short human-facing summary of a rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BriefExplain {
    pub decision: Decision,
    pub reason_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_rule_id: Option<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleEvaluation {
    pub decision: Decision,
    pub reason_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<RuleCandidate>,
    pub candidates_evaluated: usize,
    pub eligibility_matched: usize,
}

impl RuleEvaluation {
    pub fn brief_explain(&self) -> BriefExplain {
        let summary = match &self.selected {
            Some(rule) => format!(
                "{} of {} candidates eligible; {} selected at priority {}",
                self.eligibility_matched,
                self.candidates_evaluated,
                rule.rule_id,
                rule.priority
            ),
            None => format!(
                "none of {} candidates eligible",
                self.candidates_evaluated
            ),
        };
        BriefExplain {
            decision: self.decision,
            reason_code: self.reason_code.clone(),
            selected_rule_id: self.selected.as_ref().map(|rule| rule.rule_id.clone()),
            summary,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuleEvaluationError {
    #[error("eligibility expression of rule {rule_id} failed")]
    Eligibility {
        rule_id: String,
        #[source]
        source: ExpressionError,
    },
    #[error("decision expression of rule {rule_id} failed")]
    Decision {
        rule_id: String,
        #[source]
        source: ExpressionError,
    },
}

/// Picks the winning eligible candidate and runs its decision expression.
///
/// Candidates are walked in order. A later candidate displaces the current winner only
/// with strictly higher priority, or equal priority and a strictly later effective date.
pub fn evaluate_rule_candidates(
    evaluator: &ExpressionEvaluator,
    candidates: &[RuleCandidate],
    ctx: &EvalContext,
) -> Result<RuleEvaluation, RuleEvaluationError> {
    let mut matched = 0;
    let mut winner: Option<&RuleCandidate> = None;

    for candidate in candidates {
        let eligible = evaluator
            .eligible(&candidate.eligibility_expr, ctx)
            .map_err(|source| RuleEvaluationError::Eligibility {
                rule_id: candidate.rule_id.clone(),
                source,
            })?;
        if !eligible {
            continue;
        }
        matched += 1;

        let replace = match winner {
            None => true,
            Some(best) => {
                candidate.priority > best.priority
                    || (candidate.priority == best.priority
                        && candidate.effective_date > best.effective_date)
            }
        };
        if replace {
            winner = Some(candidate);
        }
    }

    let Some(selected) = winner else {
        return Ok(RuleEvaluation {
            decision: Decision::Deny,
            reason_code: FIELD_POLICY_MISSING.to_string(),
            selected: None,
            candidates_evaluated: candidates.len(),
            eligibility_matched: 0,
        });
    };

    let raw = evaluator
        .decide(&selected.decision_expr, ctx)
        .map_err(|source| RuleEvaluationError::Decision {
            rule_id: selected.rule_id.clone(),
            source,
        })?;
    let decision = Decision::parse(&raw).unwrap_or(Decision::Deny);

    let reason_code = if selected.reason_code.trim().is_empty() {
        match decision {
            Decision::Deny => FIELD_POLICY_MISSING.to_string(),
            Decision::Allow => FIELD_VISIBLE_IN_CONTEXT.to_string(),
        }
    } else {
        selected.reason_code.clone()
    };

    Ok(RuleEvaluation {
        decision,
        reason_code,
        selected: Some(selected.clone()),
        candidates_evaluated: candidates.len(),
        eligibility_matched: matched,
    })
}

fn quote(raw: &str) -> String {
    let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
