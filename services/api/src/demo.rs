use crate::infra::{build_policy_service, cli_principal, load_seed};
use chrono::{Local, NaiveDate};
use clap::Args;
use hr_policy::config::DEFAULT_SETID;
use hr_policy::error::AppError;
use hr_policy::policy::seed::DEMO_TENANT;
use hr_policy::policy::{
    ApiError, EvaluateRulesRequest, ExplainRequest, InMemoryPolicyService, Principal,
};
use serde::Serialize;
use std::path::PathBuf;

const DEMO_CAPABILITY: &str = "staffing.assignment_create.field_policy";
const DEMO_BUSINESS_UNIT: &str = "10000001";
const OTHER_BUSINESS_UNIT: &str = "10000002";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Print the scenario outcomes as JSON instead of text.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ExplainArgs {
    /// Field to explain
    #[arg(long)]
    pub(crate) field: String,
    /// Capability the field belongs to
    #[arg(long, default_value = DEMO_CAPABILITY)]
    pub(crate) capability: String,
    /// Business unit (8-digit id)
    #[arg(long)]
    pub(crate) business_unit: Option<String>,
    /// Evaluation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Tenant to evaluate for
    #[arg(long, default_value = DEMO_TENANT)]
    pub(crate) tenant: String,
    /// Actor role asserted for the request
    #[arg(long, default_value = "hr_partner")]
    pub(crate) role: String,
    /// Declared actor scope (saas or tenant)
    #[arg(long)]
    pub(crate) scope: Option<String>,
    /// Explain level: brief or full
    #[arg(long, default_value = "brief")]
    pub(crate) level: String,
    /// JSON seed file. Defaults to the bundled demo tenant.
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
}

pub(crate) fn run_explain(args: ExplainArgs) -> Result<(), AppError> {
    let seed = load_seed(args.seed.as_deref(), true)?;
    let service = build_policy_service(DEFAULT_SETID, &seed)?;
    let principal = cli_principal(&args.tenant, &args.role, args.scope.as_deref());
    let as_of = args.as_of.unwrap_or_else(|| Local::now().date_naive());

    let response = service.explain(
        &principal,
        ExplainRequest {
            capability_key: Some(args.capability),
            field_key: Some(args.field),
            business_unit_id: args.business_unit,
            as_of: Some(as_of.format("%Y-%m-%d").to_string()),
            level: Some(args.level),
            ..ExplainRequest::default()
        },
    )?;

    let rendered = serde_json::to_string_pretty(&response).map_err(std::io::Error::from)?;
    println!("{rendered}");
    Ok(())
}

/// One walkthrough step: what was asked and how the service answered.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScenarioOutcome {
    pub(crate) name: &'static str,
    pub(crate) field_key: &'static str,
    pub(crate) business_unit_id: &'static str,
    pub(crate) status: u16,
    pub(crate) summary: String,
}

struct Scenario {
    name: &'static str,
    role: &'static str,
    scope: Option<&'static str>,
    field_key: &'static str,
    business_unit_id: &'static str,
}

const SCENARIOS: [Scenario; 5] = [
    Scenario {
        name: "business unit override requires the field",
        role: "hr_partner",
        scope: None,
        field_key: "employment_type",
        business_unit_id: DEMO_BUSINESS_UNIT,
    },
    Scenario {
        name: "other business unit falls back to the tenant default",
        role: "hr_partner",
        scope: None,
        field_key: "employment_type",
        business_unit_id: OTHER_BUSINESS_UNIT,
    },
    Scenario {
        name: "hidden override denies the field",
        role: "hr_partner",
        scope: None,
        field_key: "cost_center",
        business_unit_id: DEMO_BUSINESS_UNIT,
    },
    Scenario {
        name: "field without policy",
        role: "hr_partner",
        scope: None,
        field_key: "work_location",
        business_unit_id: DEMO_BUSINESS_UNIT,
    },
    Scenario {
        name: "tenant admin claiming saas scope",
        role: "tenant_admin",
        scope: Some("saas"),
        field_key: "employment_type",
        business_unit_id: DEMO_BUSINESS_UNIT,
    },
];

pub(crate) fn scenario_outcomes(
    service: &InMemoryPolicyService,
    as_of: NaiveDate,
) -> Vec<ScenarioOutcome> {
    let as_of = as_of.format("%Y-%m-%d").to_string();
    SCENARIOS
        .iter()
        .map(|scenario| {
            let principal = cli_principal(DEMO_TENANT, scenario.role, scenario.scope);
            let request = ExplainRequest {
                capability_key: Some(DEMO_CAPABILITY.to_string()),
                field_key: Some(scenario.field_key.to_string()),
                business_unit_id: Some(scenario.business_unit_id.to_string()),
                as_of: Some(as_of.clone()),
                ..ExplainRequest::default()
            };
            let (status, summary) = match service.explain(&principal, request) {
                Ok(response) => {
                    let decision = response.decision;
                    (
                        200,
                        format!(
                            "{} required={} visible={} default='{}' reason={} setid={}",
                            decision.decision,
                            decision.required,
                            decision.visible,
                            decision.resolved_default_value,
                            decision.reason_code.unwrap_or_default(),
                            response.setid
                        ),
                    )
                }
                Err(err) => {
                    let api = ApiError::from(err);
                    (api.status.as_u16(), format!("{}: {}", api.code, api.message))
                }
            };
            ScenarioOutcome {
                name: scenario.name,
                field_key: scenario.field_key,
                business_unit_id: scenario.business_unit_id,
                status,
                summary,
            }
        })
        .collect()
}

fn rule_summary(service: &InMemoryPolicyService, principal: &Principal, as_of: NaiveDate) -> String {
    let request = EvaluateRulesRequest {
        capability_key: Some(DEMO_CAPABILITY.to_string()),
        field_key: Some("employment_type".to_string()),
        business_unit_id: Some(DEMO_BUSINESS_UNIT.to_string()),
        as_of: Some(as_of.format("%Y-%m-%d").to_string()),
        ..EvaluateRulesRequest::default()
    };
    match service.evaluate_rules(principal, request) {
        Ok(evaluation) => format!(
            "{} ({}) - {}",
            evaluation.decision, evaluation.reason_code, evaluation.brief_explain.summary
        ),
        Err(err) => {
            let api = ApiError::from(err);
            format!("{}: {}", api.code, api.message)
        }
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let as_of = args.as_of.unwrap_or_else(|| Local::now().date_naive());
    let service = build_policy_service(DEFAULT_SETID, &load_seed(None, true)?)?;
    let outcomes = scenario_outcomes(&service, as_of);

    if args.json {
        let rendered = serde_json::to_string_pretty(&outcomes).map_err(std::io::Error::from)?;
        println!("{rendered}");
        return Ok(());
    }

    println!("Field policy demo for {DEMO_TENANT} as of {as_of}");
    for outcome in &outcomes {
        println!(
            "- {} [{} @ {}] -> {} {}",
            outcome.name, outcome.field_key, outcome.business_unit_id, outcome.status,
            outcome.summary
        );
    }

    let principal = cli_principal(DEMO_TENANT, "hr_partner", None);
    println!(
        "\nRule evaluation for employment_type @ {DEMO_BUSINESS_UNIT}: {}",
        rule_summary(&service, &principal, as_of)
    );
    Ok(())
}
