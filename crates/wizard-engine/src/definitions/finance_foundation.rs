//! Finance foundation: legal entity, chart of accounts, tax settings.
//!
//! State stays an untyped bag; the ledger UI owns its shape.

use serde_json::Value;

use crate::definition::WorkflowDefinition;
use crate::step::{field_errors, FieldErrors, StepDeclaration};
use wizard_core::{StateBag, WorkflowContext};

pub const ID: &str = "finance-foundation";

type Ctx = WorkflowContext<StateBag>;

pub fn finance_foundation() -> WorkflowDefinition<StateBag> {
    WorkflowDefinition::new(ID, 1)
        .with_name("Finance foundation")
        .step(
            StepDeclaration::new("entity")
                .with_title("Legal entity")
                .validate(validate_entity),
        )
        .step(
            StepDeclaration::new("accounts")
                .with_title("Chart of accounts")
                .validate(validate_accounts),
        )
        .step(
            StepDeclaration::new("tax")
                .with_title("Tax")
                .validate(validate_tax),
        )
        .step(StepDeclaration::new("summary").with_title("Summary"))
}

fn text<'a>(state: &'a StateBag, field: &str) -> Option<&'a str> {
    state
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn validate_entity(ctx: &Ctx) -> Result<(), FieldErrors> {
    let mut errors = Vec::new();

    if text(&ctx.state, "legalName").is_none() {
        errors.push(("legalName", "Legal name is required"));
    }
    match text(&ctx.state, "baseCurrency") {
        Some(code) if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) => {}
        Some(_) => errors.push(("baseCurrency", "Use an ISO 4217 currency code")),
        None => errors.push(("baseCurrency", "Base currency is required")),
    }

    field_errors(errors)
}

fn validate_accounts(ctx: &Ctx) -> Result<(), FieldErrors> {
    let accounts = ctx.state.get("chartOfAccounts").and_then(Value::as_array);
    field_errors(
        accounts
            .map_or(true, Vec::is_empty)
            .then_some(("chartOfAccounts", "Choose or import a chart of accounts")),
    )
}

fn validate_tax(ctx: &Ctx) -> Result<(), FieldErrors> {
    let registered = ctx
        .state
        .get("vatRegistered")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    field_errors(
        (registered && text(&ctx.state, "vatNumber").is_none())
            .then_some(("vatNumber", "VAT number is required when registered")),
    )
}
