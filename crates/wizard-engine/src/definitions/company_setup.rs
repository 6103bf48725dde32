//! Company setup: legal entity, ownership, and banking details.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::is_blank;
use crate::definition::WorkflowDefinition;
use crate::step::{field_errors, FieldErrors, StepDeclaration};
use wizard_core::WorkflowContext;

pub const ID: &str = "company-setup";
pub const VERSION: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanySetupState {
    pub company_name: Option<String>,
    /// ISO 3166-1 alpha-2
    pub registration_country: Option<String>,
    pub owners: Vec<Owner>,
    pub bank_name: Option<String>,
    pub iban: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Owner {
    pub name: String,
    /// Percentage held
    pub ownership: f64,
}

type Ctx = WorkflowContext<CompanySetupState>;

pub fn company_setup() -> WorkflowDefinition<CompanySetupState> {
    WorkflowDefinition::new(ID, VERSION)
        .with_name("Company setup")
        .step(
            StepDeclaration::new("company")
                .with_title("Company")
                .validate(validate_company),
        )
        .step(
            StepDeclaration::new("owners")
                .with_title("Owners")
                .validate(validate_owners),
        )
        .step(
            StepDeclaration::new("banking")
                .with_title("Banking")
                .guard(|ctx: &Ctx| !ctx.state.owners.is_empty())
                .validate(validate_banking),
        )
        .step(StepDeclaration::new("review").with_title("Review"))
        .migration(2, rename_legal_name)
        .on_complete(|ctx: Ctx| async move {
            info!(
                tenant_id = ?ctx.tenant_id,
                company = ?ctx.state.company_name,
                owners = ctx.state.owners.len(),
                "Company setup completed"
            );
            Ok(())
        })
}

fn validate_company(ctx: &Ctx) -> Result<(), FieldErrors> {
    let state = &ctx.state;
    let mut errors = Vec::new();

    if is_blank(state.company_name.as_deref()) {
        errors.push(("companyName", "Company name is required"));
    }
    match state.registration_country.as_deref() {
        Some(code) if code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase()) => {}
        Some(_) => errors.push(("registrationCountry", "Use a two-letter country code")),
        None => errors.push(("registrationCountry", "Registration country is required")),
    }

    field_errors(errors)
}

fn validate_owners(ctx: &Ctx) -> Result<(), FieldErrors> {
    let owners = &ctx.state.owners;
    let mut errors = Vec::new();

    if owners.is_empty() {
        errors.push(("owners", "Add at least one owner"));
    }
    if owners.iter().any(|o| o.name.trim().is_empty()) {
        errors.push(("owners.name", "Every owner needs a name"));
    }
    if owners.iter().any(|o| o.ownership <= 0.0) {
        errors.push(("owners.ownership", "Ownership must be positive"));
    }
    let total: f64 = owners.iter().map(|o| o.ownership).sum();
    if total > 100.0 {
        errors.push(("owners.total", "Ownership cannot exceed 100%"));
    }

    field_errors(errors)
}

fn validate_banking(ctx: &Ctx) -> Result<(), FieldErrors> {
    let state = &ctx.state;
    let mut errors = Vec::new();

    if is_blank(state.bank_name.as_deref()) {
        errors.push(("bankName", "Bank name is required"));
    }
    match state.iban.as_deref().map(|iban| iban.replace(' ', "")) {
        Some(iban) if (15..=34).contains(&iban.len()) && iban.chars().all(|c| c.is_ascii_alphanumeric()) => {}
        Some(_) => errors.push(("iban", "IBAN looks malformed")),
        None => errors.push(("iban", "IBAN is required")),
    }

    field_errors(errors)
}

/// v1 stored the company name as `legalName`
fn rename_legal_name(mut state: Value) -> Result<Value, String> {
    let Some(fields) = state.as_object_mut() else {
        return Ok(state);
    };
    if let Some(legal_name) = fields.remove("legalName") {
        fields.entry("companyName").or_insert(legal_name);
    }
    Ok(state)
}
