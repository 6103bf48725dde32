//! Order intake: customer, line items, delivery, confirmation.
//!
//! Orders made up only of digital items have nothing to ship, so the
//! delivery step is skipped in both directions.

use serde::{Deserialize, Serialize};

use super::is_blank;
use crate::definition::WorkflowDefinition;
use crate::step::{field_errors, FieldErrors, StepDeclaration};
use wizard_core::WorkflowContext;

pub const ID: &str = "order-intake";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderIntakeState {
    pub customer_name: Option<String>,
    pub email: Option<String>,
    pub items: Vec<OrderItem>,
    pub delivery_address: Option<String>,
    /// Staged when leaving the items step
    pub total: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderItem {
    pub sku: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub digital: bool,
}

impl OrderIntakeState {
    pub fn is_digital_only(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.digital)
    }

    pub fn item_total(&self) -> f64 {
        self.items
            .iter()
            .map(|i| f64::from(i.quantity) * i.unit_price)
            .sum()
    }
}

type Ctx = WorkflowContext<OrderIntakeState>;

pub fn order_intake() -> WorkflowDefinition<OrderIntakeState> {
    WorkflowDefinition::new(ID, 1)
        .with_name("Order intake")
        .step(
            StepDeclaration::new("customer")
                .with_title("Customer")
                .validate(validate_customer),
        )
        .step(
            StepDeclaration::new("items")
                .with_title("Items")
                .validate(validate_items)
                .on_exit(|mut ctx: Ctx| {
                    ctx.state.total = Some(ctx.state.item_total());
                    ctx
                })
                .next_with(|ctx: &Ctx| {
                    if ctx.state.is_digital_only() {
                        "confirm".to_string()
                    } else {
                        "delivery".to_string()
                    }
                }),
        )
        .step(
            StepDeclaration::new("delivery")
                .with_title("Delivery")
                .validate(|ctx: &Ctx| {
                    field_errors(
                        is_blank(ctx.state.delivery_address.as_deref())
                            .then_some(("deliveryAddress", "Delivery address is required")),
                    )
                }),
        )
        .step(
            StepDeclaration::new("confirm")
                .with_title("Confirm")
                .prev_with(|ctx: &Ctx| {
                    if ctx.state.is_digital_only() {
                        "items".to_string()
                    } else {
                        "delivery".to_string()
                    }
                }),
        )
}

fn validate_customer(ctx: &Ctx) -> Result<(), FieldErrors> {
    let state = &ctx.state;
    let mut errors = Vec::new();

    if is_blank(state.customer_name.as_deref()) {
        errors.push(("customerName", "Customer name is required"));
    }
    match state.email.as_deref() {
        Some(email) if email.contains('@') => {}
        Some(_) => errors.push(("email", "Email address is invalid")),
        None => errors.push(("email", "Email is required")),
    }

    field_errors(errors)
}

fn validate_items(ctx: &Ctx) -> Result<(), FieldErrors> {
    let items = &ctx.state.items;
    let mut errors = Vec::new();

    if items.is_empty() {
        errors.push(("items", "Add at least one item"));
    }
    if items.iter().any(|i| i.sku.trim().is_empty()) {
        errors.push(("items.sku", "Every item needs a SKU"));
    }
    if items.iter().any(|i| i.quantity == 0) {
        errors.push(("items.quantity", "Quantity must be at least 1"));
    }
    if items.iter().any(|i| i.unit_price < 0.0) {
        errors.push(("items.unitPrice", "Price cannot be negative"));
    }

    field_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WizardEngine;

    fn customer() -> OrderIntakeState {
        OrderIntakeState {
            customer_name: Some("Ada".into()),
            email: Some("ada@example.com".into()),
            ..Default::default()
        }
    }

    fn item(sku: &str, quantity: u32, unit_price: f64, digital: bool) -> OrderItem {
        OrderItem {
            sku: sku.into(),
            quantity,
            unit_price,
            digital,
        }
    }

    async fn at_items(engine: &WizardEngine<OrderIntakeState>, items: Vec<OrderItem>) -> Ctx {
        let ctx = engine.init(None, None, Some(customer())).await.unwrap();
        let ctx = engine.next(&ctx).await.unwrap();
        assert_eq!(ctx.current_step, "items");

        let mut state = ctx.state.clone();
        state.items = items;
        engine.save_state(&ctx, state).await.unwrap().context
    }

    #[tokio::test]
    async fn test_digital_order_skips_delivery() {
        let engine = WizardEngine::new(order_intake()).unwrap();
        let ctx = at_items(&engine, vec![item("ebook", 2, 9.5, true)]).await;

        let confirm = engine.next(&ctx).await.unwrap();
        assert_eq!(confirm.current_step, "confirm");
        assert_eq!(confirm.state.total, Some(19.0));

        let back = engine.prev(&confirm).await.unwrap();
        assert_eq!(back.current_step, "items");
    }

    #[tokio::test]
    async fn test_physical_order_visits_delivery() {
        let engine = WizardEngine::new(order_intake()).unwrap();
        let ctx = at_items(
            &engine,
            vec![item("ebook", 1, 5.0, true), item("mug", 3, 12.0, false)],
        )
        .await;

        let delivery = engine.next(&ctx).await.unwrap();
        assert_eq!(delivery.current_step, "delivery");
        assert_eq!(delivery.state.total, Some(41.0));

        assert!(engine.next(&delivery).await.is_err());

        let mut state = delivery.state.clone();
        state.delivery_address = Some("1 Harbour St".into());
        let delivery = engine.save_state(&delivery, state).await.unwrap().context;
        let confirm = engine.next(&delivery).await.unwrap();
        assert_eq!(engine.prev(&confirm).await.unwrap().current_step, "delivery");
    }

    #[tokio::test]
    async fn test_items_rejected_when_empty() {
        let engine = WizardEngine::new(order_intake()).unwrap();
        let ctx = at_items(&engine, Vec::new()).await;

        let err = engine.next(&ctx).await.unwrap_err();
        assert_eq!(err.code(), "validation_rejected");
    }
}
