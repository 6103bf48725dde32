//! Wizard definitions shipped with the engine.
//!
//! These double as reference configurations for callers writing their own.

pub mod company_setup;
pub mod finance_foundation;
pub mod order_intake;

pub use company_setup::{company_setup, CompanySetupState, Owner};
pub use finance_foundation::finance_foundation;
pub use order_intake::{order_intake, OrderIntakeState, OrderItem};

fn is_blank(value: Option<&str>) -> bool {
    value.map(str::trim).map_or(true, str::is_empty)
}
