//! Resilience patterns for wizard operations
//!
//! Hooks and storage calls may hang on external I/O; every call made by the
//! engine runs under a deadline from [`TimeoutPolicy`].

pub mod timeout;

pub use timeout::{TimeoutError, TimeoutPolicy};
