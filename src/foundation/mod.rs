//! Shared error taxonomy and small value types.

/// Anchor points, canvas sizes and number formatting for filter arguments.
pub mod core;
/// Crate-wide error type.
pub mod error;
