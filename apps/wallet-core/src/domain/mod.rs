//! Shared domain value objects.

pub mod money;

pub use money::{Currency, ExchangeRate, MoneyError, MoneyValue};
