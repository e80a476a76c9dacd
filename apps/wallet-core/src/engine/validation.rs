//! The closed set of validation outcomes for a pending transaction.

use serde::{Deserialize, Serialize};

use crate::domain::MoneyValue;

/// The validation outcome of a pending transaction.
///
/// Exactly one variant holds at any time and all of them travel on the
/// success channel: they are expected outcomes rendered as user guidance,
/// not errors. [`TransactionValidationState::CanExecute`] is the only
/// state execution may proceed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionValidationState {
    /// No amount has been entered yet.
    Uninitialized,
    /// The transaction is complete, well formed and possible.
    CanExecute,
    /// The amount is malformed (negative, or zero where zero is invalid).
    InvalidAmount,
    /// The amount is under the minimum limit.
    BelowMinimumLimit(MoneyValue),
    /// The amount is over the single-transaction maximum.
    OverMaximumLimit(MoneyValue),
    /// The amount is over a personal (tiered) periodic maximum.
    OverMaximumPersonalLimit,
    /// The source balance cannot cover the amount.
    InsufficientFunds,
    /// The source balance cannot cover the fee itself.
    BelowFees {
        /// The fee that could not be covered.
        fee: MoneyValue,
        /// The balance that failed to cover it.
        balance: MoneyValue,
    },
    /// The fee-currency balance cannot cover the network fee.
    InsufficientGas,
    /// The destination address does not parse for the target network.
    InvalidAddress,
    /// The destination address is a contract and the target forbids that.
    AddressIsContract,
    /// A confirmation option holds an invalid value.
    OptionInvalid,
    /// The attached memo is malformed for the target network.
    MemoInvalid,
    /// The payment invoice being settled has expired.
    InvoiceExpired,
    /// The source account already has a transaction settling.
    TransactionInFlight,
    /// The user has hit the cap on concurrent pending orders.
    PendingOrdersLimitReached,
    /// No source account is able to fund the transaction.
    NoSourcesAvailable,
    /// An unclassified failure.
    UnknownError,
}

impl TransactionValidationState {
    /// True for [`TransactionValidationState::Uninitialized`].
    #[must_use]
    pub const fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized)
    }

    /// True for [`TransactionValidationState::CanExecute`].
    #[must_use]
    pub const fn is_can_execute(&self) -> bool {
        matches!(self, Self::CanExecute)
    }
}
