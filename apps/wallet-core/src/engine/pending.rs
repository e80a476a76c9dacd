//! The in-progress transaction value object.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Currency, MoneyValue};
use crate::limits::TransactionLimits;

use super::confirmation::{Confirmation, ConfirmationKind};
use super::fee::{FeeLevel, FeeSelection};
use super::validation::TransactionValidationState;

/// Key into the engine-private scratch area of a pending transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineStateKey {
    /// A memo attached by memo-capable engines.
    Memo,
    /// The gas price an on-chain engine quoted.
    GasPrice,
    /// The gas limit an on-chain engine quoted.
    GasLimit,
}

/// Value stored in the engine-private scratch area.
///
/// A tagged union per known key keeps the pipeline generic while the
/// payload stays statically typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineStateValue {
    /// Memo text.
    Memo(String),
    /// A money amount.
    Money(MoneyValue),
    /// A gas limit.
    GasLimit(u64),
}

/// The in-progress transaction.
///
/// Immutable with copy-on-write: every mutator returns a new value derived
/// from the previous one. Created by an engine's `initialize_transaction`;
/// torn down with the processor or on `reset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// The amount the user intends to send.
    pub amount: MoneyValue,
    /// The source's actionable balance minus the fee for the current level.
    pub available: MoneyValue,
    /// The network fee for the current amount and level.
    pub fee_amount: MoneyValue,
    /// The fee that would apply when sending the full available balance.
    pub fee_for_full_available: MoneyValue,
    /// The transaction's fee choice.
    pub fee_selection: FeeSelection,
    /// The fiat currency amounts are displayed in.
    pub selected_fiat_currency: Currency,
    /// The merged limits applied to this transaction, once fetched.
    pub limits: Option<TransactionLimits>,
    /// The current validation outcome.
    pub validation_state: TransactionValidationState,
    confirmations: Vec<Confirmation>,
    engine_state: BTreeMap<EngineStateKey, EngineStateValue>,
}

impl PendingTransaction {
    /// The zero-amount starting point for a source currency.
    #[must_use]
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: MoneyValue::zero(currency),
            available: MoneyValue::zero(currency),
            fee_amount: MoneyValue::zero(currency.fee_currency()),
            fee_for_full_available: MoneyValue::zero(currency.fee_currency()),
            fee_selection: FeeSelection::empty(currency),
            selected_fiat_currency: Currency::Usd,
            limits: None,
            validation_state: TransactionValidationState::Uninitialized,
            confirmations: Vec::new(),
            engine_state: BTreeMap::new(),
        }
    }

    /// The synthesized confirmation rows, in display order.
    #[must_use]
    pub fn confirmations(&self) -> &[Confirmation] {
        &self.confirmations
    }

    /// Replace the amount.
    #[must_use]
    pub fn with_amount(mut self, amount: MoneyValue) -> Self {
        self.amount = amount;
        self
    }

    /// Replace amount, available balance and both fee figures in one step.
    #[must_use]
    pub fn with_amounts(
        mut self,
        amount: MoneyValue,
        available: MoneyValue,
        fee_amount: MoneyValue,
        fee_for_full_available: MoneyValue,
    ) -> Self {
        self.amount = amount;
        self.available = available;
        self.fee_amount = fee_amount;
        self.fee_for_full_available = fee_for_full_available;
        self
    }

    /// Replace the validation state.
    #[must_use]
    pub fn with_validation_state(mut self, state: TransactionValidationState) -> Self {
        self.validation_state = state;
        self
    }

    /// Replace the limits.
    #[must_use]
    pub fn with_limits(mut self, limits: TransactionLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Switch the selected fee level, keeping any custom amount.
    ///
    /// # Panics
    ///
    /// Panics when the level is not available (see [`FeeSelection`]).
    #[must_use]
    pub fn with_selected_fee_level(
        mut self,
        level: FeeLevel,
        custom_amount: Option<MoneyValue>,
    ) -> Self {
        self.fee_selection = self.fee_selection.update_custom(level, custom_amount);
        self
    }

    /// Replace the whole fee selection.
    #[must_use]
    pub fn with_fee_selection(mut self, fee_selection: FeeSelection) -> Self {
        self.fee_selection = fee_selection;
        self
    }

    /// Insert a confirmation, replacing any existing row of the same kind
    /// in place; appends otherwise.
    #[must_use]
    pub fn insert_confirmation(mut self, confirmation: Confirmation) -> Self {
        if let Some(index) = self
            .confirmations
            .iter()
            .position(|existing| existing.kind() == confirmation.kind())
        {
            self.confirmations[index] = confirmation;
        } else {
            self.confirmations.push(confirmation);
        }
        self
    }

    /// Replace the whole confirmation list.
    #[must_use]
    pub fn with_confirmations(mut self, confirmations: Vec<Confirmation>) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// Remove every confirmation of the given kind.
    #[must_use]
    pub fn remove_confirmation(mut self, kind: ConfirmationKind) -> Self {
        self.confirmations.retain(|existing| existing.kind() != kind);
        self
    }

    /// Read a raw engine-state entry.
    #[must_use]
    pub fn engine_state(&self, key: EngineStateKey) -> Option<&EngineStateValue> {
        self.engine_state.get(&key)
    }

    /// Write a raw engine-state entry.
    #[must_use]
    pub fn with_engine_state(mut self, key: EngineStateKey, value: EngineStateValue) -> Self {
        self.engine_state.insert(key, value);
        self
    }

    /// The memo stored by a memo-capable engine.
    #[must_use]
    pub fn memo(&self) -> Option<&str> {
        match self.engine_state.get(&EngineStateKey::Memo) {
            Some(EngineStateValue::Memo(text)) => Some(text),
            _ => None,
        }
    }

    /// Store a memo.
    #[must_use]
    pub fn with_memo(self, memo: String) -> Self {
        self.with_engine_state(EngineStateKey::Memo, EngineStateValue::Memo(memo))
    }

    /// The effective minimum, zero when no limits are set.
    #[must_use]
    pub fn min_limit(&self) -> MoneyValue {
        self.limits
            .as_ref()
            .map_or_else(|| MoneyValue::zero(self.amount.currency()), |l| l.minimum)
    }

    /// The effective maximum, the available balance when no limits are set.
    #[must_use]
    pub fn max_limit(&self) -> MoneyValue {
        self.limits.as_ref().map_or(self.available, |l| l.maximum)
    }

    /// The effective daily maximum.
    #[must_use]
    pub fn max_daily_limit(&self) -> MoneyValue {
        self.limits
            .as_ref()
            .map_or_else(|| self.max_limit(), |l| l.maximum_daily)
    }

    /// The effective annual maximum.
    #[must_use]
    pub fn max_annual_limit(&self) -> MoneyValue {
        self.limits
            .as_ref()
            .map_or_else(|| self.max_daily_limit(), |l| l.maximum_annual)
    }

    /// The most the user can actually spend: the smaller of the available
    /// balance and the maximum limit net of fees, floored at zero.
    #[must_use]
    pub fn max_spendable(&self) -> MoneyValue {
        let Some(limits) = &self.limits else {
            return self.available;
        };
        let Ok(net_maximum) = limits.maximum.sub_clamped(&self.fee_amount) else {
            // Fee is charged in another currency; the cap applies as-is.
            return limits
                .maximum
                .checked_min(&self.available)
                .unwrap_or(self.available);
        };
        net_maximum
            .checked_min(&self.available)
            .unwrap_or(self.available)
    }

    /// Whether switching to this level/amount changes the fee choice.
    #[must_use]
    pub fn has_fee_level_changed(&self, new_level: FeeLevel, new_amount: Option<&MoneyValue>) -> bool {
        self.fee_selection.selected_level() != new_level
            || (new_level == FeeLevel::Custom
                && new_amount != self.fee_selection.custom_amount())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::limits::TransactionLimits;

    use super::*;

    fn btc(amount: rust_decimal::Decimal) -> MoneyValue {
        MoneyValue::new(amount, Currency::Btc)
    }

    #[test]
    fn zero_transaction_starts_uninitialized() {
        let pending = PendingTransaction::zero(Currency::Btc);
        assert!(pending.amount.is_zero());
        assert!(pending.available.is_zero());
        assert!(pending.validation_state.is_uninitialized());
        assert!(pending.confirmations().is_empty());
        assert!(pending.limits.is_none());
    }

    #[test]
    fn token_zero_transaction_fees_in_network_coin() {
        let pending = PendingTransaction::zero(Currency::Usdc);
        assert_eq!(pending.amount.currency(), Currency::Usdc);
        assert_eq!(pending.fee_amount.currency(), Currency::Eth);
    }

    #[test]
    fn mutators_return_new_values() {
        let original = PendingTransaction::zero(Currency::Btc);
        let updated = original.clone().with_amount(btc(dec!(1)));
        assert!(original.amount.is_zero());
        assert_eq!(updated.amount, btc(dec!(1)));
    }

    #[test]
    fn insert_confirmation_replaces_same_kind_in_place() {
        let pending = PendingTransaction::zero(Currency::Btc)
            .insert_confirmation(Confirmation::Source {
                label: "Trading".into(),
            })
            .insert_confirmation(Confirmation::Destination {
                label: "bc1...".into(),
            })
            .insert_confirmation(Confirmation::Source {
                label: "Private Key Wallet".into(),
            });

        assert_eq!(pending.confirmations().len(), 2);
        // Replacement preserved the original position.
        assert!(matches!(
            &pending.confirmations()[0],
            Confirmation::Source { label } if label == "Private Key Wallet"
        ));
    }

    #[test]
    fn remove_confirmation_filters_by_kind() {
        let pending = PendingTransaction::zero(Currency::Btc)
            .insert_confirmation(Confirmation::Source { label: "a".into() })
            .insert_confirmation(Confirmation::Note { text: "n".into() })
            .remove_confirmation(ConfirmationKind::Note);

        assert_eq!(pending.confirmations().len(), 1);
    }

    #[test]
    fn memo_round_trips_through_engine_state() {
        let pending = PendingTransaction::zero(Currency::Xlm).with_memo("invoice 42".into());
        assert_eq!(pending.memo(), Some("invoice 42"));
    }

    #[test]
    fn limit_accessors_fall_back_without_limits() {
        let pending = PendingTransaction::zero(Currency::Btc).with_amounts(
            btc(dec!(1)),
            btc(dec!(5)),
            btc(dec!(0.001)),
            btc(dec!(0.001)),
        );
        assert!(pending.min_limit().is_zero());
        assert_eq!(pending.max_limit(), btc(dec!(5)));
        assert_eq!(pending.max_spendable(), btc(dec!(5)));
    }

    #[test]
    fn max_spendable_respects_maximum_net_of_fee() {
        let mut limits = TransactionLimits::unbounded(Currency::Btc);
        limits.maximum = btc(dec!(2));
        let pending = PendingTransaction::zero(Currency::Btc)
            .with_amounts(btc(dec!(1)), btc(dec!(5)), btc(dec!(0.1)), btc(dec!(0.1)))
            .with_limits(limits);
        assert_eq!(pending.max_spendable(), btc(dec!(1.9)));
    }

    #[test]
    fn has_fee_level_changed_detects_custom_amount_changes() {
        let pending = PendingTransaction::zero(Currency::Btc);
        assert!(pending.has_fee_level_changed(FeeLevel::Custom, Some(&btc(dec!(0.01)))));
        assert!(!pending.has_fee_level_changed(FeeLevel::None, None));
    }
}
