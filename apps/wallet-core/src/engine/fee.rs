//! Fee levels and the per-transaction fee selection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{Currency, MoneyValue};
use crate::ports::GasQuotes;

/// Priority tier for a transaction's network fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeLevel {
    /// No network fee applies (custodial rails).
    None,
    /// Standard inclusion.
    Regular,
    /// Expedited inclusion.
    Priority,
    /// A user-entered fee amount.
    Custom,
}

/// Advisory classification of a custom fee against current quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeState {
    /// The custom fee is acceptable.
    ValidCustomFee,
    /// The custom fee is below the network's minimum.
    FeeUnderMinLimit,
    /// The custom fee is below the regular quote; likely slow.
    FeeUnderRecommended,
    /// The custom fee is above the priority quote; likely wasteful.
    FeeOverRecommended,
    /// A non-custom level is selected and valid.
    ValidFee,
}

/// Classify a custom fee amount against the current quotes.
#[must_use]
pub fn custom_fee_state(custom: &MoneyValue, quotes: &GasQuotes) -> FeeState {
    if custom.is_zero() || custom.is_negative() {
        FeeState::FeeUnderMinLimit
    } else if custom.amount() < quotes.regular.amount() {
        FeeState::FeeUnderRecommended
    } else if custom.amount() > quotes.priority.amount() {
        FeeState::FeeOverRecommended
    } else {
        FeeState::ValidCustomFee
    }
}

/// The fee choice carried by a pending transaction.
///
/// Invariant: the selected level is always a member of the available
/// levels. Mutators enforce this with a panic because a violation is a
/// wiring bug between the UI and the engine selection, not a recoverable
/// user condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSelection {
    selected_level: FeeLevel,
    available_levels: BTreeSet<FeeLevel>,
    custom_amount: Option<MoneyValue>,
    custom_level_rates: Option<GasQuotes>,
    asset: Currency,
}

impl FeeSelection {
    /// A selection for rails with no fee choice at all.
    #[must_use]
    pub fn empty(asset: Currency) -> Self {
        Self {
            selected_level: FeeLevel::None,
            available_levels: BTreeSet::from([FeeLevel::None]),
            custom_amount: None,
            custom_level_rates: None,
            asset,
        }
    }

    /// A selection with an explicit starting level and available set.
    ///
    /// # Panics
    ///
    /// Panics when `selected_level` is not in `available_levels`.
    #[must_use]
    pub fn new(
        selected_level: FeeLevel,
        available_levels: BTreeSet<FeeLevel>,
        asset: Currency,
    ) -> Self {
        assert!(
            available_levels.contains(&selected_level),
            "selected fee level {selected_level:?} is not available"
        );
        Self {
            selected_level,
            available_levels,
            custom_amount: None,
            custom_level_rates: None,
            asset,
        }
    }

    /// The currently selected level.
    #[must_use]
    pub const fn selected_level(&self) -> FeeLevel {
        self.selected_level
    }

    /// The levels this transaction supports.
    #[must_use]
    pub const fn available_levels(&self) -> &BTreeSet<FeeLevel> {
        &self.available_levels
    }

    /// The user-entered custom fee, when the custom level is in play.
    #[must_use]
    pub const fn custom_amount(&self) -> Option<&MoneyValue> {
        self.custom_amount.as_ref()
    }

    /// Quotes backing the custom-fee UI, when published.
    #[must_use]
    pub const fn custom_level_rates(&self) -> Option<&GasQuotes> {
        self.custom_level_rates.as_ref()
    }

    /// The asset fees are charged against.
    #[must_use]
    pub const fn asset(&self) -> Currency {
        self.asset
    }

    /// Switch the selected level.
    ///
    /// # Panics
    ///
    /// Panics when `level` is not available.
    #[must_use]
    pub fn update_selected_level(mut self, level: FeeLevel) -> Self {
        assert!(
            self.available_levels.contains(&level),
            "selected fee level {level:?} is not available"
        );
        self.selected_level = level;
        self
    }

    /// Switch the selected level together with a custom amount.
    ///
    /// # Panics
    ///
    /// Panics when `level` is not available.
    #[must_use]
    pub fn update_custom(mut self, level: FeeLevel, custom_amount: Option<MoneyValue>) -> Self {
        assert!(
            self.available_levels.contains(&level),
            "selected fee level {level:?} is not available"
        );
        self.selected_level = level;
        self.custom_amount = custom_amount;
        self
    }

    /// Replace the available set.
    ///
    /// # Panics
    ///
    /// Panics when the currently selected level would fall outside the new
    /// set.
    #[must_use]
    pub fn update_available_levels(mut self, available_levels: BTreeSet<FeeLevel>) -> Self {
        assert!(
            available_levels.contains(&self.selected_level),
            "new available set drops the selected level {:?}",
            self.selected_level
        );
        self.available_levels = available_levels;
        self
    }

    /// Publish the quotes backing the custom-fee UI.
    #[must_use]
    pub fn update_custom_level_rates(mut self, rates: GasQuotes) -> Self {
        self.custom_level_rates = Some(rates);
        self
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn eth(amount: rust_decimal::Decimal) -> MoneyValue {
        MoneyValue::new(amount, Currency::Eth)
    }

    fn quotes() -> GasQuotes {
        GasQuotes {
            regular: eth(dec!(0.002)),
            priority: eth(dec!(0.005)),
        }
    }

    #[test]
    fn empty_selection_supports_only_none() {
        let selection = FeeSelection::empty(Currency::Btc);
        assert_eq!(selection.selected_level(), FeeLevel::None);
        assert_eq!(selection.available_levels().len(), 1);
    }

    #[test]
    fn update_selected_level_within_available_set() {
        let selection = FeeSelection::new(
            FeeLevel::Regular,
            BTreeSet::from([FeeLevel::Regular, FeeLevel::Priority]),
            Currency::Eth,
        );
        let updated = selection.update_selected_level(FeeLevel::Priority);
        assert_eq!(updated.selected_level(), FeeLevel::Priority);
    }

    #[test]
    #[should_panic(expected = "is not available")]
    fn update_selected_level_outside_available_set_panics() {
        let selection = FeeSelection::empty(Currency::Btc);
        let _ = selection.update_selected_level(FeeLevel::Priority);
    }

    #[test]
    #[should_panic(expected = "is not available")]
    fn new_with_unavailable_selected_level_panics() {
        let _ = FeeSelection::new(
            FeeLevel::Custom,
            BTreeSet::from([FeeLevel::Regular]),
            Currency::Eth,
        );
    }

    #[test]
    #[should_panic(expected = "drops the selected level")]
    fn shrinking_available_set_under_selection_panics() {
        let selection = FeeSelection::new(
            FeeLevel::Priority,
            BTreeSet::from([FeeLevel::Regular, FeeLevel::Priority]),
            Currency::Eth,
        );
        let _ = selection.update_available_levels(BTreeSet::from([FeeLevel::Regular]));
    }

    #[test]
    fn custom_fee_classification() {
        assert_eq!(
            custom_fee_state(&eth(dec!(0)), &quotes()),
            FeeState::FeeUnderMinLimit
        );
        assert_eq!(
            custom_fee_state(&eth(dec!(0.001)), &quotes()),
            FeeState::FeeUnderRecommended
        );
        assert_eq!(
            custom_fee_state(&eth(dec!(0.01)), &quotes()),
            FeeState::FeeOverRecommended
        );
        assert_eq!(
            custom_fee_state(&eth(dec!(0.003)), &quotes()),
            FeeState::ValidCustomFee
        );
    }
}
