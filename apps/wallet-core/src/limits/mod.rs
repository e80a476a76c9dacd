//! Transaction limit models and the merge rules between authorities.
//!
//! Two independent authorities bound a transaction: per-trade limits from
//! the trade service and per-user cross-border limits from the compliance
//! service. [`TransactionLimits`] is the merged, public-facing value.

mod resolver;

use serde::{Deserialize, Serialize};

use crate::domain::{Currency, ExchangeRate, MoneyValue};

pub use resolver::{LimitsError, LimitsResolver};

/// Custody classification of one side of a limits query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitsAccountType {
    /// Funds held by the platform.
    Custodial,
    /// Funds held by the user.
    NonCustodial,
}

/// One side (source or destination) of a limits query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LimitsAccount {
    /// The account's currency.
    pub currency: Currency,
    /// The account's custody type.
    pub account_type: LimitsAccountType,
}

/// The product a limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitsProduct {
    /// Buying crypto with fiat.
    Buy,
    /// Selling crypto for fiat.
    Sell,
    /// Crypto-to-crypto swaps.
    Swap,
    /// Sending to an external address.
    Send,
    /// Withdrawing fiat to a bank.
    Withdraw,
    /// Depositing fiat from a bank.
    Deposit,
}

/// A limit over one rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicLimit {
    /// The cap for the window.
    pub limit: MoneyValue,
    /// What is still available within the window.
    pub available: MoneyValue,
    /// What has been consumed within the window.
    pub used: MoneyValue,
    /// Whether this window is the one currently constraining the user.
    pub effective: bool,
}

/// The set of windows currently applied to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedLimits {
    /// Overall remaining headroom across windows.
    pub available: MoneyValue,
    /// Rolling 24h window, if capped.
    pub daily: Option<PeriodicLimit>,
    /// Rolling 30-day window, if capped.
    pub monthly: Option<PeriodicLimit>,
    /// Rolling 365-day window, if capped.
    pub yearly: Option<PeriodicLimit>,
}

/// A tier upgrade the user could take to raise their caps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedLimitsUpgrade {
    /// The verification tier that unlocks the higher caps.
    pub required_tier: u32,
    /// The headroom available after upgrading, when advertised.
    pub available: Option<MoneyValue>,
}

/// Limits produced by the trade-limits authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLimits {
    /// Currency every amount below is denominated in.
    pub currency: Currency,
    /// Smallest order the service accepts.
    pub min_order: MoneyValue,
    /// Largest single order the service accepts.
    pub max_order: MoneyValue,
    /// Largest order possible for this user right now.
    pub max_possible_order: MoneyValue,
    /// Daily window, if capped.
    pub daily: Option<PeriodicLimit>,
    /// Weekly window, if capped.
    pub weekly: Option<PeriodicLimit>,
    /// Annual window, if capped.
    pub annual: Option<PeriodicLimit>,
}

impl TradeLimits {
    /// What the user can still trade today: the daily window's remainder,
    /// or the max possible order when no daily window applies.
    #[must_use]
    pub fn max_tradable_today(&self) -> MoneyValue {
        self.daily
            .as_ref()
            .map_or(self.max_possible_order, |daily| daily.available)
    }
}

/// Limits produced by the cross-border (KYC-tier) authority.
///
/// `current_limits == None` means the user is not capped: treat it as
/// infinite, never as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossBorderLimits {
    /// Currency every amount below is denominated in.
    pub currency: Currency,
    /// The windows currently applied, when the user is capped.
    pub current_limits: Option<TimedLimits>,
    /// Upgrade path that would raise the caps, when one exists.
    pub suggested_upgrade: Option<SuggestedLimitsUpgrade>,
}

/// A fiat funding instrument with its own caps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// The method's settlement currency.
    pub currency: Currency,
    /// Whether the method draws on custodial funds.
    pub is_funds: bool,
    /// Smallest amount the method accepts.
    pub min: MoneyValue,
    /// Largest single amount the method accepts.
    pub max: MoneyValue,
    /// The method's own daily cap.
    pub max_daily: MoneyValue,
}

/// The merged, public-facing limits for one transaction.
///
/// No monotonicity across tiers is guaranteed by construction
/// (`maximum <= maximum_daily` may not hold); only the merge rule in
/// [`TransactionLimits::merge_cross_border`] is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLimits {
    /// Currency every amount below is denominated in.
    pub currency: Currency,
    /// Smallest allowed amount.
    pub minimum: MoneyValue,
    /// Largest allowed single amount.
    pub maximum: MoneyValue,
    /// Largest allowed amount over the daily window.
    pub maximum_daily: MoneyValue,
    /// Largest allowed amount over the annual window.
    pub maximum_annual: MoneyValue,
    /// Upgrade path that would raise the caps, when one exists.
    pub suggested_upgrade: Option<SuggestedLimitsUpgrade>,
}

impl TransactionLimits {
    /// Limits that do not constrain anything in the given currency.
    #[must_use]
    pub fn unbounded(currency: Currency) -> Self {
        let infinite = MoneyValue::max_value(currency);
        Self {
            currency,
            minimum: MoneyValue::zero(currency),
            maximum: infinite,
            maximum_daily: infinite,
            maximum_annual: infinite,
            suggested_upgrade: None,
        }
    }

    /// Lift the trade authority's answer into transaction limits.
    #[must_use]
    pub fn from_trade_limits(trade: &TradeLimits) -> Self {
        Self {
            currency: trade.currency,
            minimum: trade.min_order,
            maximum: trade.max_possible_order,
            maximum_daily: trade
                .daily
                .as_ref()
                .map_or(trade.max_possible_order, |window| window.limit),
            maximum_annual: trade
                .annual
                .as_ref()
                .map_or(trade.max_possible_order, |window| window.limit),
            suggested_upgrade: None,
        }
    }

    /// Lift the cross-border authority's answer into transaction limits.
    ///
    /// Absent windows become the infinite sentinel so the merge arithmetic
    /// stays total.
    #[must_use]
    pub fn from_cross_border(cross_border: &CrossBorderLimits) -> Self {
        let infinite = MoneyValue::max_value(cross_border.currency);
        let window = |limit: Option<&PeriodicLimit>| limit.map_or(infinite, |window| window.limit);
        Self {
            currency: cross_border.currency,
            minimum: MoneyValue::zero(cross_border.currency),
            maximum: cross_border
                .current_limits
                .as_ref()
                .map_or(infinite, |timed| timed.available),
            maximum_daily: window(
                cross_border
                    .current_limits
                    .as_ref()
                    .and_then(|timed| timed.daily.as_ref()),
            ),
            maximum_annual: window(
                cross_border
                    .current_limits
                    .as_ref()
                    .and_then(|timed| timed.yearly.as_ref()),
            ),
            suggested_upgrade: cross_border.suggested_upgrade.clone(),
        }
    }

    /// Merge trade limits (self) with cross-border limits.
    ///
    /// The minimum passes through from the trade side; the single-transaction
    /// maximum is the intersection; the daily and annual windows are taken
    /// wholesale from the cross-border side (they replace, not intersect,
    /// the trade windows), as is the suggested upgrade. Both sides must
    /// already be in the same currency.
    #[must_use]
    pub fn merge_cross_border(&self, cross_border: &Self) -> Self {
        debug_assert_eq!(
            self.currency, cross_border.currency,
            "limits merged across currencies"
        );
        let maximum = self
            .maximum
            .checked_min(&cross_border.maximum)
            .unwrap_or(self.maximum);
        Self {
            currency: self.currency,
            minimum: self.minimum,
            maximum,
            maximum_daily: cross_border.maximum_daily,
            maximum_annual: cross_border.maximum_annual,
            suggested_upgrade: cross_border.suggested_upgrade.clone(),
        }
    }

    /// Intersect with a payment method's own caps.
    #[must_use]
    pub fn intersect_payment_method(&self, method: &PaymentMethod) -> Self {
        Self {
            currency: self.currency,
            minimum: self.minimum.checked_max(&method.min).unwrap_or(self.minimum),
            maximum: self.maximum.checked_min(&method.max).unwrap_or(self.maximum),
            maximum_daily: self
                .maximum_daily
                .checked_min(&method.max_daily)
                .unwrap_or(self.maximum_daily),
            maximum_annual: self.maximum_annual,
            suggested_upgrade: self.suggested_upgrade.clone(),
        }
    }

    /// Convert every amount with the given rate.
    ///
    /// One rate, one direction: the caller fetches a single live rate and
    /// applies it to all fields so rounding error cannot compound.
    #[must_use]
    pub fn convert(&self, rate: &ExchangeRate) -> Self {
        Self {
            currency: rate.to,
            minimum: rate.convert(&self.minimum),
            maximum: rate.convert(&self.maximum),
            maximum_daily: rate.convert(&self.maximum_daily),
            maximum_annual: rate.convert(&self.maximum_annual),
            suggested_upgrade: self.suggested_upgrade.clone(),
        }
    }
}
