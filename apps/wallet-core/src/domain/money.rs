//! Money value objects: currencies, amounts and exchange rates.
//!
//! Every amount in the transaction pipeline is a [`MoneyValue`]: a
//! `rust_decimal` amount tagged with its [`Currency`]. Arithmetic across
//! mismatched currencies is a typed error, never a silent coercion.

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The currencies the wallet core transacts in.
///
/// A closed set: fiat rails plus the crypto assets with engine support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// US dollar.
    Usd,
    /// Euro.
    Eur,
    /// Pound sterling.
    Gbp,
    /// Bitcoin.
    Btc,
    /// Ether.
    Eth,
    /// Stellar lumens.
    Xlm,
    /// An ERC-20 style dollar token settled on the Ethereum network.
    Usdc,
}

impl Currency {
    /// ISO-style display code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Btc => "BTC",
            Self::Eth => "ETH",
            Self::Xlm => "XLM",
            Self::Usdc => "USDC",
        }
    }

    /// True for fiat rails.
    #[must_use]
    pub const fn is_fiat(&self) -> bool {
        matches!(self, Self::Usd | Self::Eur | Self::Gbp)
    }

    /// True for crypto assets.
    #[must_use]
    pub const fn is_crypto(&self) -> bool {
        !self.is_fiat()
    }

    /// Number of decimal places used for display rounding.
    #[must_use]
    pub const fn decimal_places(&self) -> u32 {
        match self {
            Self::Usd | Self::Eur | Self::Gbp => 2,
            Self::Xlm | Self::Usdc => 7,
            Self::Btc => 8,
            Self::Eth => 18,
        }
    }

    /// The currency network fees are paid in when transacting this asset.
    ///
    /// Tokens settle their fees in the network coin; every other currency
    /// pays fees in itself.
    #[must_use]
    pub const fn fee_currency(&self) -> Self {
        match self {
            Self::Usdc => Self::Eth,
            other => *other,
        }
    }

    /// True when fees for this asset are charged in a different currency.
    #[must_use]
    pub fn is_token(&self) -> bool {
        self.fee_currency() != *self
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error for unsound money arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Two amounts in different currencies were combined or compared.
    #[error("currency mismatch: {lhs} vs {rhs}")]
    CurrencyMismatch {
        /// Left-hand currency.
        lhs: Currency,
        /// Right-hand currency.
        rhs: Currency,
    },
}

/// A decimal amount tagged with its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoneyValue {
    amount: Decimal,
    currency: Currency,
}

impl MoneyValue {
    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// The zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// The maximum representable amount in the given currency.
    ///
    /// Stands in for "no limit" in limits arithmetic so `min`/comparisons
    /// stay total; never encode "no limit" as an absent value downstream.
    #[must_use]
    pub const fn max_value(currency: Currency) -> Self {
        Self::new(Decimal::MAX, currency)
    }

    /// The raw decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    /// The currency of this amount.
    #[must_use]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    /// True when the amount is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// True when the amount is below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// True when the amount is above zero.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// True when this is the "no limit" sentinel for its currency.
    #[must_use]
    pub fn is_max(&self) -> bool {
        self.amount == Decimal::MAX
    }

    fn require_same_currency(&self, other: &Self) -> Result<(), MoneyError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch {
                lhs: self.currency,
                rhs: other.currency,
            })
        }
    }

    /// Add another amount of the same currency.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::CurrencyMismatch`] when the currencies differ.
    pub fn checked_add(&self, other: &Self) -> Result<Self, MoneyError> {
        self.require_same_currency(other)?;
        let amount = self.amount.checked_add(other.amount).unwrap_or(Decimal::MAX);
        Ok(Self::new(amount, self.currency))
    }

    /// Subtract another amount of the same currency.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::CurrencyMismatch`] when the currencies differ.
    pub fn checked_sub(&self, other: &Self) -> Result<Self, MoneyError> {
        self.require_same_currency(other)?;
        let amount = self.amount.checked_sub(other.amount).unwrap_or(Decimal::MIN);
        Ok(Self::new(amount, self.currency))
    }

    /// Subtract, clamping the result at zero.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::CurrencyMismatch`] when the currencies differ.
    pub fn sub_clamped(&self, other: &Self) -> Result<Self, MoneyError> {
        let result = self.checked_sub(other)?;
        Ok(if result.is_negative() {
            Self::zero(self.currency)
        } else {
            result
        })
    }

    /// Compare two amounts of the same currency.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::CurrencyMismatch`] when the currencies differ.
    pub fn checked_cmp(&self, other: &Self) -> Result<Ordering, MoneyError> {
        self.require_same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    /// The smaller of two amounts of the same currency.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::CurrencyMismatch`] when the currencies differ.
    pub fn checked_min(&self, other: &Self) -> Result<Self, MoneyError> {
        self.require_same_currency(other)?;
        Ok(if self.amount <= other.amount { *self } else { *other })
    }

    /// The larger of two amounts of the same currency.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::CurrencyMismatch`] when the currencies differ.
    pub fn checked_max(&self, other: &Self) -> Result<Self, MoneyError> {
        self.require_same_currency(other)?;
        Ok(if self.amount >= other.amount { *self } else { *other })
    }
}

impl fmt::Display for MoneyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency.code())
    }
}

/// A live conversion rate from one currency to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Currency amounts are converted from.
    pub from: Currency,
    /// Currency amounts are converted to.
    pub to: Currency,
    /// Multiplier applied to the source amount.
    pub rate: Decimal,
}

impl ExchangeRate {
    /// Create a rate.
    #[must_use]
    pub const fn new(from: Currency, to: Currency, rate: Decimal) -> Self {
        Self { from, to, rate }
    }

    /// The 1:1 rate for a currency onto itself.
    #[must_use]
    pub const fn identity(currency: Currency) -> Self {
        Self::new(currency, currency, Decimal::ONE)
    }

    /// Convert an amount from the rate's source to its target currency.
    ///
    /// The "no limit" sentinel converts to the target's sentinel, and any
    /// overflowing product saturates to it, so an effectively-infinite limit
    /// stays effectively infinite after conversion.
    #[must_use]
    pub fn convert(&self, value: &MoneyValue) -> MoneyValue {
        debug_assert_eq!(value.currency(), self.from, "rate applied to wrong currency");
        if value.is_max() {
            return MoneyValue::max_value(self.to);
        }
        match value.amount().checked_mul(self.rate) {
            Some(amount) => MoneyValue::new(amount, self.to),
            None => MoneyValue::max_value(self.to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test_case(Currency::Usd, true; "usd is fiat")]
    #[test_case(Currency::Eur, true; "eur is fiat")]
    #[test_case(Currency::Btc, false; "btc is crypto")]
    #[test_case(Currency::Usdc, false; "usdc is crypto")]
    fn currency_fiat_classification(currency: Currency, expected: bool) {
        assert_eq!(currency.is_fiat(), expected);
        assert_eq!(currency.is_crypto(), !expected);
    }

    #[test]
    fn token_fees_settle_in_network_coin() {
        assert_eq!(Currency::Usdc.fee_currency(), Currency::Eth);
        assert!(Currency::Usdc.is_token());
        assert_eq!(Currency::Eth.fee_currency(), Currency::Eth);
        assert!(!Currency::Eth.is_token());
    }

    #[test]
    fn money_zero_and_signs() {
        let zero = MoneyValue::zero(Currency::Btc);
        assert!(zero.is_zero());
        assert!(!zero.is_negative());
        assert!(!zero.is_positive());

        let negative = MoneyValue::new(dec!(-1), Currency::Btc);
        assert!(negative.is_negative());
    }

    #[test]
    fn money_arithmetic_same_currency() {
        let ten = MoneyValue::new(dec!(10), Currency::Eth);
        let fee = MoneyValue::new(dec!(0.1), Currency::Eth);

        let sum = ten.checked_add(&fee).unwrap();
        assert_eq!(sum.amount(), dec!(10.1));

        let available = ten.checked_sub(&fee).unwrap();
        assert_eq!(available.amount(), dec!(9.9));
    }

    #[test]
    fn money_arithmetic_currency_mismatch() {
        let eth = MoneyValue::new(dec!(1), Currency::Eth);
        let btc = MoneyValue::new(dec!(1), Currency::Btc);

        assert_eq!(
            eth.checked_add(&btc),
            Err(MoneyError::CurrencyMismatch {
                lhs: Currency::Eth,
                rhs: Currency::Btc,
            })
        );
        assert!(eth.checked_min(&btc).is_err());
    }

    #[test]
    fn money_sub_clamped_floors_at_zero() {
        let balance = MoneyValue::new(dec!(1), Currency::Xlm);
        let fee = MoneyValue::new(dec!(2), Currency::Xlm);
        assert!(balance.sub_clamped(&fee).unwrap().is_zero());
    }

    #[test]
    fn money_min_max() {
        let a = MoneyValue::new(dec!(5), Currency::Usd);
        let b = MoneyValue::new(dec!(7), Currency::Usd);
        assert_eq!(a.checked_min(&b).unwrap(), a);
        assert_eq!(a.checked_max(&b).unwrap(), b);
    }

    #[test]
    fn max_value_sentinel_survives_conversion() {
        let unlimited = MoneyValue::max_value(Currency::Usd);
        let rate = ExchangeRate::new(Currency::Usd, Currency::Eur, dec!(0.9));
        let converted = rate.convert(&unlimited);
        assert!(converted.is_max());
        assert_eq!(converted.currency(), Currency::Eur);

        // A huge-but-finite value whose product overflows also saturates.
        let nearly = MoneyValue::new(Decimal::MAX / dec!(2), Currency::Usd);
        let doubling = ExchangeRate::new(Currency::Usd, Currency::Eur, dec!(4));
        assert!(doubling.convert(&nearly).is_max());
    }

    #[test]
    fn conversion_applies_rate() {
        let amount = MoneyValue::new(dec!(2), Currency::Btc);
        let rate = ExchangeRate::new(Currency::Btc, Currency::Usd, dec!(50000));
        let converted = rate.convert(&amount);
        assert_eq!(converted, MoneyValue::new(dec!(100000), Currency::Usd));
    }

    #[test]
    fn money_serde_roundtrip() {
        let m = MoneyValue::new(dec!(150.50), Currency::Usd);
        let json = serde_json::to_string(&m).unwrap();
        let parsed: MoneyValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, m);
    }
}
