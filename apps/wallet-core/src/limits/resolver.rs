//! Fetches and merges limits from the two limit authorities.

use std::sync::Arc;

use thiserror::Error;

use crate::ports::{
    ConversionError, CrossBorderLimitsRepository, CurrencyConversionService, FeatureFlag,
    FeatureFlagService, NetworkError, TradeLimitsRepository, WalletCurrencyService,
};

use super::{LimitsAccount, LimitsAccountType, LimitsProduct, PaymentMethod, TransactionLimits};

/// Failure resolving limits.
///
/// Network-class failures are kept apart from everything else so the UI
/// can offer a retry only where retrying can help. An error is never
/// collapsed into a zero limit: a zero limit is indistinguishable from "no
/// funds available".
#[derive(Debug, Error)]
pub enum LimitsError {
    /// A limits authority could not be reached or answered badly.
    #[error("limits fetch failed: {0}")]
    Network(#[from] NetworkError),
    /// Anything else, currently conversion-rate failures.
    #[error("limits resolution failed: {0}")]
    Other(#[source] anyhow::Error),
}

impl From<ConversionError> for LimitsError {
    fn from(error: ConversionError) -> Self {
        Self::Other(anyhow::Error::new(error))
    }
}

/// Resolves the effective [`TransactionLimits`] for a transaction.
///
/// Trade limits are always consulted; cross-border limits participate only
/// when the corresponding feature flag is on. All amounts are fetched in
/// the wallet's fiat currency and converted to the source account's
/// currency with a single live rate.
pub struct LimitsResolver {
    trade_limits: Arc<dyn TradeLimitsRepository>,
    cross_border: Arc<dyn CrossBorderLimitsRepository>,
    wallet_currency: Arc<dyn WalletCurrencyService>,
    conversion: Arc<dyn CurrencyConversionService>,
    feature_flags: Arc<dyn FeatureFlagService>,
}

impl LimitsResolver {
    /// Create a resolver over the injected authorities.
    #[must_use]
    pub fn new(
        trade_limits: Arc<dyn TradeLimitsRepository>,
        cross_border: Arc<dyn CrossBorderLimitsRepository>,
        wallet_currency: Arc<dyn WalletCurrencyService>,
        conversion: Arc<dyn CurrencyConversionService>,
        feature_flags: Arc<dyn FeatureFlagService>,
    ) -> Self {
        Self {
            trade_limits,
            cross_border,
            wallet_currency,
            conversion,
            feature_flags,
        }
    }

    /// Resolve limits for a source/destination account pair.
    ///
    /// # Errors
    ///
    /// [`LimitsError::Network`] when an authority cannot be reached,
    /// [`LimitsError::Other`] when the conversion rate is unavailable.
    pub async fn fetch_limits(
        &self,
        source: LimitsAccount,
        destination: LimitsAccount,
        product: LimitsProduct,
    ) -> Result<TransactionLimits, LimitsError> {
        let wallet_currency = self.wallet_currency.display_currency().await;
        let cross_border_enabled = self
            .feature_flags
            .is_enabled(FeatureFlag::CrossBorderLimits)
            .await;

        let trade = self
            .trade_limits
            .fetch_trade_limits(wallet_currency, product)
            .await?;
        let trade_limits = TransactionLimits::from_trade_limits(&trade);

        // One live rate, applied in one direction to every amount.
        let rate = self
            .conversion
            .conversion_rate(wallet_currency, source.currency)
            .await?;

        if !cross_border_enabled {
            return Ok(trade_limits.convert(&rate));
        }

        let cross_border = self
            .cross_border
            .fetch_cross_border_limits(source, destination, wallet_currency)
            .await?;
        let cross_border_limits = TransactionLimits::from_cross_border(&cross_border);

        let merged = trade_limits
            .convert(&rate)
            .merge_cross_border(&cross_border_limits.convert(&rate));
        tracing::debug!(
            currency = %merged.currency,
            maximum = %merged.maximum,
            "resolved transaction limits"
        );
        Ok(merged)
    }

    /// Resolve limits keyed by a payment method instead of a destination
    /// account: the method's own caps tighten the trade limits before the
    /// cross-border merge.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`LimitsResolver::fetch_limits`].
    pub async fn fetch_limits_for_payment_method(
        &self,
        method: &PaymentMethod,
        destination: LimitsAccount,
        product: LimitsProduct,
    ) -> Result<TransactionLimits, LimitsError> {
        let cross_border_enabled = self
            .feature_flags
            .is_enabled(FeatureFlag::CrossBorderLimits)
            .await;

        let trade = self
            .trade_limits
            .fetch_trade_limits(method.currency, product)
            .await?;
        let limits =
            TransactionLimits::from_trade_limits(&trade).intersect_payment_method(method);

        if !cross_border_enabled {
            return Ok(limits);
        }

        let source = LimitsAccount {
            currency: method.currency,
            account_type: if method.is_funds {
                LimitsAccountType::Custodial
            } else {
                LimitsAccountType::NonCustodial
            },
        };
        let cross_border = self
            .cross_border
            .fetch_cross_border_limits(source, destination, method.currency)
            .await?;
        Ok(limits.merge_cross_border(&TransactionLimits::from_cross_border(&cross_border)))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::domain::{Currency, ExchangeRate, MoneyValue};
    use crate::limits::{CrossBorderLimits, PeriodicLimit, TimedLimits, TradeLimits};
    use crate::ports::{
        MockCrossBorderLimitsRepository, MockCurrencyConversionService, MockFeatureFlagService,
        MockTradeLimitsRepository, MockWalletCurrencyService,
    };

    use super::*;

    fn usd(amount: rust_decimal::Decimal) -> MoneyValue {
        MoneyValue::new(amount, Currency::Usd)
    }

    fn trade_limits_usd() -> TradeLimits {
        TradeLimits {
            currency: Currency::Usd,
            min_order: usd(dec!(10)),
            max_order: usd(dec!(10000)),
            max_possible_order: usd(dec!(5000)),
            daily: None,
            weekly: None,
            annual: None,
        }
    }

    struct Fixture {
        trade: MockTradeLimitsRepository,
        cross_border: MockCrossBorderLimitsRepository,
        wallet: MockWalletCurrencyService,
        conversion: MockCurrencyConversionService,
        flags: MockFeatureFlagService,
    }

    impl Fixture {
        fn new(cross_border_enabled: bool) -> Self {
            let mut wallet = MockWalletCurrencyService::new();
            wallet
                .expect_display_currency()
                .returning(|| Currency::Usd);
            let mut flags = MockFeatureFlagService::new();
            flags
                .expect_is_enabled()
                .returning(move |_| cross_border_enabled);
            let mut conversion = MockCurrencyConversionService::new();
            conversion
                .expect_conversion_rate()
                .returning(|from, to| Ok(ExchangeRate::new(from, to, dec!(1))));
            Self {
                trade: MockTradeLimitsRepository::new(),
                cross_border: MockCrossBorderLimitsRepository::new(),
                wallet,
                conversion,
                flags,
            }
        }

        fn resolver(self) -> LimitsResolver {
            LimitsResolver::new(
                Arc::new(self.trade),
                Arc::new(self.cross_border),
                Arc::new(self.wallet),
                Arc::new(self.conversion),
                Arc::new(self.flags),
            )
        }
    }

    fn account(currency: Currency, account_type: LimitsAccountType) -> LimitsAccount {
        LimitsAccount {
            currency,
            account_type,
        }
    }

    #[tokio::test]
    async fn flag_disabled_returns_trade_limits_only() {
        let mut fixture = Fixture::new(false);
        fixture
            .trade
            .expect_fetch_trade_limits()
            .returning(|_, _| Ok(trade_limits_usd()));
        fixture.cross_border.expect_fetch_cross_border_limits().never();

        let limits = fixture
            .resolver()
            .fetch_limits(
                account(Currency::Usd, LimitsAccountType::Custodial),
                account(Currency::Btc, LimitsAccountType::NonCustodial),
                LimitsProduct::Send,
            )
            .await
            .unwrap();

        assert_eq!(limits.minimum, usd(dec!(10)));
        assert_eq!(limits.maximum, usd(dec!(5000)));
        assert!(limits.suggested_upgrade.is_none());
    }

    #[tokio::test]
    async fn flag_enabled_merges_cross_border_caps() {
        let mut fixture = Fixture::new(true);
        fixture
            .trade
            .expect_fetch_trade_limits()
            .returning(|_, _| Ok(trade_limits_usd()));
        fixture
            .cross_border
            .expect_fetch_cross_border_limits()
            .returning(|_, _, _| {
                Ok(CrossBorderLimits {
                    currency: Currency::Usd,
                    current_limits: Some(TimedLimits {
                        available: usd(dec!(2000)),
                        daily: Some(PeriodicLimit {
                            limit: usd(dec!(2500)),
                            available: usd(dec!(2000)),
                            used: usd(dec!(500)),
                            effective: true,
                        }),
                        monthly: None,
                        yearly: None,
                    }),
                    suggested_upgrade: None,
                })
            });

        let limits = fixture
            .resolver()
            .fetch_limits(
                account(Currency::Usd, LimitsAccountType::Custodial),
                account(Currency::Btc, LimitsAccountType::NonCustodial),
                LimitsProduct::Send,
            )
            .await
            .unwrap();

        assert_eq!(limits.maximum, usd(dec!(2000)));
        assert_eq!(limits.maximum_daily, usd(dec!(2500)));
        assert!(limits.maximum_annual.is_max());
    }

    #[tokio::test]
    async fn uncapped_cross_border_leaves_trade_maximum() {
        let mut fixture = Fixture::new(true);
        fixture
            .trade
            .expect_fetch_trade_limits()
            .returning(|_, _| Ok(trade_limits_usd()));
        fixture
            .cross_border
            .expect_fetch_cross_border_limits()
            .returning(|_, _, _| {
                Ok(CrossBorderLimits {
                    currency: Currency::Usd,
                    current_limits: None,
                    suggested_upgrade: None,
                })
            });

        let limits = fixture
            .resolver()
            .fetch_limits(
                account(Currency::Usd, LimitsAccountType::Custodial),
                account(Currency::Btc, LimitsAccountType::NonCustodial),
                LimitsProduct::Send,
            )
            .await
            .unwrap();

        assert_eq!(limits.maximum, usd(dec!(5000)));
        assert!(limits.maximum_daily.is_max());
        assert!(limits.maximum_annual.is_max());
    }

    #[tokio::test]
    async fn network_failure_is_typed_never_zeroed() {
        let mut fixture = Fixture::new(false);
        fixture
            .trade
            .expect_fetch_trade_limits()
            .returning(|_, _| Err(NetworkError::Timeout));

        let result = fixture
            .resolver()
            .fetch_limits(
                account(Currency::Usd, LimitsAccountType::Custodial),
                account(Currency::Btc, LimitsAccountType::NonCustodial),
                LimitsProduct::Send,
            )
            .await;

        assert!(matches!(result, Err(LimitsError::Network(NetworkError::Timeout))));
    }

    #[tokio::test]
    async fn conversion_failure_maps_to_other() {
        let mut fixture = Fixture::new(false);
        fixture
            .trade
            .expect_fetch_trade_limits()
            .returning(|_, _| Ok(trade_limits_usd()));
        fixture.conversion.checkpoint();
        fixture
            .conversion
            .expect_conversion_rate()
            .returning(|from, to| Err(ConversionError::RateUnavailable { from, to }));

        let result = fixture
            .resolver()
            .fetch_limits(
                account(Currency::Btc, LimitsAccountType::NonCustodial),
                account(Currency::Btc, LimitsAccountType::NonCustodial),
                LimitsProduct::Send,
            )
            .await;

        assert!(matches!(result, Err(LimitsError::Other(_))));
    }

    #[tokio::test]
    async fn payment_method_caps_tighten_trade_limits() {
        let mut fixture = Fixture::new(false);
        fixture
            .trade
            .expect_fetch_trade_limits()
            .returning(|_, _| Ok(trade_limits_usd()));

        let method = PaymentMethod {
            currency: Currency::Usd,
            is_funds: true,
            min: usd(dec!(25)),
            max: usd(dec!(1000)),
            max_daily: usd(dec!(1500)),
        };
        let limits = fixture
            .resolver()
            .fetch_limits_for_payment_method(
                &method,
                account(Currency::Btc, LimitsAccountType::Custodial),
                LimitsProduct::Buy,
            )
            .await
            .unwrap();

        assert_eq!(limits.minimum, usd(dec!(25)));
        assert_eq!(limits.maximum, usd(dec!(1000)));
        assert_eq!(limits.maximum_daily, usd(dec!(1500)));
    }
}
