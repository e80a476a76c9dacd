//! Engine selection keyed on asset family and action.

use std::sync::Arc;

use crate::cache::FlushBus;
use crate::config::WalletCoreConfig;
use crate::domain::Currency;
use crate::limits::{LimitsAccountType, LimitsResolver};
use crate::ports::{
    AccountBalanceService, CurrencyConversionService, FeeService, OnChainTransactionClient,
    TransferClient, WalletCurrencyService,
};

use super::{CustodialTransferEngine, TokenOnChainEngine, TransactionEngine};

/// The user action an engine is selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionAction {
    /// Send funds to an external target.
    Send,
}

/// The funding account an engine transacts from.
#[derive(Debug, Clone)]
pub struct SourceAccount {
    /// The account's currency.
    pub currency: Currency,
    /// The account's custody type.
    pub account_type: LimitsAccountType,
    /// Display label for confirmations.
    pub label: String,
}

/// The receiving side of a transfer.
#[derive(Debug, Clone)]
pub struct TransferTarget {
    /// The asset arriving at the destination.
    pub asset: Currency,
    /// The destination address.
    pub address: String,
    /// Display label for confirmations.
    pub label: String,
    /// A memo required or offered by the destination, when present.
    pub memo: Option<String>,
}

/// Builds the right [`TransactionEngine`] for an (account, action) pair.
///
/// Polymorphism over asset families lives here: one concrete engine type
/// per family, selected at runtime, no inheritance anywhere.
pub struct TransactionEngineFactory {
    wallet_currency: Arc<dyn WalletCurrencyService>,
    conversion: Arc<dyn CurrencyConversionService>,
    balances: Arc<dyn AccountBalanceService>,
    limits: Arc<LimitsResolver>,
    transfer_client: Arc<dyn TransferClient>,
    on_chain_client: Arc<dyn OnChainTransactionClient>,
    fee_service: Arc<dyn FeeService>,
    flush_bus: FlushBus,
    config: WalletCoreConfig,
}

impl TransactionEngineFactory {
    /// Collect the collaborators every engine family draws from.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        wallet_currency: Arc<dyn WalletCurrencyService>,
        conversion: Arc<dyn CurrencyConversionService>,
        balances: Arc<dyn AccountBalanceService>,
        limits: Arc<LimitsResolver>,
        transfer_client: Arc<dyn TransferClient>,
        on_chain_client: Arc<dyn OnChainTransactionClient>,
        fee_service: Arc<dyn FeeService>,
        flush_bus: FlushBus,
        config: WalletCoreConfig,
    ) -> Self {
        Self {
            wallet_currency,
            conversion,
            balances,
            limits,
            transfer_client,
            on_chain_client,
            fee_service,
            flush_bus,
            config,
        }
    }

    /// Select and construct the engine for the given wiring.
    ///
    /// # Panics
    ///
    /// Panics when no engine family covers the combination; like
    /// `assert_inputs_valid`, a miss here is a wiring bug, not a user
    /// condition.
    #[must_use]
    pub fn make_engine(
        &self,
        action: TransactionAction,
        source: &SourceAccount,
        target: TransferTarget,
    ) -> Arc<dyn TransactionEngine> {
        match (action, source.account_type) {
            (TransactionAction::Send, LimitsAccountType::Custodial) => {
                Arc::new(CustodialTransferEngine::new(
                    source.currency,
                    source.label.clone(),
                    target,
                    Arc::clone(&self.wallet_currency),
                    Arc::clone(&self.conversion),
                    Arc::clone(&self.balances),
                    Arc::clone(&self.limits),
                    Arc::clone(&self.transfer_client),
                    self.flush_bus.clone(),
                    self.config.fee_quote_ttl(),
                ))
            }
            (TransactionAction::Send, LimitsAccountType::NonCustodial) => {
                assert!(
                    source.currency.is_token(),
                    "no engine registered for non-custodial {}",
                    source.currency
                );
                Arc::new(TokenOnChainEngine::new(
                    source.currency,
                    source.label.clone(),
                    target,
                    Arc::clone(&self.wallet_currency),
                    Arc::clone(&self.conversion),
                    Arc::clone(&self.balances),
                    Arc::clone(&self.limits),
                    Arc::clone(&self.fee_service),
                    Arc::clone(&self.on_chain_client),
                    &self.flush_bus,
                    self.config.gas_quote_ttl(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{
        MockAccountBalanceService, MockCrossBorderLimitsRepository, MockCurrencyConversionService,
        MockFeatureFlagService, MockFeeService, MockOnChainTransactionClient,
        MockTradeLimitsRepository, MockTransferClient, MockWalletCurrencyService,
    };

    fn factory() -> TransactionEngineFactory {
        let limits = Arc::new(LimitsResolver::new(
            Arc::new(MockTradeLimitsRepository::new()),
            Arc::new(MockCrossBorderLimitsRepository::new()),
            Arc::new(MockWalletCurrencyService::new()),
            Arc::new(MockCurrencyConversionService::new()),
            Arc::new(MockFeatureFlagService::new()),
        ));
        TransactionEngineFactory::new(
            Arc::new(MockWalletCurrencyService::new()),
            Arc::new(MockCurrencyConversionService::new()),
            Arc::new(MockAccountBalanceService::new()),
            limits,
            Arc::new(MockTransferClient::new()),
            Arc::new(MockOnChainTransactionClient::new()),
            Arc::new(MockFeeService::new()),
            FlushBus::new(),
            WalletCoreConfig::default(),
        )
    }

    fn target(asset: Currency) -> TransferTarget {
        TransferTarget {
            asset,
            address: "0x0000000000000000000000000000000000000001".to_string(),
            label: "External".to_string(),
            memo: None,
        }
    }

    fn source(currency: Currency, account_type: LimitsAccountType) -> SourceAccount {
        SourceAccount {
            currency,
            account_type,
            label: "Account".to_string(),
        }
    }

    #[tokio::test]
    async fn custodial_source_selects_the_custodial_engine() {
        let engine = factory().make_engine(
            TransactionAction::Send,
            &source(Currency::Btc, LimitsAccountType::Custodial),
            target(Currency::Btc),
        );
        assert_eq!(engine.source_asset(), Currency::Btc);
        engine.assert_inputs_valid();
    }

    #[tokio::test]
    async fn non_custodial_token_selects_the_on_chain_engine() {
        let engine = factory().make_engine(
            TransactionAction::Send,
            &source(Currency::Usdc, LimitsAccountType::NonCustodial),
            target(Currency::Usdc),
        );
        assert_eq!(engine.source_asset(), Currency::Usdc);
        engine.assert_inputs_valid();
    }

    #[tokio::test]
    #[should_panic(expected = "no engine registered")]
    async fn non_custodial_coin_has_no_engine_family() {
        let _ = factory().make_engine(
            TransactionAction::Send,
            &source(Currency::Btc, LimitsAccountType::NonCustodial),
            target(Currency::Btc),
        );
    }
}
