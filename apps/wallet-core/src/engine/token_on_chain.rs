//! Transaction engine for ERC-20 style tokens on an account-model chain.
//!
//! The amount moves in the token while the network fee is paid in the
//! chain's native coin, so validation distinguishes "not enough token"
//! from "not enough gas". Fee quotes come in regular/priority tiers with
//! an optional user-entered custom amount.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::cache::{
    CacheConfiguration, CachedValueSource, FlushBus, InMemoryCache, PeriodicCacheRefreshControl,
};
use crate::domain::{Currency, MoneyValue};
use crate::limits::{LimitsAccount, LimitsAccountType, LimitsProduct, LimitsResolver};
use crate::ports::{
    AccountBalanceService, CurrencyConversionService, FeeService, GasQuotes, NetworkError,
    OnChainTransactionClient, WalletCurrencyService,
};

use super::factory::TransferTarget;
use super::fee::{FeeSelection, FeeState, custom_fee_state};
use super::{
    Confirmation, EngineError, FeeLevel, PendingTransaction, RefreshConfirmationsHandle,
    TransactionEngine, TransactionResult, TransactionValidationState,
};

/// Hex-encoded account address length on the target chain.
const ADDRESS_LENGTH: usize = 42;

/// Engine for non-custodial token transfers.
pub struct TokenOnChainEngine {
    token: Currency,
    fee_currency: Currency,
    source_label: String,
    target: TransferTarget,
    wallet_currency: Arc<dyn WalletCurrencyService>,
    conversion: Arc<dyn CurrencyConversionService>,
    balances: Arc<dyn AccountBalanceService>,
    limits: Arc<LimitsResolver>,
    client: Arc<dyn OnChainTransactionClient>,
    gas_source: CachedValueSource<Currency, GasQuotes, NetworkError>,
    quote_ttl: Duration,
    refresh: OnceLock<RefreshConfirmationsHandle>,
    quote_watch: Mutex<Option<JoinHandle<()>>>,
}

impl TokenOnChainEngine {
    /// Wire up an engine for one token account.
    ///
    /// Gas quotes are cached for `quote_ttl` and flushed on logout; the
    /// same interval drives the confirmation-refresh timer once
    /// confirmations are on display.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        token: Currency,
        source_label: String,
        target: TransferTarget,
        wallet_currency: Arc<dyn WalletCurrencyService>,
        conversion: Arc<dyn CurrencyConversionService>,
        balances: Arc<dyn AccountBalanceService>,
        limits: Arc<LimitsResolver>,
        fee_service: Arc<dyn FeeService>,
        client: Arc<dyn OnChainTransactionClient>,
        flush_bus: &FlushBus,
        quote_ttl: Duration,
    ) -> Self {
        let gas_cache = Arc::new(InMemoryCache::with_flush_bus(
            &CacheConfiguration::on_logout(),
            Arc::new(PeriodicCacheRefreshControl::new(quote_ttl)),
            flush_bus,
        ));
        let quotes_service = Arc::clone(&fee_service);
        let gas_source = CachedValueSource::new(gas_cache, move |asset: Currency| {
            let service = Arc::clone(&quotes_service);
            async move { service.fees(asset).await }
        });
        Self {
            fee_currency: token.fee_currency(),
            token,
            source_label,
            target,
            wallet_currency,
            conversion,
            balances,
            limits,
            client,
            gas_source,
            quote_ttl,
            refresh: OnceLock::new(),
            quote_watch: Mutex::new(None),
        }
    }

    fn fee_for_level(
        &self,
        quotes: &GasQuotes,
        level: FeeLevel,
        custom_amount: Option<&MoneyValue>,
    ) -> MoneyValue {
        match level {
            FeeLevel::None => MoneyValue::zero(self.fee_currency),
            FeeLevel::Regular => quotes.regular,
            FeeLevel::Priority => quotes.priority,
            FeeLevel::Custom => custom_amount.copied().unwrap_or(quotes.regular),
        }
    }

    fn address_is_well_formed(&self) -> bool {
        self.target.address.len() == ADDRESS_LENGTH && self.target.address.starts_with("0x")
    }

    /// The ordered validation chain: amount bounds, then token funds, then
    /// gas coverage, then in-flight transactions. The order is what keeps
    /// a zero amount from ever surfacing as "insufficient gas".
    async fn validation_state_for(
        &self,
        pending: &PendingTransaction,
    ) -> Result<TransactionValidationState, EngineError> {
        let amount = pending.amount;

        if amount.is_negative() {
            return Ok(TransactionValidationState::InvalidAmount);
        }
        let minimum = pending.min_limit();
        if amount.checked_cmp(&minimum)? == Ordering::Less {
            return Ok(TransactionValidationState::BelowMinimumLimit(minimum));
        }
        if amount.is_zero() {
            return Ok(TransactionValidationState::InvalidAmount);
        }
        if let Some(limits) = &pending.limits {
            if amount.checked_cmp(&limits.maximum)? == Ordering::Greater {
                return Ok(TransactionValidationState::OverMaximumLimit(limits.maximum));
            }
        }

        if amount.checked_cmp(&pending.available)? == Ordering::Greater {
            return Ok(TransactionValidationState::InsufficientFunds);
        }

        let gas_balance = self.balances.actionable_balance(self.fee_currency).await?;
        if gas_balance.checked_cmp(&pending.fee_amount)? == Ordering::Less {
            return Ok(TransactionValidationState::InsufficientGas);
        }

        if self
            .balances
            .is_waiting_on_transaction(self.fee_currency)
            .await?
        {
            return Ok(TransactionValidationState::TransactionInFlight);
        }

        if pending.fee_selection.selected_level() == FeeLevel::Custom {
            if let (Some(custom), Some(rates)) = (
                pending.fee_selection.custom_amount(),
                pending.fee_selection.custom_level_rates(),
            ) {
                if custom_fee_state(custom, rates) == FeeState::FeeUnderMinLimit {
                    return Ok(TransactionValidationState::OptionInvalid);
                }
            }
        }

        if !self.address_is_well_formed() {
            return Ok(TransactionValidationState::InvalidAddress);
        }

        Ok(TransactionValidationState::CanExecute)
    }
}

#[async_trait]
impl TransactionEngine for TokenOnChainEngine {
    fn source_asset(&self) -> Currency {
        self.token
    }

    fn assert_inputs_valid(&self) {
        assert!(
            self.token.is_token(),
            "token engine wired to a non-token source"
        );
        assert!(
            !self.target.address.is_empty(),
            "token engine wired without a destination address"
        );
    }

    fn start(&self, refresh: RefreshConfirmationsHandle) {
        let _ = self.refresh.set(refresh);
    }

    async fn initialize_transaction(&self) -> Result<PendingTransaction, EngineError> {
        let limits = self
            .limits
            .fetch_limits(
                LimitsAccount {
                    currency: self.token,
                    account_type: LimitsAccountType::NonCustodial,
                },
                LimitsAccount {
                    currency: self.target.asset,
                    account_type: LimitsAccountType::NonCustodial,
                },
                LimitsProduct::Send,
            )
            .await?;
        let wallet_currency = self.wallet_currency.display_currency().await;

        let mut pending = PendingTransaction::zero(self.token)
            .with_limits(limits)
            .with_fee_selection(FeeSelection::new(
                FeeLevel::Regular,
                BTreeSet::from([FeeLevel::Regular, FeeLevel::Priority, FeeLevel::Custom]),
                self.fee_currency,
            ));
        pending.selected_fiat_currency = wallet_currency;
        Ok(pending)
    }

    async fn update(
        &self,
        amount: MoneyValue,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError> {
        let quotes = self.gas_source.get(self.token, false).await?;
        let fee = self.fee_for_level(
            &quotes,
            pending.fee_selection.selected_level(),
            pending.fee_selection.custom_amount(),
        );
        let token_balance = self.balances.actionable_balance(self.token).await?;

        // The fee is paid from the gas account, so the full token balance
        // stays available.
        let fee_selection = pending
            .fee_selection
            .clone()
            .update_custom_level_rates(quotes);
        Ok(pending
            .with_amounts(amount, token_balance, fee, fee)
            .with_fee_selection(fee_selection))
    }

    async fn validate_amount(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError> {
        let state = self.validation_state_for(&pending).await?;
        Ok(pending.with_validation_state(state))
    }

    async fn do_build_confirmations(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError> {
        let rate = self
            .conversion
            .conversion_rate(self.token, pending.selected_fiat_currency)
            .await?;

        let confirmations = vec![
            Confirmation::Source {
                label: self.source_label.clone(),
            },
            Confirmation::Destination {
                label: self.target.label.clone(),
            },
            Confirmation::FeeSelector {
                selection: pending.fee_selection.clone(),
            },
            Confirmation::NetworkFee {
                fee: pending.fee_amount,
                asset: self.token,
            },
            Confirmation::Total {
                total: rate.convert(&pending.amount),
            },
        ];
        Ok(pending.with_confirmations(confirmations))
    }

    async fn do_validate_all(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError> {
        self.validate_amount(pending).await
    }

    async fn execute(
        &self,
        pending: PendingTransaction,
        _second_password: &str,
    ) -> Result<TransactionResult, EngineError> {
        tracing::info!(amount = %pending.amount, fee = %pending.fee_amount, "broadcasting token transfer");
        let tx_hash = self
            .client
            .submit(pending.amount, &self.target.address, pending.fee_amount)
            .await?;
        Ok(TransactionResult::Hashed {
            tx_hash,
            amount: Some(pending.amount),
        })
    }

    async fn do_update_fee_level(
        &self,
        pending: PendingTransaction,
        level: FeeLevel,
        custom_amount: Option<MoneyValue>,
    ) -> Result<PendingTransaction, EngineError> {
        // Quotes may have gone stale since the last edit; never reuse the
        // previous fee figure blindly.
        let quotes = self.gas_source.get(self.token, false).await?;
        let fee = self.fee_for_level(&quotes, level, custom_amount.as_ref());
        let amount = pending.amount;
        let available = pending.available;
        Ok(pending
            .with_selected_fee_level(level, custom_amount)
            .with_amounts(amount, available, fee, fee))
    }

    async fn do_refresh_confirmations(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError> {
        let quotes = self.gas_source.get(self.token, true).await?;
        let fee = self.fee_for_level(
            &quotes,
            pending.fee_selection.selected_level(),
            pending.fee_selection.custom_amount(),
        );
        let amount = pending.amount;
        let available = pending.available;
        self.do_build_confirmations(pending.with_amounts(amount, available, fee, fee))
            .await
    }

    async fn start_confirmations_update(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError> {
        if let Some(refresh) = self.refresh.get() {
            let refresh = refresh.clone();
            let quote_ttl = self.quote_ttl;
            let watcher = tokio::spawn(async move {
                // When the displayed quote expires, ask the processor to
                // rebuild and revalidate.
                tokio::time::sleep(quote_ttl).await;
                refresh.request(true);
            });
            let mut slot = self.quote_watch.lock().expect("quote watch lock poisoned");
            if let Some(previous) = slot.replace(watcher) {
                previous.abort();
            }
        }
        Ok(pending)
    }

    async fn stop(&self, _pending: PendingTransaction) {
        let mut slot = self.quote_watch.lock().expect("quote watch lock poisoned");
        if let Some(watcher) = slot.take() {
            watcher.abort();
        }
    }
}
