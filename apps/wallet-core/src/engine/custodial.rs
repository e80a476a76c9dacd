//! Transaction engine for custodial account-model assets.
//!
//! Moves funds from a custodial trading account to an external on-chain
//! address. The platform charges a flat withdrawal fee on top of the
//! amount, there is no fee choice, and memo-capable assets carry the memo
//! through the engine-private state.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::cache::{
    CacheConfiguration, CachedValueSource, FlushBus, FlushNotification, InMemoryCache,
    PeriodicCacheRefreshControl,
};
use crate::domain::{Currency, MoneyValue};
use crate::limits::{LimitsAccount, LimitsAccountType, LimitsProduct, LimitsResolver};
use crate::ports::{
    AccountBalanceService, CurrencyConversionService, NetworkError, TransferClient, TransferFees,
    WalletCurrencyService,
};

use super::factory::TransferTarget;
use super::{
    Confirmation, EngineError, FeeLevel, PendingTransaction, TransactionEngine, TransactionResult,
    TransactionValidationState,
};

/// Longest memo the memo-capable networks accept.
const MAX_MEMO_BYTES: usize = 28;

/// Engine for custodial-to-address transfers.
pub struct CustodialTransferEngine {
    source: Currency,
    source_label: String,
    target: TransferTarget,
    wallet_currency: Arc<dyn WalletCurrencyService>,
    conversion: Arc<dyn CurrencyConversionService>,
    balances: Arc<dyn AccountBalanceService>,
    limits: Arc<LimitsResolver>,
    transfer_client: Arc<dyn TransferClient>,
    flush_bus: FlushBus,
    fee_source: CachedValueSource<Currency, TransferFees, NetworkError>,
}

impl CustodialTransferEngine {
    /// Wire up an engine for one custodial source account.
    ///
    /// Withdrawal fee quotes are cached for `fee_quote_ttl` and flushed on
    /// logout or after any submitted transaction.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        source: Currency,
        source_label: String,
        target: TransferTarget,
        wallet_currency: Arc<dyn WalletCurrencyService>,
        conversion: Arc<dyn CurrencyConversionService>,
        balances: Arc<dyn AccountBalanceService>,
        limits: Arc<LimitsResolver>,
        transfer_client: Arc<dyn TransferClient>,
        flush_bus: FlushBus,
        fee_quote_ttl: Duration,
    ) -> Self {
        let fee_cache = Arc::new(InMemoryCache::with_flush_bus(
            &CacheConfiguration::flushed_by(vec![
                FlushNotification::UserLoggedOut,
                FlushNotification::TransactionSubmitted,
            ]),
            Arc::new(PeriodicCacheRefreshControl::new(fee_quote_ttl)),
            &flush_bus,
        ));
        let fee_client = Arc::clone(&transfer_client);
        let fee_source = CachedValueSource::new(fee_cache, move |asset: Currency| {
            let client = Arc::clone(&fee_client);
            async move { client.fees(asset).await }
        });
        Self {
            source,
            source_label,
            target,
            wallet_currency,
            conversion,
            balances,
            limits,
            transfer_client,
            flush_bus,
            fee_source,
        }
    }

    fn memo_supported(&self) -> bool {
        matches!(self.source, Currency::Xlm)
    }

    /// The ordered validation chain for this engine: amount bounds, then
    /// funds, then fee coverage.
    async fn amount_validation_state(
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

        let balance = self.balances.actionable_balance(self.source).await?;
        if balance.checked_cmp(&pending.fee_amount)? == Ordering::Less {
            return Ok(TransactionValidationState::BelowFees {
                fee: pending.fee_amount,
                balance,
            });
        }

        Ok(TransactionValidationState::CanExecute)
    }
}

#[async_trait]
impl TransactionEngine for CustodialTransferEngine {
    fn source_asset(&self) -> Currency {
        self.source
    }

    fn assert_inputs_valid(&self) {
        assert!(
            self.source.is_crypto(),
            "custodial transfer engine wired to a fiat source"
        );
        assert!(
            !self.target.address.is_empty(),
            "custodial transfer engine wired without a destination address"
        );
    }

    async fn initialize_transaction(&self) -> Result<PendingTransaction, EngineError> {
        let limits = self
            .limits
            .fetch_limits(
                LimitsAccount {
                    currency: self.source,
                    account_type: LimitsAccountType::Custodial,
                },
                LimitsAccount {
                    currency: self.target.asset,
                    account_type: LimitsAccountType::NonCustodial,
                },
                LimitsProduct::Send,
            )
            .await?;
        let wallet_currency = self.wallet_currency.display_currency().await;
        let fees = self.fee_source.get(self.source, false).await?;
        let balance = self.balances.actionable_balance(self.source).await?;
        let available = balance.sub_clamped(&fees.fee)?;

        let mut pending = PendingTransaction::zero(self.source)
            .with_limits(limits)
            .with_amounts(
                MoneyValue::zero(self.source),
                available,
                fees.fee,
                fees.fee,
            );
        pending.selected_fiat_currency = wallet_currency;
        if self.memo_supported() {
            if let Some(memo) = &self.target.memo {
                pending = pending.with_memo(memo.clone());
            }
        }
        Ok(pending)
    }

    async fn update(
        &self,
        amount: MoneyValue,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError> {
        let fees = self.fee_source.get(self.source, false).await?;
        let balance = self.balances.actionable_balance(self.source).await?;
        let available = balance.sub_clamped(&fees.fee)?;

        let mut updated = pending.with_amounts(amount, available, fees.fee, fees.fee);
        if let Some(limits) = updated.limits.take() {
            // The transfer service's own minimum supersedes the trade one.
            updated.limits = Some(crate::limits::TransactionLimits {
                minimum: fees.minimum_amount,
                ..limits
            });
        }
        Ok(updated)
    }

    async fn validate_amount(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError> {
        let state = self.amount_validation_state(&pending).await?;
        Ok(pending.with_validation_state(state))
    }

    async fn do_build_confirmations(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError> {
        let rate = self
            .conversion
            .conversion_rate(self.source, pending.selected_fiat_currency)
            .await?;
        let total = pending.amount.checked_add(&pending.fee_amount)?;

        let mut confirmations = vec![
            Confirmation::Source {
                label: self.source_label.clone(),
            },
            Confirmation::Destination {
                label: self.target.label.clone(),
            },
            Confirmation::NetworkFee {
                fee: pending.fee_amount,
                asset: self.source,
            },
            Confirmation::Total {
                total: rate.convert(&total),
            },
        ];
        if self.memo_supported() {
            confirmations.push(Confirmation::Memo {
                text: pending.memo().map(str::to_owned),
                required: false,
            });
        }
        Ok(pending.with_confirmations(confirmations))
    }

    async fn do_option_update_request(
        &self,
        pending: PendingTransaction,
        new_confirmation: Confirmation,
    ) -> Result<PendingTransaction, EngineError> {
        let pending = match &new_confirmation {
            Confirmation::Memo {
                text: Some(text), ..
            } => pending.with_memo(text.clone()),
            _ => pending,
        };
        Ok(pending.insert_confirmation(new_confirmation))
    }

    async fn do_validate_all(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError> {
        let pending = self.validate_amount(pending).await?;
        if !pending.validation_state.is_can_execute() {
            return Ok(pending);
        }

        if self
            .balances
            .is_waiting_on_transaction(self.source)
            .await?
        {
            return Ok(
                pending.with_validation_state(TransactionValidationState::TransactionInFlight)
            );
        }

        if let Some(memo) = pending.memo() {
            if memo.len() > MAX_MEMO_BYTES {
                return Ok(pending.with_validation_state(TransactionValidationState::MemoInvalid));
            }
        }

        Ok(pending)
    }

    async fn execute(
        &self,
        pending: PendingTransaction,
        _second_password: &str,
    ) -> Result<TransactionResult, EngineError> {
        let reference = Uuid::new_v4();
        tracing::info!(%reference, amount = %pending.amount, "submitting custodial transfer");
        let tx_hash = self
            .transfer_client
            .transfer(
                reference,
                pending.amount,
                &self.target.address,
                pending.memo(),
            )
            .await?;
        Ok(TransactionResult::Hashed {
            tx_hash,
            amount: Some(pending.amount),
        })
    }

    async fn do_post_execute(&self, _result: &TransactionResult) -> Result<(), EngineError> {
        // Balances and fee schedules are about to move; let every
        // subscribed cache drop its entries.
        self.flush_bus.post(FlushNotification::TransactionSubmitted);
        Ok(())
    }

    async fn do_update_fee_level(
        &self,
        pending: PendingTransaction,
        level: FeeLevel,
        _custom_amount: Option<MoneyValue>,
    ) -> Result<PendingTransaction, EngineError> {
        // Custodial rails have exactly one level; the processor already
        // checked availability, so there is nothing to recompute.
        debug_assert_eq!(level, FeeLevel::None);
        Ok(pending)
    }
}
