//! Ports onto external collaborators.
//!
//! The transaction core is a library; everything that touches the network
//! (balances, fees, limits, rates, broadcast) is consumed through the
//! async contracts here and implemented per backend elsewhere. Every fetch
//! behind these ports must be idempotent-safe to retry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Currency, ExchangeRate, MoneyValue};
use crate::limits::{CrossBorderLimits, LimitsAccount, LimitsProduct, TradeLimits};

/// Transport-level failure reported by any remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The request could not reach the service.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The service answered with a non-success status.
    #[error("server returned status {status}")]
    ServerError {
        /// HTTP-like status code.
        status: u16,
    },
    /// The request timed out.
    #[error("request timed out")]
    Timeout,
    /// The payload could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Failure fetching a conversion rate.
///
/// "No rate published for this pair" and "the rate service is unreachable"
/// are distinct so callers can offer retry only where it can help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The pair has no published rate.
    #[error("no exchange rate available for {from} -> {to}")]
    RateUnavailable {
        /// Source currency.
        from: Currency,
        /// Target currency.
        to: Currency,
    },
    /// The rate service failed.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Feature gates consulted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFlag {
    /// Whether cross-border (KYC-tier) limits participate in limit merges.
    CrossBorderLimits,
}

/// Source of the wallet's display/trading fiat currency.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletCurrencyService: Send + Sync {
    /// The fiat currency the user prices the wallet in.
    async fn display_currency(&self) -> Currency;
}

/// Live currency conversion capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CurrencyConversionService: Send + Sync {
    /// Fetch the live conversion rate for a pair.
    async fn conversion_rate(
        &self,
        from: Currency,
        to: Currency,
    ) -> Result<ExchangeRate, ConversionError>;
}

/// Balance facts for one asset family.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountBalanceService: Send + Sync {
    /// The balance the user can actually act on (settled, unlocked).
    async fn actionable_balance(&self, currency: Currency) -> Result<MoneyValue, NetworkError>;

    /// True while a previously submitted transaction is still settling and
    /// the account must not start another one.
    async fn is_waiting_on_transaction(&self, currency: Currency) -> Result<bool, NetworkError>;
}

/// Fee schedule for custodial withdrawals of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFees {
    /// Flat fee charged on top of the withdrawn amount.
    pub fee: MoneyValue,
    /// Smallest amount the service will transfer.
    pub minimum_amount: MoneyValue,
}

/// Network fee quotes for on-chain transactions of one asset, denominated
/// in the asset's fee currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasQuotes {
    /// Fee for inclusion at the regular priority tier.
    pub regular: MoneyValue,
    /// Fee for inclusion at the priority tier.
    pub priority: MoneyValue,
}

/// Remote fee quote source for on-chain engines.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeeService: Send + Sync {
    /// Current network fee quotes for transacting `asset`.
    async fn fees(&self, asset: Currency) -> Result<GasQuotes, NetworkError>;
}

/// Runtime feature gating.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeatureFlagService: Send + Sync {
    /// Whether the given flag is on for this user/session.
    async fn is_enabled(&self, flag: FeatureFlag) -> bool;
}

/// Remote authority for per-trade limits.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeLimitsRepository: Send + Sync {
    /// Fetch trade limits denominated in `currency`.
    async fn fetch_trade_limits(
        &self,
        currency: Currency,
        product: LimitsProduct,
    ) -> Result<TradeLimits, NetworkError>;
}

/// Remote authority for cross-border (KYC-tier) limits.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrossBorderLimitsRepository: Send + Sync {
    /// Fetch cross-border limits for a source/destination pair,
    /// denominated in `limits_currency`.
    async fn fetch_cross_border_limits(
        &self,
        source: LimitsAccount,
        destination: LimitsAccount,
        limits_currency: Currency,
    ) -> Result<CrossBorderLimits, NetworkError>;
}

/// Opaque custodial transfer capability: fee schedule plus execution.
///
/// Signing and broadcast mechanics live behind this boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Current withdrawal fee schedule for `asset`.
    async fn fees(&self, asset: Currency) -> Result<TransferFees, NetworkError>;

    /// Execute the transfer, returning the resulting transaction hash.
    ///
    /// `reference` is an idempotency key: retrying with the same reference
    /// must not double-spend.
    #[cfg_attr(test, mockall::concretize)]
    async fn transfer(
        &self,
        reference: uuid::Uuid,
        amount: MoneyValue,
        destination: &str,
        memo: Option<&str>,
    ) -> Result<String, NetworkError>;
}

/// Opaque on-chain submission capability for account-model assets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OnChainTransactionClient: Send + Sync {
    /// Sign and broadcast, returning the transaction hash.
    async fn submit(
        &self,
        amount: MoneyValue,
        destination: &str,
        fee: MoneyValue,
    ) -> Result<String, NetworkError>;
}
