// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Wallet Core - Transaction Processing Library
//!
//! The engine room of the wallet: turns a user's intent ("send X of asset
//! A to target T") into a fully validated, fee-aware, limit-checked
//! transaction ready for broadcast.
//!
//! # Architecture
//!
//! Leaves first:
//!
//! - **`cache`**: generic value cache with staleness tagging, per-key
//!   fetch de-duplication and a return-stale-then-refresh streaming
//!   policy. Depends on nothing else in the crate.
//! - **`limits`**: merges per-trade limits and per-user cross-border
//!   limits into one [`limits::TransactionLimits`], converting currencies
//!   with a single live rate.
//! - **`engine`**: the polymorphic [`engine::TransactionEngine`] contract
//!   plus one concrete engine per asset family, selected by
//!   [`engine::TransactionEngineFactory`].
//! - **`processor`**: the orchestrator owning one
//!   [`engine::PendingTransaction`] stream, driving an engine through
//!   initialize → amend → validate → execute.
//!
//! Everything that touches the network is consumed through the async
//! contracts in [`ports`] and implemented per backend outside this crate.
//! There is no signing or broadcast cryptography here: engines invoke an
//! opaque transfer capability and relay its result.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod config;
pub mod domain;
pub mod engine;
pub mod limits;
pub mod ports;
pub mod processor;

pub use cache::{CacheValue, CachedValueSource, FlushBus, FlushNotification, InMemoryCache};
pub use config::{ConfigError, WalletCoreConfig, load_config_from_str};
pub use domain::{Currency, ExchangeRate, MoneyError, MoneyValue};
pub use engine::{
    Confirmation, ConfirmationKind, CustodialTransferEngine, EngineError, FeeLevel, FeeSelection,
    PendingTransaction, SourceAccount, TokenOnChainEngine, TransactionAction, TransactionEngine,
    TransactionEngineFactory, TransactionResult, TransactionValidationState, TransferTarget,
};
pub use limits::{LimitsAccount, LimitsAccountType, LimitsError, LimitsResolver, TransactionLimits};
pub use processor::{ProcessorError, TransactionProcessor};
