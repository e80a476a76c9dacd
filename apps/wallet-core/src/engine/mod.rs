//! The polymorphic transaction engine contract.
//!
//! One engine implementation exists per asset family; the processor drives
//! whichever engine the factory selected through the shared state machine:
//!
//! `Uninitialized → (initialize) → CanExecute | validation error ⇄ (update
//! amount / options) ⇄ (validate) → executing → hashed success | terminal
//! error`
//!
//! The machine is re-entrant: every amount or option edit returns to the
//! validation step, never straight to execution.

mod confirmation;
mod custodial;
mod factory;
mod fee;
mod pending;
mod token_on_chain;
mod validation;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{Currency, MoneyError, MoneyValue};
use crate::limits::LimitsError;
use crate::ports::{ConversionError, NetworkError};

pub use confirmation::{Confirmation, ConfirmationKind};
pub use custodial::CustodialTransferEngine;
pub use factory::{SourceAccount, TransactionAction, TransactionEngineFactory, TransferTarget};
pub use fee::{FeeLevel, FeeSelection, FeeState, custom_fee_state};
pub use pending::{EngineStateKey, EngineStateValue, PendingTransaction};
pub use token_on_chain::TokenOnChainEngine;
pub use validation::TransactionValidationState;

/// Recoverable failure inside an engine operation.
///
/// These are data-fetch failures, not validation outcomes: validation
/// outcomes travel inside [`PendingTransaction::validation_state`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// A balance, fee or broadcast service failed.
    #[error(transparent)]
    Network(#[from] NetworkError),
    /// The limits resolver failed.
    #[error(transparent)]
    Limits(#[from] LimitsError),
    /// A conversion rate could not be fetched.
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    /// Money arithmetic crossed currencies; indicates a wiring bug caught
    /// at runtime in release builds.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// The outcome of a successful execution.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionResult {
    /// The transaction was broadcast and identified by a hash.
    Hashed {
        /// The transaction hash.
        tx_hash: String,
        /// The executed amount, when known.
        amount: Option<MoneyValue>,
    },
    /// The transaction settled without a user-visible hash.
    Unhashed {
        /// The executed amount.
        amount: MoneyValue,
    },
}

impl TransactionResult {
    /// The transaction hash, when one exists.
    #[must_use]
    pub fn hash(&self) -> Option<&str> {
        match self {
            Self::Hashed { tx_hash, .. } => Some(tx_hash),
            Self::Unhashed { .. } => None,
        }
    }
}

/// Handle an engine uses to ask the processor for a confirmations refresh.
///
/// This is how server-push-like events (an expiring quote, a fee bump)
/// re-enter the otherwise pull-based pipeline without the engine holding a
/// reference back to the processor.
#[derive(Debug, Clone)]
pub struct RefreshConfirmationsHandle {
    sender: mpsc::UnboundedSender<bool>,
}

impl RefreshConfirmationsHandle {
    /// Create a handle and the receiver the processor drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<bool>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Ask for a refresh; `revalidate` additionally re-runs validation.
    pub fn request(&self, revalidate: bool) {
        // A dropped processor just means nobody cares anymore.
        let _ = self.sender.send(revalidate);
    }
}

/// A transaction engine for one asset family.
///
/// All state flows through the [`PendingTransaction`] passed in and
/// returned; engines hold services, not transaction state. Methods that
/// touch the network are `async`; everything is safe to call concurrently
/// for different transactions.
#[async_trait]
pub trait TransactionEngine: Send + Sync {
    /// The currency of the funding account.
    fn source_asset(&self) -> Currency;

    /// Whether amounts may be entered in fiat for this engine.
    fn can_transact_fiat(&self) -> bool {
        false
    }

    /// Whether execution requires the wallet's second password.
    fn require_second_password(&self) -> bool {
        false
    }

    /// Defensive wiring check: source and target types must be compatible
    /// with this engine.
    ///
    /// # Panics
    ///
    /// Panics on violation; this guards engine selection bugs, it is never
    /// user-facing validation.
    fn assert_inputs_valid(&self);

    /// Receive the processor's refresh handle. Engines that never push
    /// refreshes keep the default no-op.
    fn start(&self, _refresh: RefreshConfirmationsHandle) {}

    /// Build the zero-amount starting point, fetching initial balance and
    /// limits.
    async fn initialize_transaction(&self) -> Result<PendingTransaction, EngineError>;

    /// Recompute `available` and both fee figures for a new candidate
    /// amount. Fee quotes are re-fetched or taken from a still-fresh
    /// cache; the previous quote is never assumed valid.
    async fn update(
        &self,
        amount: MoneyValue,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError>;

    /// Validate the amount against limits and balances, setting the
    /// validation state.
    async fn validate_amount(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError>;

    /// Synthesize the confirmation list from current state. Pure and
    /// idempotent; safe to call repeatedly.
    async fn do_build_confirmations(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError>;

    /// Apply one confirmation edit. The default replaces the matching kind
    /// in the confirmations list.
    async fn do_option_update_request(
        &self,
        pending: PendingTransaction,
        new_confirmation: Confirmation,
    ) -> Result<PendingTransaction, EngineError> {
        Ok(pending.insert_confirmation(new_confirmation))
    }

    /// Run the full ordered validation chain: amount bounds, then
    /// sufficient funds, then fee/gas sufficiency, then in-flight
    /// transactions, then asset-specific checks. Short-circuits on the
    /// first failure.
    async fn do_validate_all(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError>;

    /// Perform the irreversible submission. Only called with
    /// `validation_state == CanExecute`.
    async fn execute(
        &self,
        pending: PendingTransaction,
        second_password: &str,
    ) -> Result<TransactionResult, EngineError>;

    /// Post-execution hook; balance caches are invalidated here. Failures
    /// are logged, never surfaced over a successful result.
    async fn do_post_execute(&self, _result: &TransactionResult) -> Result<(), EngineError> {
        Ok(())
    }

    /// Apply a fee level change, recomputing amounts as needed.
    async fn do_update_fee_level(
        &self,
        pending: PendingTransaction,
        level: FeeLevel,
        custom_amount: Option<MoneyValue>,
    ) -> Result<PendingTransaction, EngineError>;

    /// Rebuild confirmations after an external signal. Defaults to a
    /// no-op.
    async fn do_refresh_confirmations(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError> {
        Ok(pending)
    }

    /// Hook invoked once confirmations are built and on-display; engines
    /// watching external state (e.g. an expiring quote) start their timers
    /// here. Defaults to a no-op.
    async fn start_confirmations_update(
        &self,
        pending: PendingTransaction,
    ) -> Result<PendingTransaction, EngineError> {
        Ok(pending)
    }

    /// Cancel any in-flight subscriptions; called on flow abandonment.
    async fn stop(&self, _pending: PendingTransaction) {}
}
