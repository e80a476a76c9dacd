//! The orchestrator that drives an engine through its state machine.

use std::sync::{Arc, Mutex};

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use crate::domain::MoneyValue;
use crate::engine::{
    Confirmation, ConfirmationKind, EngineError, FeeLevel, PendingTransaction,
    RefreshConfirmationsHandle, TransactionEngine, TransactionResult, TransactionValidationState,
};

/// Recoverable failure at the processor boundary.
///
/// Data errors land here as typed values; the pending-transaction stream
/// itself never terminates on them, since a dead stream would strand the
/// UI with no way back short of restarting the flow.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The call does not fit the engine's declared capabilities.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
    /// The edited confirmation kind was never offered by the engine.
    #[error("unsupported confirmation: {0:?}")]
    UnsupportedConfirmation(ConfirmationKind),
    /// Execution was requested from a non-executable state.
    #[error("transaction is not executable: {0:?}")]
    InvalidTransactionState(TransactionValidationState),
    /// The engine failed fetching data.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Capacity of the pending-transaction broadcast. A burst larger than
/// this drops the oldest events for a lagging subscriber; the retained
/// latest value keeps new subscribers correct regardless.
const PENDING_FEED_CAPACITY: usize = 64;

/// Broadcast with a retained last value: new subscribers see the current
/// state immediately, then every subsequent publish.
struct PendingPublisher {
    latest: Mutex<PendingTransaction>,
    changes: broadcast::Sender<PendingTransaction>,
}

impl PendingPublisher {
    fn new(initial: PendingTransaction) -> Self {
        let (changes, _) = broadcast::channel(PENDING_FEED_CAPACITY);
        Self {
            latest: Mutex::new(initial),
            changes,
        }
    }

    fn latest(&self) -> PendingTransaction {
        self.latest.lock().expect("pending lock poisoned").clone()
    }

    fn publish(&self, pending: PendingTransaction) {
        *self.latest.lock().expect("pending lock poisoned") = pending.clone();
        // Send only fails when nobody is subscribed yet.
        let _ = self.changes.send(pending);
    }

    fn stream(&self) -> BoxStream<'static, PendingTransaction> {
        // Subscribe before snapshotting so no publish can fall in between.
        let receiver = self.changes.subscribe();
        let current = self.latest();
        stream::once(future::ready(current))
            .chain(BroadcastStream::new(receiver).filter_map(|event| future::ready(event.ok())))
            .boxed()
    }
}

/// Owns one engine and one continuously-published [`PendingTransaction`].
///
/// Every operation reads the latest published value, computes a new one
/// through the engine, and publishes before returning, so the stream is
/// totally ordered. The processor does not lock around operations: it is
/// designed for a single writer (one control surface) at a time;
/// concurrent writers must be serialized by the caller.
pub struct TransactionProcessor {
    engine: Arc<dyn TransactionEngine>,
    pending: Arc<PendingPublisher>,
    refresh_worker: JoinHandle<()>,
}

impl TransactionProcessor {
    /// Wire a processor around an engine.
    ///
    /// Hands the engine a refresh handle so external signals (expiring
    /// quotes, fee bumps) can re-enter the pipeline, and asserts the
    /// engine's inputs are wired correctly.
    #[must_use]
    pub fn new(engine: Arc<dyn TransactionEngine>) -> Self {
        engine.assert_inputs_valid();

        let pending = Arc::new(PendingPublisher::new(PendingTransaction::zero(
            engine.source_asset(),
        )));
        let (refresh, mut refresh_requests) = RefreshConfirmationsHandle::channel();
        engine.start(refresh);

        let refresh_worker = tokio::spawn({
            let engine = Arc::clone(&engine);
            let pending = Arc::clone(&pending);
            async move {
                while let Some(revalidate) = refresh_requests.recv().await {
                    let current = pending.latest();
                    // Nothing on display yet; nothing to refresh.
                    if current.confirmations().is_empty() {
                        continue;
                    }
                    match engine.do_refresh_confirmations(current).await {
                        Ok(refreshed) => {
                            let published = if revalidate {
                                match engine.do_validate_all(refreshed).await {
                                    Ok(validated) => validated,
                                    Err(error) => {
                                        tracing::warn!(%error, "revalidation after refresh failed");
                                        continue;
                                    }
                                }
                            } else {
                                refreshed
                            };
                            pending.publish(published);
                        }
                        Err(error) => {
                            tracing::warn!(%error, "confirmation refresh failed");
                        }
                    }
                }
            }
        });

        Self {
            engine,
            pending,
            refresh_worker,
        }
    }

    /// Whether amounts may be entered in fiat.
    #[must_use]
    pub fn can_transact_fiat(&self) -> bool {
        self.engine.can_transact_fiat()
    }

    /// The ongoing pending-transaction stream: the latest published state
    /// first, then every later mutation.
    #[must_use]
    pub fn pending_transaction_stream(&self) -> BoxStream<'static, PendingTransaction> {
        self.pending.stream()
    }

    /// Initialize the transaction and return the ongoing stream, so the
    /// first event is the initial state and subsequent events are all
    /// later mutations — one subscription point for the whole lifecycle.
    ///
    /// # Errors
    ///
    /// Propagates engine initialization failures.
    pub async fn initialize_transaction(
        &self,
    ) -> Result<BoxStream<'static, PendingTransaction>, ProcessorError> {
        let initialized = self.engine.initialize_transaction().await?;
        self.publish(initialized);
        Ok(self.pending_transaction_stream())
    }

    /// Apply a new candidate amount, then validate it.
    ///
    /// A zero amount entered while the transaction is still uninitialized
    /// keeps it uninitialized instead of surfacing a premature
    /// "insufficient funds" on first screen load.
    ///
    /// # Errors
    ///
    /// Fails fast when the amount's fiat/crypto kind is incompatible with
    /// the engine; propagates engine failures.
    pub async fn update_amount(&self, amount: MoneyValue) -> Result<(), ProcessorError> {
        if amount.currency().is_fiat() && !self.engine.can_transact_fiat() {
            return Err(ProcessorError::IllegalState(
                "engine cannot transact fiat amounts",
            ));
        }

        let current = self.latest();
        let was_fresh = current.validation_state.is_uninitialized();

        let updated = self.engine.update(amount, current).await?;
        let mut validated = self.engine.validate_amount(updated).await?;
        if was_fresh
            && validated.amount.is_zero()
            && !validated.validation_state.is_can_execute()
        {
            // Remove the initial warning before the user has typed anything.
            validated = validated.with_validation_state(TransactionValidationState::Uninitialized);
        }
        self.publish(validated);
        Ok(())
    }

    /// Apply one confirmation edit, then re-run full validation.
    ///
    /// # Errors
    ///
    /// Fails when the confirmation kind was never offered — an option the
    /// engine did not surface cannot be edited.
    pub async fn set_confirmation(&self, confirmation: Confirmation) -> Result<(), ProcessorError> {
        let current = self.latest();
        if !current
            .confirmations()
            .iter()
            .any(|offered| offered.kind() == confirmation.kind())
        {
            return Err(ProcessorError::UnsupportedConfirmation(confirmation.kind()));
        }

        let updated = self
            .engine
            .do_option_update_request(current, confirmation)
            .await?;
        let validated = self.engine.do_validate_all(updated).await?;
        self.publish(validated);
        Ok(())
    }

    /// Build confirmations, validate, then start confirmation updates,
    /// publishing after every step so a UI watching the stream sees the
    /// confirmations appear before validation completes.
    ///
    /// # Errors
    ///
    /// Propagates engine failures.
    pub async fn validate_all(&self) -> Result<(), ProcessorError> {
        let current = self.latest();
        let built = self.engine.do_build_confirmations(current).await?;
        self.publish(built.clone());

        let validated = self.engine.do_validate_all(built).await?;
        self.publish(validated.clone());

        let watched = self.engine.start_confirmations_update(validated).await?;
        self.publish(watched);
        Ok(())
    }

    /// Switch the fee level.
    ///
    /// # Errors
    ///
    /// Propagates engine failures.
    ///
    /// # Panics
    ///
    /// Panics when the level is not in the available set; the UI offering
    /// an unavailable level is a wiring bug.
    pub async fn update_fee_level(
        &self,
        level: FeeLevel,
        custom_amount: Option<MoneyValue>,
    ) -> Result<(), ProcessorError> {
        let current = self.latest();
        assert!(
            current.fee_selection.available_levels().contains(&level),
            "fee level {level:?} is not available for this transaction"
        );
        let updated = self
            .engine
            .do_update_fee_level(current, level, custom_amount)
            .await?;
        self.publish(updated);
        Ok(())
    }

    /// Execute the transaction.
    ///
    /// Validation re-runs as a final gate against a stale state from a
    /// racing background refresh; execution proceeds only from
    /// `CanExecute`. Once started, execution always runs to completion or
    /// hard failure; there is no mid-flight abort.
    ///
    /// # Errors
    ///
    /// [`ProcessorError::InvalidTransactionState`] when the final
    /// validation does not land on `CanExecute`; engine failures
    /// otherwise.
    ///
    /// # Panics
    ///
    /// Panics when the engine requires a second password and none was
    /// supplied.
    pub async fn execute(&self, second_password: &str) -> Result<TransactionResult, ProcessorError> {
        assert!(
            !(self.engine.require_second_password() && second_password.is_empty()),
            "second password required but not supplied"
        );

        let current = self.latest();
        let validated = self.engine.do_validate_all(current).await?;
        if !validated.validation_state.is_can_execute() {
            return Err(ProcessorError::InvalidTransactionState(
                validated.validation_state,
            ));
        }

        let result = self.engine.execute(validated, second_password).await?;
        if let Err(error) = self.engine.do_post_execute(&result).await {
            // The transaction is already on the wire; a failed hook must
            // not fail the result.
            tracing::warn!(%error, "post-execute hook failed");
        }
        Ok(result)
    }

    /// Abandon the flow: let the engine cancel its subscriptions.
    ///
    /// This does not abort an in-flight [`TransactionProcessor::execute`].
    pub async fn reset(&self) {
        self.engine.stop(self.latest()).await;
    }

    fn latest(&self) -> PendingTransaction {
        self.pending.latest()
    }

    fn publish(&self, pending: PendingTransaction) {
        self.pending.publish(pending);
    }
}

impl Drop for TransactionProcessor {
    fn drop(&mut self) {
        self.refresh_worker.abort();
    }
}
