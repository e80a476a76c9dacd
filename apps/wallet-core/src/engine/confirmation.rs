//! User-facing confirmation rows synthesized by engines.

use serde::{Deserialize, Serialize};

use crate::domain::{Currency, MoneyValue};

use super::fee::FeeSelection;

/// The kind key a confirmation is matched on when inserted or edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationKind {
    /// Where the funds come from.
    Source,
    /// Where the funds go.
    Destination,
    /// The network fee row.
    NetworkFee,
    /// The grand total row.
    Total,
    /// An attached memo.
    Memo,
    /// The fee level selector.
    FeeSelector,
    /// A free-form note.
    Note,
}

/// One row of the confirmation screen.
///
/// Rows are matched by [`ConfirmationKind`], never by index: inserting a
/// row whose kind already exists replaces the old row in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Confirmation {
    /// Label of the funding account.
    Source {
        /// Account display label.
        label: String,
    },
    /// Label of the destination.
    Destination {
        /// Destination display label.
        label: String,
    },
    /// The network fee charged for the transaction.
    NetworkFee {
        /// Fee amount, in the fee currency.
        fee: MoneyValue,
        /// The asset being transacted.
        asset: Currency,
    },
    /// Total debited including fees, in the user's fiat currency.
    Total {
        /// Total amount.
        total: MoneyValue,
    },
    /// Memo attached to the transaction.
    Memo {
        /// The memo text, when entered.
        text: Option<String>,
        /// Whether the destination requires a memo.
        required: bool,
    },
    /// The fee selector state.
    FeeSelector {
        /// The transaction's current fee selection.
        selection: FeeSelection,
    },
    /// A free-form note.
    Note {
        /// Note text.
        text: String,
    },
}

impl Confirmation {
    /// The kind this row is keyed by.
    #[must_use]
    pub const fn kind(&self) -> ConfirmationKind {
        match self {
            Self::Source { .. } => ConfirmationKind::Source,
            Self::Destination { .. } => ConfirmationKind::Destination,
            Self::NetworkFee { .. } => ConfirmationKind::NetworkFee,
            Self::Total { .. } => ConfirmationKind::Total,
            Self::Memo { .. } => ConfirmationKind::Memo,
            Self::FeeSelector { .. } => ConfirmationKind::FeeSelector,
            Self::Note { .. } => ConfirmationKind::Note,
        }
    }
}
