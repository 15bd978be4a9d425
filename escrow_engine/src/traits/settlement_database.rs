use chrono::{DateTime, Utc};

use crate::{
    db_types::{LocationSample, Party, Transaction, TransactionHistoryEntry, TransactionId, TransactionRecord},
    helpers::ProximityResult,
    traits::SettlementError,
};

/// Storage for transactions and their audit history.
///
/// Methods that change a transaction's status are compare-and-swap operations on the current status. If the
/// transaction is not in the expected source status, they fail with [`SettlementError::InvalidTransition`] (or
/// [`SettlementError::OperationNotAllowed`] for non-transition updates) and change nothing. Every status change is
/// written to the history table in the same database transaction as the change itself.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new transaction in `pending`.
    async fn insert_transaction(&self, record: TransactionRecord) -> Result<Transaction, SettlementError>;

    async fn fetch_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, SettlementError>;

    /// The audit trail for the transaction, oldest first.
    async fn fetch_transaction_history(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<TransactionHistoryEntry>, SettlementError>;

    /// How many of the seller's transactions have ever been paid. Feeds the fund-hold policy.
    async fn count_paid_transactions_for_seller(&self, seller_id: &str) -> Result<i64, SettlementError>;

    /// `pending → paid`, stamping `paid_at` and `funds_release_at`.
    async fn mark_transaction_paid(
        &self,
        id: &TransactionId,
        paid_at: DateTime<Utc>,
        funds_release_at: DateTime<Utc>,
    ) -> Result<Transaction, SettlementError>;

    /// Replaces the party's location snapshot. Only allowed while the transaction is `paid`.
    async fn save_location(
        &self,
        id: &TransactionId,
        party: Party,
        sample: &LocationSample,
        updated_at: DateTime<Utc>,
    ) -> Result<Transaction, SettlementError>;

    /// Records an unsuccessful proximity check in the history without changing state.
    async fn record_proximity_check(
        &self,
        id: &TransactionId,
        requested_by: Party,
        result: &ProximityResult,
        checked_at: DateTime<Utc>,
    ) -> Result<(), SettlementError>;

    /// `paid → delivered_pending_confirmation`, recording the successful proximity result.
    async fn mark_transaction_delivered(
        &self,
        id: &TransactionId,
        requested_by: Party,
        result: &ProximityResult,
        verified_at: DateTime<Utc>,
    ) -> Result<Transaction, SettlementError>;

    /// Sets the party's completion flag. If that leaves both flags set, the transaction moves to `completed` in the
    /// same database transaction. Only allowed in `delivered_pending_confirmation`.
    async fn confirm_completion(
        &self,
        id: &TransactionId,
        party: Party,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Transaction, SettlementError>;

    /// `delivered_pending_confirmation → completed`. Fails unless both parties have confirmed.
    async fn complete_transaction(
        &self,
        id: &TransactionId,
        completed_at: DateTime<Utc>,
    ) -> Result<Transaction, SettlementError>;
}
