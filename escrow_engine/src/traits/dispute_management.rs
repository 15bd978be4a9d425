use chrono::{DateTime, Utc};

use crate::{
    db_types::{
        Dispute,
        DisputeId,
        DisputeMessage,
        NewDispute,
        Resolution,
        Transaction,
        TransactionId,
        TransactionStatus,
    },
    traits::{DisputeUpdate, NewDisputeMessage, SettlementError},
};

/// Storage for disputes and their message threads.
#[allow(async_fn_in_trait)]
pub trait DisputeManagement: Clone {
    /// In one database transaction: moves the transaction into `disputed` (only if its current status is one of
    /// `allowed_from`), remembers the status it came from, and inserts the dispute in `open`.
    ///
    /// Fails with [`SettlementError::DisputeAlreadyOpen`] if the transaction already has an open dispute, and with
    /// [`SettlementError::InvalidTransition`] if the transaction is in any other disallowed status.
    async fn open_dispute(
        &self,
        dispute: NewDispute,
        allowed_from: &[TransactionStatus],
    ) -> Result<(Dispute, Transaction), SettlementError>;

    async fn fetch_dispute(&self, id: &DisputeId) -> Result<Option<Dispute>, SettlementError>;

    async fn fetch_open_dispute_for_transaction(&self, id: &TransactionId) -> Result<Option<Dispute>, SettlementError>;

    /// All disputes ever filed against the transaction, oldest first.
    async fn fetch_disputes_for_transaction(&self, id: &TransactionId) -> Result<Vec<Dispute>, SettlementError>;

    /// Applies a conditional status change. Fails with [`SettlementError::InvalidDisputeTransition`] if the dispute is
    /// not in one of the update's source statuses.
    async fn update_dispute_status(&self, id: &DisputeId, update: DisputeUpdate) -> Result<Dispute, SettlementError>;

    /// In one database transaction: `under_review → resolved` for the dispute, with the resolution recorded, and
    /// `disputed → decision.outcome()` for its transaction.
    async fn resolve_dispute(
        &self,
        id: &DisputeId,
        resolution: Resolution,
    ) -> Result<(Dispute, Transaction), SettlementError>;

    /// Appends to the dispute thread, unless the dispute is closed.
    async fn insert_dispute_message(&self, message: NewDisputeMessage) -> Result<DisputeMessage, SettlementError>;

    async fn fetch_dispute_messages(&self, id: &DisputeId) -> Result<Vec<DisputeMessage>, SettlementError>;

    /// `resolved → closed`. Closing an already closed dispute returns it unchanged.
    async fn close_dispute(&self, id: &DisputeId, closed_at: DateTime<Utc>) -> Result<Dispute, SettlementError>;
}
