use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{
        AuthorRole,
        Cents,
        Decision,
        Dispute,
        DisputeId,
        DisputeMessage,
        DisputeReason,
        DisputeStatus,
        NewDispute,
        Party,
        Priority,
        Resolution,
        Transaction,
        TransactionId,
        TransactionStatus,
    },
    events::{
        DisputeOpenedEvent,
        DisputeResolvedEvent,
        EventProducers,
        TransactionCompletedEvent,
        TransactionRefundedEvent,
    },
    helpers::{Clock, SystemClock},
    settlement_api::SettlementConfig,
    traits::{DisputeManagement, DisputeUpdate, NewDisputeMessage, SettlementDatabase, SettlementError},
};

/// A staff decision on a dispute that is under review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisputeDecision {
    pub decision: Decision,
    /// Only meaningful for [`Decision::BuyerFavor`]. Defaults to the full amount charged.
    pub refund_amount: Option<Cents>,
    pub reason: String,
    pub resolver_id: String,
}

impl DisputeDecision {
    pub fn new<S: Into<String>>(decision: Decision, reason: S, resolver_id: S) -> Self {
        Self { decision, refund_amount: None, reason: reason.into(), resolver_id: resolver_id.into() }
    }

    pub fn with_refund(mut self, amount: Cents) -> Self {
        self.refund_amount = Some(amount);
        self
    }
}

/// `DisputeApi` freezes transactions when a party raises a problem and settles them once staff have reviewed it.
pub struct DisputeApi<B> {
    db: B,
    clock: Arc<dyn Clock>,
    producers: EventProducers,
    dispute_window: chrono::Duration,
}

impl<B> Debug for DisputeApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DisputeApi")
    }
}

impl<B: Clone> Clone for DisputeApi<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            clock: Arc::clone(&self.clock),
            producers: self.producers.clone(),
            dispute_window: self.dispute_window,
        }
    }
}

impl<B> DisputeApi<B> {
    pub fn new(db: B, producers: EventProducers, config: &SettlementConfig) -> Self {
        Self { db, clock: Arc::new(SystemClock), producers, dispute_window: config.dispute_window }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

fn require_text(field: &str, value: &str) -> Result<(), SettlementError> {
    if value.trim().is_empty() {
        return Err(SettlementError::validation(field, "must not be empty"));
    }
    Ok(())
}

impl<B> DisputeApi<B>
where B: SettlementDatabase + DisputeManagement
{
    /// The statuses from which `transaction` may be disputed at `now`. Completed transactions can only be disputed
    /// within the dispute window.
    fn disputable_from(&self, transaction: &Transaction, now: DateTime<Utc>) -> Vec<TransactionStatus> {
        let mut allowed = vec![
            TransactionStatus::Pending,
            TransactionStatus::Paid,
            TransactionStatus::DeliveredPendingConfirmation,
        ];
        let in_window = transaction.completed_at.map(|t| now <= t + self.dispute_window).unwrap_or(false);
        if in_window {
            allowed.push(TransactionStatus::Completed);
        }
        allowed
    }

    /// Opens a dispute against a transaction and freezes it in `disputed`.
    ///
    /// The initiator must be the buyer or the seller. The dispute's priority is derived from its reason.
    pub async fn open_dispute(
        &self,
        transaction_id: &TransactionId,
        initiator_id: &str,
        reason: DisputeReason,
        description: &str,
    ) -> Result<Dispute, SettlementError> {
        let transaction = self
            .db
            .fetch_transaction(transaction_id)
            .await?
            .ok_or_else(|| SettlementError::TransactionNotFound(transaction_id.clone()))?;
        if transaction.party_of(initiator_id).is_none() {
            return Err(SettlementError::NotAParty(initiator_id.to_string(), transaction_id.clone()));
        }
        require_text("description", description)?;
        if let Some(open) = self.db.fetch_open_dispute_for_transaction(transaction_id).await? {
            return Err(SettlementError::DisputeAlreadyOpen(transaction_id.clone(), open.id));
        }
        let now = self.now();
        let allowed = self.disputable_from(&transaction, now);
        if !allowed.contains(&transaction.status) {
            return Err(SettlementError::InvalidTransition {
                from: transaction.status,
                to: TransactionStatus::Disputed,
            });
        }
        let new_dispute = NewDispute {
            id: DisputeId::generate(),
            transaction_id: transaction_id.clone(),
            initiator_id: initiator_id.to_string(),
            reason,
            description: description.trim().to_string(),
            priority: reason.default_priority(),
            created_at: now,
        };
        let (dispute, _) = self.db.open_dispute(new_dispute, &allowed).await?;
        info!(
            "⚖️ Dispute {} ({}, {} priority) opened on transaction {transaction_id} by {initiator_id}",
            dispute.id, dispute.reason, dispute.priority
        );
        self.producers.publish_dispute_opened(DisputeOpenedEvent::new(dispute.clone())).await;
        Ok(dispute)
    }

    /// Appends a message to the dispute thread. Buyers and sellers may only post as themselves; staff may always post.
    pub async fn add_message(
        &self,
        dispute_id: &DisputeId,
        author_id: &str,
        role: AuthorRole,
        body: &str,
    ) -> Result<DisputeMessage, SettlementError> {
        require_text("author_id", author_id)?;
        require_text("body", body)?;
        let dispute = self.dispute(dispute_id).await?;
        let expected = match role {
            AuthorRole::Buyer => Some(Party::Buyer),
            AuthorRole::Seller => Some(Party::Seller),
            AuthorRole::Staff => None,
        };
        if let Some(party) = expected {
            let transaction = self
                .db
                .fetch_transaction(&dispute.transaction_id)
                .await?
                .ok_or_else(|| SettlementError::TransactionNotFound(dispute.transaction_id.clone()))?;
            if transaction.party_of(author_id) != Some(party) {
                return Err(SettlementError::NotAParty(author_id.to_string(), dispute.transaction_id));
            }
        }
        let message = NewDisputeMessage {
            dispute_id: dispute_id.clone(),
            author_id: author_id.to_string(),
            author_role: role,
            body: body.trim().to_string(),
            created_at: self.now(),
        };
        let message = self.db.insert_dispute_message(message).await?;
        debug!("⚖️ {role} {author_id} posted on dispute {dispute_id}");
        Ok(message)
    }

    /// `open | escalated → under_review`, assigning the dispute to a staff member.
    pub async fn start_review(&self, dispute_id: &DisputeId, assignee_id: &str) -> Result<Dispute, SettlementError> {
        require_text("assignee_id", assignee_id)?;
        let update =
            DisputeUpdate::new(&[DisputeStatus::Open, DisputeStatus::Escalated], DisputeStatus::UnderReview, self.now())
                .with_assignee(assignee_id.trim());
        let dispute = self.db.update_dispute_status(dispute_id, update).await?;
        info!("⚖️ Dispute {dispute_id} is under review by {assignee_id}");
        Ok(dispute)
    }

    /// `open | under_review → escalated`. Escalated disputes are always urgent.
    pub async fn escalate(&self, dispute_id: &DisputeId) -> Result<Dispute, SettlementError> {
        let update =
            DisputeUpdate::new(&[DisputeStatus::Open, DisputeStatus::UnderReview], DisputeStatus::Escalated, self.now())
                .with_priority(Priority::Urgent);
        let dispute = self.db.update_dispute_status(dispute_id, update).await?;
        warn!("⚖️ Dispute {dispute_id} has been escalated");
        Ok(dispute)
    }

    /// Resolves a dispute that is under review and settles its transaction: `refunded` for a buyer-favour decision,
    /// `completed` otherwise.
    pub async fn resolve_dispute(
        &self,
        dispute_id: &DisputeId,
        decision: DisputeDecision,
    ) -> Result<(Dispute, Transaction), SettlementError> {
        require_text("reason", &decision.reason)?;
        require_text("resolver_id", &decision.resolver_id)?;
        let dispute = self.dispute(dispute_id).await?;
        if dispute.status != DisputeStatus::UnderReview {
            return Err(SettlementError::InvalidDisputeTransition { from: dispute.status, to: DisputeStatus::Resolved });
        }
        let transaction = self
            .db
            .fetch_transaction(&dispute.transaction_id)
            .await?
            .ok_or_else(|| SettlementError::TransactionNotFound(dispute.transaction_id.clone()))?;
        let refund_amount = match (decision.decision, decision.refund_amount) {
            (Decision::BuyerFavor, requested) => {
                let total = transaction.total_charge();
                let refund = requested.unwrap_or(total);
                if !refund.is_positive() || refund > total {
                    return Err(SettlementError::validation(
                        "refund_amount",
                        format!("must be more than zero and no more than the total charge of {total}"),
                    ));
                }
                Some(refund)
            },
            (_, Some(_)) => {
                return Err(SettlementError::validation("refund_amount", "only a buyer-favour decision can refund"));
            },
            (_, None) => None,
        };
        let resolution = Resolution {
            decision: decision.decision,
            refund_amount,
            reason: decision.reason.trim().to_string(),
            resolver_id: decision.resolver_id.trim().to_string(),
            resolved_at: self.now(),
        };
        let (dispute, transaction) = self.db.resolve_dispute(dispute_id, resolution).await?;
        info!("⚖️ Dispute {dispute_id} resolved. Transaction {} is {}", transaction.id, transaction.status);
        self.producers.publish_dispute_resolved(DisputeResolvedEvent::new(dispute.clone())).await;
        match transaction.status {
            TransactionStatus::Refunded => {
                self.producers.publish_transaction_refunded(TransactionRefundedEvent::new(transaction.clone())).await
            },
            _ => {
                self.producers.publish_transaction_completed(TransactionCompletedEvent::new(transaction.clone())).await
            },
        }
        Ok((dispute, transaction))
    }

    /// `resolved → closed`. Closing a closed dispute succeeds and changes nothing.
    pub async fn close_dispute(&self, dispute_id: &DisputeId) -> Result<Dispute, SettlementError> {
        let dispute = self.db.close_dispute(dispute_id, self.now()).await?;
        debug!("⚖️ Dispute {dispute_id} is closed");
        Ok(dispute)
    }

    pub async fn dispute(&self, dispute_id: &DisputeId) -> Result<Dispute, SettlementError> {
        self.db.fetch_dispute(dispute_id).await?.ok_or_else(|| SettlementError::DisputeNotFound(dispute_id.clone()))
    }

    /// The dispute thread, oldest first.
    pub async fn messages(&self, dispute_id: &DisputeId) -> Result<Vec<DisputeMessage>, SettlementError> {
        let _ = self.dispute(dispute_id).await?;
        self.db.fetch_dispute_messages(dispute_id).await
    }

    pub async fn disputes_for_transaction(&self, id: &TransactionId) -> Result<Vec<Dispute>, SettlementError> {
        self.db.fetch_disputes_for_transaction(id).await
    }
}
