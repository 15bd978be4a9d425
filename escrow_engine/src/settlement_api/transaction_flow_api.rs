use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        LocationSample,
        NewTransaction,
        Party,
        Transaction,
        TransactionHistoryEntry,
        TransactionId,
        TransactionRecord,
        TransactionStatus,
    },
    events::{
        EventProducers,
        TransactionCompletedEvent,
        TransactionCreatedEvent,
        TransactionDeliveredEvent,
        TransactionPaidEvent,
    },
    helpers::{check_proximity, Clock, ProximityResult, SystemClock},
    settlement_api::SettlementConfig,
    traits::{PaymentMetadata, PaymentProcessor, SettlementDatabase, SettlementError},
};

/// A freshly created transaction, along with the client secret the buyer's device needs to complete the payment. The
/// secret is handed out once and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedTransaction {
    pub transaction: Transaction,
    pub client_secret: String,
}

/// The outcome of a proximity check.
#[derive(Debug, Clone, PartialEq)]
pub enum ProximityCheck {
    /// The parties were within range. The transaction has moved to `delivered_pending_confirmation`.
    Verified { transaction: Transaction, result: ProximityResult },
    /// Both fixes were usable but the parties were too far apart. Recorded in the history; no state change.
    OutOfRange(ProximityResult),
    /// A location fix was missing or stale, so no distance was computed.
    NotVerified(String),
}

/// `TransactionFlowApi` drives a transaction through its lifecycle: creation with a payment intent, payment
/// confirmation, location reporting, proximity verification and completion.
///
/// Every state change is delegated to the storage backend as a conditional update, so racing callers cannot both win.
pub struct TransactionFlowApi<B, P> {
    db: B,
    processor: Arc<P>,
    clock: Arc<dyn Clock>,
    producers: EventProducers,
    config: SettlementConfig,
}

impl<B, P> Debug for TransactionFlowApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionFlowApi ({:?})", self.config)
    }
}

impl<B: Clone, P> Clone for TransactionFlowApi<B, P> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            processor: Arc::clone(&self.processor),
            clock: Arc::clone(&self.clock),
            producers: self.producers.clone(),
            config: self.config.clone(),
        }
    }
}

impl<B, P> TransactionFlowApi<B, P> {
    pub fn new(db: B, processor: Arc<P>, producers: EventProducers, config: SettlementConfig) -> Self {
        Self { db, processor, clock: Arc::new(SystemClock), producers, config }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl<B, P> TransactionFlowApi<B, P>
where
    B: SettlementDatabase,
    P: PaymentProcessor,
{
    /// Creates a transaction in `pending` and issues a payment intent for the total charge.
    ///
    /// The fee breakdown is computed from the current fee schedule and frozen on the record. Later changes to the
    /// schedule never affect existing transactions.
    pub async fn create_transaction(&self, new_tx: NewTransaction) -> Result<CreatedTransaction, SettlementError> {
        if new_tx.buyer_id.trim().is_empty() {
            return Err(SettlementError::validation("buyer_id", "must not be empty"));
        }
        if new_tx.seller_id.trim().is_empty() {
            return Err(SettlementError::validation("seller_id", "must not be empty"));
        }
        if new_tx.buyer_id == new_tx.seller_id {
            return Err(SettlementError::validation("buyer_id", "a seller cannot buy their own item"));
        }
        let fees = self.config.fees.calculate(new_tx.amount)?;
        let id = TransactionId::generate();
        let metadata = PaymentMetadata {
            transaction_id: id.clone(),
            listing_id: new_tx.listing_id.clone(),
            buyer_id: new_tx.buyer_id.clone(),
            seller_id: new_tx.seller_id.clone(),
        };
        let intent =
            self.processor.create_payment_intent(fees.total_charge, &self.config.currency, &metadata).await.map_err(
                |e| {
                    warn!("💰️ Could not create a payment intent for transaction {id}. {e}");
                    SettlementError::from(e)
                },
            )?;
        let record = TransactionRecord {
            id,
            new_transaction: new_tx,
            fees,
            currency: self.config.currency.clone(),
            payment_intent_id: intent.intent_id,
            created_at: self.now(),
        };
        let transaction = self.db.insert_transaction(record).await?;
        info!(
            "💰️ Transaction {} created. {} charged to {} for listing {}",
            transaction.id, transaction.fees.total_charge, transaction.buyer_id, transaction.listing_id
        );
        self.producers.publish_transaction_created(TransactionCreatedEvent::new(transaction.clone())).await;
        Ok(CreatedTransaction { transaction, client_secret: intent.client_secret })
    }

    /// Asks the payment processor whether the transaction's payment intent has succeeded, and if so moves the
    /// transaction to `paid`.
    ///
    /// The processor is always re-queried; client claims of payment are never trusted. Any status other than
    /// `succeeded` leaves the transaction in `pending`.
    pub async fn confirm_payment(&self, id: &TransactionId) -> Result<Transaction, SettlementError> {
        let transaction = self.transaction(id).await?;
        if transaction.status != TransactionStatus::Pending {
            return Err(SettlementError::InvalidTransition { from: transaction.status, to: TransactionStatus::Paid });
        }
        let status = self.processor.payment_intent_status(&transaction.payment_intent_id).await?;
        if !status.is_succeeded() {
            debug!("💰️ Payment intent for {id} is {status}. The transaction stays pending.");
            return Err(SettlementError::PaymentNotConfirmed(id.clone(), status));
        }
        let prior_paid = self.db.count_paid_transactions_for_seller(&transaction.seller_id).await?;
        let hold = self.config.hold_policy.hold_for(prior_paid);
        let paid_at = self.now();
        let transaction = self.db.mark_transaction_paid(id, paid_at, paid_at + hold).await?;
        info!("💰️ Transaction {id} is paid. Funds are held for {} minutes.", hold.num_minutes());
        self.producers.publish_transaction_paid(TransactionPaidEvent::new(transaction.clone())).await;
        Ok(transaction)
    }

    /// Stores `party`'s latest location fix. Only allowed while the transaction is `paid`.
    pub async fn record_location(
        &self,
        id: &TransactionId,
        party: Party,
        sample: LocationSample,
    ) -> Result<Transaction, SettlementError> {
        let sample = LocationSample::new(sample.point()?, sample.accuracy_m, sample.recorded_at)?;
        let transaction = self.db.save_location(id, party, &sample, self.now()).await?;
        trace!("📍️ Location for the {party} on {id} updated");
        Ok(transaction)
    }

    /// Compares the two parties' latest location fixes.
    ///
    /// Missing or stale fixes give [`ProximityCheck::NotVerified`] and change nothing. A completed check is always
    /// recorded in the transaction history; if the parties are within range the transaction moves to
    /// `delivered_pending_confirmation`.
    pub async fn verify_proximity(
        &self,
        id: &TransactionId,
        requested_by: Party,
    ) -> Result<ProximityCheck, SettlementError> {
        let transaction = self.transaction(id).await?;
        if transaction.status != TransactionStatus::Paid {
            return Err(SettlementError::InvalidTransition {
                from: transaction.status,
                to: TransactionStatus::DeliveredPendingConfirmation,
            });
        }
        let now = self.now();
        let max_age = self.config.location_max_age;
        let mut points = Vec::with_capacity(2);
        for party in [Party::Buyer, Party::Seller] {
            match transaction.location_of(party) {
                None => {
                    return Ok(ProximityCheck::NotVerified(format!("no location has been reported by the {party}")));
                },
                Some(sample) if !sample.is_fresh(now, max_age) => {
                    return Ok(ProximityCheck::NotVerified(format!("the {party}'s location is out of date")));
                },
                Some(sample) => points.push(sample.point()?),
            }
        }
        let result = check_proximity(points[0], points[1], self.config.proximity_radius_m);
        if !result.within_range {
            debug!("📍️ {id}: parties are {:.1} m apart. Not verified.", result.distance_meters);
            self.db.record_proximity_check(id, requested_by, &result, now).await?;
            return Ok(ProximityCheck::OutOfRange(result));
        }
        let transaction = self.db.mark_transaction_delivered(id, requested_by, &result, now).await?;
        info!("📍️ Handoff for {id} verified at {:.1} m", result.distance_meters);
        self.producers.publish_transaction_delivered(TransactionDeliveredEvent::new(transaction.clone())).await;
        Ok(ProximityCheck::Verified { transaction, result })
    }

    /// Records `party`'s confirmation that the handoff is complete. The second confirmation completes the transaction.
    pub async fn confirm_completion(&self, id: &TransactionId, party: Party) -> Result<Transaction, SettlementError> {
        let transaction = self.db.confirm_completion(id, party, self.now()).await?;
        if transaction.status == TransactionStatus::Completed {
            info!("💰️ Both parties confirmed. Transaction {id} is complete.");
            self.producers.publish_transaction_completed(TransactionCompletedEvent::new(transaction.clone())).await;
        } else {
            debug!("💰️ The {party} confirmed completion of {id}");
        }
        Ok(transaction)
    }

    /// Explicitly completes a transaction. Fails unless both parties have confirmed.
    pub async fn complete_transaction(&self, id: &TransactionId) -> Result<Transaction, SettlementError> {
        let transaction = self.db.complete_transaction(id, self.now()).await?;
        info!("💰️ Transaction {id} is complete.");
        self.producers.publish_transaction_completed(TransactionCompletedEvent::new(transaction.clone())).await;
        Ok(transaction)
    }

    pub async fn transaction(&self, id: &TransactionId) -> Result<Transaction, SettlementError> {
        self.db.fetch_transaction(id).await?.ok_or_else(|| SettlementError::TransactionNotFound(id.clone()))
    }

    pub async fn history(&self, id: &TransactionId) -> Result<Vec<TransactionHistoryEntry>, SettlementError> {
        let history = self.db.fetch_transaction_history(id).await?;
        if history.is_empty() {
            // every stored transaction has at least its creation entry
            return Err(SettlementError::TransactionNotFound(id.clone()));
        }
        Ok(history)
    }
}
