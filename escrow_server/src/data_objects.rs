//! Request bodies and response views of the HTTP API.
//!
//! All amounts are integer minor units (cents) and all field names are camelCase.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use escrow_engine::{
    db_types::{
        AuctionTimer,
        AuthorRole,
        Cents,
        Decision,
        Dispute,
        DisputeId,
        DisputeReason,
        FeeBreakdown,
        ListingId,
        NewListing,
        Party,
        Transaction,
        TransactionId,
        TransactionStatus,
    },
    helpers::ProximityResult,
    CreatedTransaction,
    DisputeDecision,
    ProximityCheck,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

//--------------------------------------      Transactions     ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionConfirmed {
    pub buyer: bool,
    pub seller: bool,
}

/// The public face of a [`Transaction`]. Location fixes and the payment intent id stay on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: TransactionId,
    pub listing_id: ListingId,
    pub buyer_id: String,
    pub seller_id: String,
    pub amount: Cents,
    pub flat_fee: Cents,
    pub percentage_fee: Cents,
    pub total_fee: Cents,
    pub total_amount: Cents,
    pub seller_payout: Cents,
    pub currency: String,
    pub status: TransactionStatus,
    pub proximity_verified: bool,
    pub completion_confirmed: CompletionConfirmed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispute_id: Option<DisputeId>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funds_release_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
}

impl From<Transaction> for TransactionView {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            listing_id: tx.listing_id,
            buyer_id: tx.buyer_id,
            seller_id: tx.seller_id,
            amount: tx.amount,
            flat_fee: tx.fees.flat_fee,
            percentage_fee: tx.fees.percentage_fee,
            total_fee: tx.fees.total_fee,
            total_amount: tx.fees.total_charge,
            seller_payout: tx.fees.seller_payout,
            currency: tx.currency,
            status: tx.status,
            proximity_verified: tx.proximity_verified,
            completion_confirmed: CompletionConfirmed { buyer: tx.buyer_confirmed, seller: tx.seller_confirmed },
            dispute_id: tx.dispute_id,
            created_at: tx.created_at,
            paid_at: tx.paid_at,
            funds_release_at: tx.funds_release_at,
            completed_at: tx.completed_at,
            refunded_at: tx.refunded_at,
        }
    }
}

/// Returned once, when a purchase or auction creates a transaction. The buyer's device uses the client secret to pay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTransactionView {
    pub transaction: TransactionView,
    pub client_secret: String,
}

impl From<CreatedTransaction> for CreatedTransactionView {
    fn from(created: CreatedTransaction) -> Self {
        Self { transaction: created.transaction.into(), client_secret: created.client_secret }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationReport {
    pub party: Party,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// When the fix was taken on the device. Proximity checks compare the two parties' fixes by this time, so it is
    /// required.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyRequest {
    pub party: Party,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityView {
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within_range: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionView>,
}

impl ProximityView {
    fn measured(result: ProximityResult) -> Self {
        Self {
            verified: result.within_range,
            distance_meters: Some(result.distance_meters),
            within_range: Some(result.within_range),
            reason: None,
            transaction: None,
        }
    }
}

impl From<ProximityCheck> for ProximityView {
    fn from(check: ProximityCheck) -> Self {
        match check {
            ProximityCheck::Verified { transaction, result } => {
                Self { transaction: Some(transaction.into()), ..Self::measured(result) }
            },
            ProximityCheck::OutOfRange(result) => {
                Self { reason: Some("The buyer and seller are out of range".into()), ..Self::measured(result) }
            },
            ProximityCheck::NotVerified(reason) => Self {
                verified: false,
                distance_meters: None,
                within_range: None,
                reason: Some(reason),
                transaction: None,
            },
        }
    }
}

//--------------------------------------          Fees         ---------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeQuery {
    pub price: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub price: Cents,
    pub flat_fee: Cents,
    pub percentage_fee: Cents,
    pub total_fee: Cents,
    pub total_amount: Cents,
    pub seller_payout: Cents,
    /// Percentage rate in basis points.
    pub rate_bps: i64,
    pub currency: String,
}

impl FeeQuote {
    pub fn new(price: Cents, fees: FeeBreakdown, currency: &str) -> Self {
        Self {
            price,
            flat_fee: fees.flat_fee,
            percentage_fee: fees.percentage_fee,
            total_fee: fees.total_fee,
            total_amount: fees.total_charge,
            seller_payout: fees.seller_payout,
            rate_bps: fees.rate.bps(),
            currency: currency.to_string(),
        }
    }
}

//--------------------------------------   Listings & Auctions  --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListingRequest {
    pub seller_id: String,
    pub title: String,
    pub price: Cents,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location_label: String,
}

impl From<NewListingRequest> for NewListing {
    fn from(req: NewListingRequest) -> Self {
        NewListing::new(req.seller_id, req.title, req.price)
            .with_description(req.description)
            .with_category(req.category)
            .with_location_label(req.location_label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAuctionRequest {
    pub duration_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionStatus {
    pub listing_id: ListingId,
    pub active: bool,
    pub time_left_secs: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<AuctionTimer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRequest {
    pub bidder_id: String,
    pub amount: Cents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub buyer_id: String,
}

//--------------------------------------        Disputes       ---------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDisputeRequest {
    pub initiator_id: String,
    pub reason: DisputeReason,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeMessageRequest {
    pub author_id: String,
    pub author_role: AuthorRole,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub assignee_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveDisputeRequest {
    pub decision: Decision,
    pub reason: String,
    pub resolver_id: String,
    /// Only for `buyer_favor`. Omit to refund the full amount charged.
    #[serde(default)]
    pub refund_amount: Option<Cents>,
}

impl From<ResolveDisputeRequest> for DisputeDecision {
    fn from(req: ResolveDisputeRequest) -> Self {
        let decision = DisputeDecision::new(req.decision, req.reason, req.resolver_id);
        match req.refund_amount {
            Some(amount) => decision.with_refund(amount),
            None => decision,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedDispute {
    pub dispute: Dispute,
    pub transaction: TransactionView,
}
