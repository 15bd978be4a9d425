use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
pub use escrow_common::{Cents, FeeRate};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use uuid::Uuid;

pub use crate::helpers::proximity::LocationSample;

/// The single source of fresh entity identifiers. Every id in the system is a v4 UUID in its hyphenated string form.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn generate() -> Self {
                Self(new_id())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_type!(ListingId);
id_type!(BidId);
id_type!(TimerId);
id_type!(TransactionId);
id_type!(DisputeId);

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

/// Generates `Display` and `FromStr` for the status-like enums, using the same snake_case labels that sqlx and serde
/// use.
macro_rules! labelled_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(Self::$variant),)+
                    s => Err(ConversionError(format!("{s} is not a valid {}", stringify!($name)))),
                }
            }
        }
    };
}

//--------------------------------------   TransactionStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created with its fee breakdown. No money has moved.
    Pending,
    /// The processor has confirmed the payment intent. Awaiting the physical handoff.
    Paid,
    /// A proximity check succeeded. Awaiting both parties' completion confirmations.
    DeliveredPendingConfirmation,
    /// Both parties confirmed, or a dispute was resolved without fault or in the seller's favour.
    Completed,
    /// Frozen by an open dispute.
    Disputed,
    /// A dispute was resolved in the buyer's favour.
    Refunded,
}

labelled_enum!(TransactionStatus {
    Pending => "pending",
    Paid => "paid",
    DeliveredPendingConfirmation => "delivered_pending_confirmation",
    Completed => "completed",
    Disputed => "disputed",
    Refunded => "refunded",
});

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Refunded)
    }

    /// The transaction lifecycle.
    ///
    /// | From \ To   | Paid | Delivered | Completed | Disputed | Refunded |
    /// |-------------|------|-----------|-----------|----------|----------|
    /// | Pending     | ✓    |           |           | ✓        |          |
    /// | Paid        |      | ✓         |           | ✓        |          |
    /// | Delivered   |      |           | ✓         | ✓        |          |
    /// | Completed   |      |           |           | (1)      |          |
    /// | Disputed    |      |           | ✓         |          | ✓        |
    /// | Refunded    |      |           |           |          |          |
    ///
    /// (1) Only inside the post-completion dispute window. The window is a policy decision and is checked by the
    /// dispute API, so this table allows it unconditionally.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (*self, next),
            (Pending, Paid) |
                (Paid, DeliveredPendingConfirmation) |
                (DeliveredPendingConfirmation, Completed) |
                (Disputed, Completed) |
                (Disputed, Refunded) |
                (Pending | Paid | DeliveredPendingConfirmation | Completed, Disputed)
        )
    }
}

//--------------------------------------     ListingStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Sold,
    Removed,
}

labelled_enum!(ListingStatus { Active => "active", Sold => "sold", Removed => "removed" });

//--------------------------------------      TimerStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Active,
    Expired,
    Cancelled,
}

labelled_enum!(TimerStatus { Active => "active", Expired => "expired", Cancelled => "cancelled" });

//--------------------------------------     DisputeStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
    Closed,
    Escalated,
}

labelled_enum!(DisputeStatus {
    Open => "open",
    UnderReview => "under_review",
    Resolved => "resolved",
    Closed => "closed",
    Escalated => "escalated",
});

impl DisputeStatus {
    /// Statuses that still hold the transaction frozen. A transaction has at most one dispute in one of these.
    pub const OPEN_STATUSES: [DisputeStatus; 3] =
        [DisputeStatus::Open, DisputeStatus::UnderReview, DisputeStatus::Escalated];

    pub fn is_open(&self) -> bool {
        Self::OPEN_STATUSES.contains(self)
    }

    pub fn can_transition_to(&self, next: DisputeStatus) -> bool {
        use DisputeStatus::*;
        matches!(
            (*self, next),
            (Open, UnderReview) | (Open, Escalated) | (Escalated, UnderReview) | (UnderReview, Escalated) |
                (UnderReview, Resolved) | (Resolved, Closed)
        )
    }
}

//--------------------------------------     DisputeReason     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisputeReason {
    ItemNotReceived,
    ItemNotAsDescribed,
    ItemDamaged,
    PaymentIssue,
    Fraud,
    Other,
}

labelled_enum!(DisputeReason {
    ItemNotReceived => "item_not_received",
    ItemNotAsDescribed => "item_not_as_described",
    ItemDamaged => "item_damaged",
    PaymentIssue => "payment_issue",
    Fraud => "fraud",
    Other => "other",
});

impl DisputeReason {
    /// Triage priority assigned when a dispute is opened.
    pub fn default_priority(&self) -> Priority {
        match self {
            Self::Fraud => Priority::Urgent,
            Self::ItemNotReceived | Self::PaymentIssue => Priority::High,
            Self::ItemNotAsDescribed | Self::ItemDamaged => Priority::Medium,
            Self::Other => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

labelled_enum!(Priority { Low => "low", Medium => "medium", High => "high", Urgent => "urgent" });

//--------------------------------------        Decision       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    BuyerFavor,
    SellerFavor,
    NoFault,
}

labelled_enum!(Decision { BuyerFavor => "buyer_favor", SellerFavor => "seller_favor", NoFault => "no_fault" });

impl Decision {
    /// The terminal transaction status that a resolution with this decision produces.
    pub fn outcome(&self) -> TransactionStatus {
        match self {
            Self::BuyerFavor => TransactionStatus::Refunded,
            Self::SellerFavor | Self::NoFault => TransactionStatus::Completed,
        }
    }
}

//--------------------------------------     Party / Roles     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Buyer,
    Seller,
}

labelled_enum!(Party { Buyer => "buyer", Seller => "seller" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthorRole {
    Buyer,
    Seller,
    Staff,
}

labelled_enum!(AuthorRole { Buyer => "buyer", Seller => "seller", Staff => "staff" });

//--------------------------------------        Listing        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: ListingId,
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub price: Cents,
    pub category: String,
    pub location_label: String,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewListing {
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub price: Cents,
    pub category: String,
    pub location_label: String,
}

impl NewListing {
    pub fn new<S: Into<String>>(seller_id: S, title: S, price: Cents) -> Self {
        Self {
            seller_id: seller_id.into(),
            title: title.into(),
            description: String::default(),
            price,
            category: "general".to_string(),
            location_label: String::default(),
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category<S: Into<String>>(mut self, category: S) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_location_label<S: Into<String>>(mut self, label: S) -> Self {
        self.location_label = label.into();
        self
    }
}

//--------------------------------------          Bid          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: BidId,
    pub listing_id: ListingId,
    pub bidder_id: String,
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      AuctionTimer     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionTimer {
    pub id: TimerId,
    pub listing_id: ListingId,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: TimerStatus,
    pub closed_at: Option<DateTime<Utc>>,
}

impl AuctionTimer {
    /// Time remaining at `now`. Always derived from the persisted end time, never from elapsed deltas.
    pub fn time_left(&self, now: DateTime<Utc>) -> Duration {
        if self.status != TimerStatus::Active {
            return Duration::zero();
        }
        (self.ends_at - now).max(Duration::zero())
    }

    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.status == TimerStatus::Active && self.ends_at > now
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TimerStatus::Active && self.ends_at <= now
    }
}

//--------------------------------------      FeeBreakdown     ---------------------------------------------------------
/// The fee numbers fixed at transaction creation.
///
/// `total_charge = amount + flat_fee + percentage_fee` and `seller_payout = amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub flat_fee: Cents,
    pub percentage_fee: Cents,
    pub total_fee: Cents,
    pub total_charge: Cents,
    pub seller_payout: Cents,
    pub rate: FeeRate,
}

//--------------------------------------      Transaction      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub listing_id: ListingId,
    pub buyer_id: String,
    pub seller_id: String,
    /// The item price
    pub amount: Cents,
    pub fees: FeeBreakdown,
    pub currency: String,
    pub payment_intent_id: String,
    pub status: TransactionStatus,
    pub proximity_verified: bool,
    pub proximity_distance_m: Option<f64>,
    pub proximity_verified_at: Option<DateTime<Utc>>,
    pub buyer_confirmed: bool,
    pub seller_confirmed: bool,
    pub buyer_location: Option<LocationSample>,
    pub seller_location: Option<LocationSample>,
    pub dispute_id: Option<DisputeId>,
    /// The status the transaction was in when the current (or last) dispute froze it.
    pub status_before_dispute: Option<TransactionStatus>,
    /// Set on payment from the configured fund-hold policy. Payout is an external concern.
    pub funds_release_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Which side of the transaction `user_id` is on, if any.
    pub fn party_of(&self, user_id: &str) -> Option<Party> {
        if self.buyer_id == user_id {
            Some(Party::Buyer)
        } else if self.seller_id == user_id {
            Some(Party::Seller)
        } else {
            None
        }
    }

    pub fn location_of(&self, party: Party) -> Option<&LocationSample> {
        match party {
            Party::Buyer => self.buyer_location.as_ref(),
            Party::Seller => self.seller_location.as_ref(),
        }
    }

    pub fn has_confirmed(&self, party: Party) -> bool {
        match party {
            Party::Buyer => self.buyer_confirmed,
            Party::Seller => self.seller_confirmed,
        }
    }

    pub fn both_confirmed(&self) -> bool {
        self.buyer_confirmed && self.seller_confirmed
    }

    pub fn total_charge(&self) -> Cents {
        self.fees.total_charge
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub listing_id: ListingId,
    pub buyer_id: String,
    pub seller_id: String,
    pub amount: Cents,
}

impl NewTransaction {
    pub fn new<S: Into<String>>(listing_id: ListingId, buyer_id: S, seller_id: S, amount: Cents) -> Self {
        Self { listing_id, buyer_id: buyer_id.into(), seller_id: seller_id.into(), amount }
    }
}

/// Everything the store needs to persist a new `pending` transaction.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub new_transaction: NewTransaction,
    pub fees: FeeBreakdown,
    pub currency: String,
    pub payment_intent_id: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit trail entry. Written for every status change and every proximity check.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHistoryEntry {
    pub id: i64,
    pub transaction_id: TransactionId,
    pub from_status: Option<TransactionStatus>,
    pub to_status: TransactionStatus,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------        Dispute        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub decision: Decision,
    /// Only for `buyer_favor`. Defaults to the full amount charged.
    pub refund_amount: Option<Cents>,
    pub reason: String,
    pub resolver_id: String,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispute {
    pub id: DisputeId,
    pub transaction_id: TransactionId,
    pub initiator_id: String,
    pub reason: DisputeReason,
    pub description: String,
    pub status: DisputeStatus,
    pub priority: Priority,
    pub assignee_id: Option<String>,
    pub resolution: Option<Resolution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDispute {
    pub id: DisputeId,
    pub transaction_id: TransactionId,
    pub initiator_id: String,
    pub reason: DisputeReason,
    pub description: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeMessage {
    pub id: i64,
    pub dispute_id: DisputeId,
    pub author_id: String,
    pub author_role: AuthorRole,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
