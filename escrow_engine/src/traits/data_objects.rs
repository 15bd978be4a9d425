use chrono::{DateTime, Utc};

use crate::db_types::{AuthorRole, BidId, Cents, DisputeId, DisputeStatus, ListingId, Priority};

#[derive(Debug, Clone)]
pub struct NewBid {
    pub id: BidId,
    pub listing_id: ListingId,
    pub bidder_id: String,
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDisputeMessage {
    pub dispute_id: DisputeId,
    pub author_id: String,
    pub author_role: AuthorRole,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A conditional status change for a dispute. The update only applies if the dispute is currently in one of `from`.
#[derive(Debug, Clone)]
pub struct DisputeUpdate {
    pub from: Vec<DisputeStatus>,
    pub to: DisputeStatus,
    pub assignee_id: Option<String>,
    pub priority: Option<Priority>,
    pub updated_at: DateTime<Utc>,
}

impl DisputeUpdate {
    pub fn new(from: &[DisputeStatus], to: DisputeStatus, updated_at: DateTime<Utc>) -> Self {
        Self { from: from.to_vec(), to, assignee_id: None, priority: None, updated_at }
    }

    pub fn with_assignee<S: Into<String>>(mut self, assignee_id: S) -> Self {
        self.assignee_id = Some(assignee_id.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}
