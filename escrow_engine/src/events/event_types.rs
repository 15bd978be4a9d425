use serde::{Deserialize, Serialize};

use crate::db_types::{AuctionTimer, Dispute, Transaction};

macro_rules! event {
    ($(#[$doc:meta])* $name:ident { $field:ident: $ty:ty } => $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub $field: $ty,
        }

        impl $name {
            pub fn new($field: $ty) -> Self {
                Self { $field }
            }

            /// The notification topic for this event.
            pub fn name(&self) -> &'static str {
                $label
            }
        }
    };
}

event!(
    /// A transaction was created in `pending` with its payment intent.
    TransactionCreatedEvent { transaction: Transaction } => "transaction.created"
);
event!(
    /// The processor confirmed payment and the transaction moved to `paid`.
    TransactionPaidEvent { transaction: Transaction } => "transaction.paid"
);
event!(
    /// A proximity check succeeded and the transaction awaits completion confirmations.
    TransactionDeliveredEvent { transaction: Transaction } => "transaction.delivered"
);
event!(TransactionCompletedEvent { transaction: Transaction } => "transaction.completed");
event!(TransactionRefundedEvent { transaction: Transaction } => "transaction.refunded");
event!(DisputeOpenedEvent { dispute: Dispute } => "dispute.opened");
event!(DisputeResolvedEvent { dispute: Dispute } => "dispute.resolved");
event!(
    /// Fired exactly once per timer, by whichever expiry check wins the `active → expired` swap.
    AuctionEndedEvent { timer: AuctionTimer } => "auction.ended"
);
