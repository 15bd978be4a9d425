//! The seams of the settlement core.
//!
//! Storage backends implement [`SettlementDatabase`], [`DisputeManagement`], [`MarketplaceDatabase`] and
//! [`AuctionTimerStore`]. Every state-changing method is a conditional update: it only succeeds if the record is still
//! in an allowed source state, so two racing callers can never both win.
//!
//! [`PaymentProcessor`] is the boundary to the external processor that actually moves money.
mod auction_timers;
mod data_objects;
mod dispute_management;
mod errors;
mod marketplace_database;
mod payment_processor;
mod settlement_database;

pub use auction_timers::AuctionTimerStore;
pub use data_objects::{DisputeUpdate, NewBid, NewDisputeMessage};
pub use dispute_management::DisputeManagement;
pub use errors::{ErrorKind, SettlementError};
pub use marketplace_database::MarketplaceDatabase;
pub use payment_processor::{
    PaymentIntent,
    PaymentIntentStatus,
    PaymentMetadata,
    PaymentProcessor,
    PaymentProcessorError,
};
pub use settlement_database::SettlementDatabase;
