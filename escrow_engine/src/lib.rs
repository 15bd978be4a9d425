//! Handoff Escrow settlement engine
//!
//! The settlement core of a peer-to-peer marketplace where the buyer and seller meet in person to hand over the item.
//! Money is held in escrow from the moment the buyer pays until both parties confirm that the handoff took place.
//!
//! The library is divided into these sections:
//! 1. Pure building blocks ([`mod@helpers`]): fee computation, great-circle distance and proximity checks, and the
//!    clock abstraction.
//! 2. Storage ([`mod@traits`] and the SQLite backend). You should never need to touch the database directly; the traits
//!    describe everything the APIs need from a backend, and [`SqliteDatabase`] implements all of them. The data types
//!    stored in the database live in [`mod@db_types`] and are public.
//! 3. The public API: [`TransactionFlowApi`] (the transaction state machine), [`DisputeApi`], [`AuctionTimerApi`] and
//!    [`MarketplaceApi`].
//!
//! The engine also emits events when things happen (a transaction was paid, an auction ended, and so on). A simple
//! actor framework in [`mod@events`] lets the host application hook into these and, for example, send notifications.
pub mod db_types;
pub mod events;
pub mod helpers;
mod settlement_api;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use settlement_api::{
    AuctionTimerApi,
    CreatedTransaction,
    DisputeApi,
    DisputeDecision,
    FundHoldPolicy,
    MarketplaceApi,
    ProximityCheck,
    SettlementConfig,
    TransactionFlowApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    AuctionTimerStore,
    DisputeManagement,
    ErrorKind,
    MarketplaceDatabase,
    PaymentProcessor,
    SettlementDatabase,
    SettlementError,
};
