//! The public API of the settlement core.
//!
//! Each API struct is generic over its storage backend (and, where money is involved, the payment processor), holds an
//! injected [`crate::helpers::Clock`] and publishes domain events through [`crate::events::EventProducers`].
mod auction_timer_api;
mod config;
mod dispute_api;
mod marketplace_api;
mod transaction_flow_api;

pub use auction_timer_api::AuctionTimerApi;
pub use config::{
    FundHoldPolicy,
    SettlementConfig,
    DEFAULT_CURRENCY,
    DEFAULT_DISPUTE_WINDOW_DAYS,
    DEFAULT_HOLD_INTRO_COUNT,
    DEFAULT_HOLD_INTRO_HOURS,
    DEFAULT_HOLD_STANDARD_MINUTES,
    DEFAULT_LOCATION_MAX_AGE_SECS,
};
pub use dispute_api::{DisputeApi, DisputeDecision};
pub use marketplace_api::MarketplaceApi;
pub use transaction_flow_api::{CreatedTransaction, ProximityCheck, TransactionFlowApi};
