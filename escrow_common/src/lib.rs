//! Types shared by the escrow engine and the escrow server.
//!
//! * [`Cents`] is the only money type in the system. All amounts are integer minor units of the single settlement
//!   currency.
//! * [`FeeRate`] is a percentage stored in basis points.
//! * [`Secret`] keeps credentials out of logs.
mod cents;
mod fee_rate;
mod secret;

pub mod helpers;
pub mod op;

pub use cents::{Cents, DEFAULT_CURRENCY};
pub use fee_rate::FeeRate;
pub use helpers::DecimalParseError;
pub use secret::Secret;
