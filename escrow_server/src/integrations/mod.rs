//! Clients for the external services the escrow server talks to.
mod stripe;

pub use stripe::StripeProcessor;
