//! # Handoff Escrow server
//! This crate hosts the HTTP surface of the escrow settlement core. It is responsible for:
//! * Exposing listings, bids, transactions and disputes over a JSON API.
//! * Creating payment intents with the payment processor and checking their status.
//! * Running the auction worker, which closes auctions when their timers run out and sells to the highest bidder.
//! * Logging the notifications that the engine's events would dispatch.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information, or run
//! the binary with any argument to print the help text.
//!
//! ## Routes
//! See [routes](routes/index.html) for the full list. `/health` returns a 200 OK response.
pub mod auction_worker;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod notifications;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
