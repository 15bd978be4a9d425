mod disputes;
mod helpers;
mod listings;
pub mod mocks;
mod transactions;
