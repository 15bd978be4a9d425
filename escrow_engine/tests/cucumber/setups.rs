use std::str::FromStr;

use chrono::Duration;
use cucumber::given;
use escrow_engine::db_types::{Cents, NewListing};

use crate::{cucumber::SettlementWorld, support::TestSystem};

#[given("a fresh install")]
async fn fresh_database(world: &mut SettlementWorld) {
    let system = TestSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a listing by '{word}' priced at {word}")]
async fn create_listing(world: &mut SettlementWorld, seller: String, price: String) {
    let price = Cents::from_str(&price).expect("Not a valid price");
    let listing = NewListing::new(seller, "Vintage record player".to_string(), price);
    let listing = world.system().market.create_listing(listing).await.expect("Error creating listing");
    world.listing = Some(listing);
}

#[given(expr = "an auction of {int} minutes on the listing")]
async fn start_auction(world: &mut SettlementWorld, minutes: i64) {
    let id = world.listing().id.clone();
    world.system().timers.start_timer(&id, Duration::minutes(minutes)).await.expect("Error starting auction");
}
