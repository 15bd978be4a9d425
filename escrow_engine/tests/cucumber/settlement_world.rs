use cucumber::World;
use escrow_engine::{
    db_types::{Dispute, Listing, Transaction},
    SettlementError,
};

use crate::support::TestSystem;

#[derive(Default, Debug, World)]
pub struct SettlementWorld {
    pub system: Option<TestSystem>,
    pub listing: Option<Listing>,
    pub transaction: Option<Transaction>,
    pub dispute: Option<Dispute>,
    pub last_error: Option<SettlementError>,
}

impl SettlementWorld {
    pub fn system(&self) -> &TestSystem {
        self.system.as_ref().expect("Settlement system not initialised")
    }

    pub fn listing(&self) -> &Listing {
        self.listing.as_ref().expect("No listing has been created")
    }

    pub fn transaction(&self) -> &Transaction {
        self.transaction.as_ref().expect("No transaction has been created")
    }

    pub fn dispute(&self) -> &Dispute {
        self.dispute.as_ref().expect("No dispute has been opened")
    }

    /// Re-reads the current transaction from the database.
    pub async fn refresh_transaction(&mut self) -> &Transaction {
        let id = self.transaction().id.clone();
        let tx = self.system().flow.transaction(&id).await.expect("Error fetching transaction");
        self.transaction.insert(tx)
    }
}
