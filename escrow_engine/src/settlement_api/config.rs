use chrono::Duration;

use crate::helpers::{fees::FeeSchedule, proximity::DEFAULT_PROXIMITY_RADIUS_METERS};

pub const DEFAULT_CURRENCY: &str = escrow_common::DEFAULT_CURRENCY;
pub const DEFAULT_LOCATION_MAX_AGE_SECS: i64 = 300;
pub const DEFAULT_DISPUTE_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_HOLD_INTRO_COUNT: i64 = 5;
pub const DEFAULT_HOLD_INTRO_HOURS: i64 = 24;
pub const DEFAULT_HOLD_STANDARD_MINUTES: i64 = 15;

/// How long paid funds are held before they may be released to the seller.
///
/// A seller's first `intro_count` paid transactions are held for `intro_hold`; after that, `standard_hold` applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundHoldPolicy {
    pub intro_count: i64,
    pub intro_hold: Duration,
    pub standard_hold: Duration,
}

impl Default for FundHoldPolicy {
    fn default() -> Self {
        Self {
            intro_count: DEFAULT_HOLD_INTRO_COUNT,
            intro_hold: Duration::hours(DEFAULT_HOLD_INTRO_HOURS),
            standard_hold: Duration::minutes(DEFAULT_HOLD_STANDARD_MINUTES),
        }
    }
}

impl FundHoldPolicy {
    /// The hold for a seller who has had `prior_paid` transactions paid before this one.
    pub fn hold_for(&self, prior_paid: i64) -> Duration {
        if prior_paid < self.intro_count {
            self.intro_hold
        } else {
            self.standard_hold
        }
    }
}

/// Tunables of the settlement core. The server fills this in from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementConfig {
    pub fees: FeeSchedule,
    pub currency: String,
    pub proximity_radius_m: f64,
    /// How old a location fix may be and still count for a proximity check.
    pub location_max_age: Duration,
    /// How long after completion a party may still open a dispute.
    pub dispute_window: Duration,
    pub hold_policy: FundHoldPolicy,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            currency: DEFAULT_CURRENCY.to_string(),
            proximity_radius_m: DEFAULT_PROXIMITY_RADIUS_METERS,
            location_max_age: Duration::seconds(DEFAULT_LOCATION_MAX_AGE_SECS),
            dispute_window: Duration::days(DEFAULT_DISPUTE_WINDOW_DAYS),
            hold_policy: FundHoldPolicy::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_sellers_get_the_introductory_hold() {
        let policy = FundHoldPolicy::default();
        assert_eq!(policy.hold_for(0), Duration::hours(24));
        assert_eq!(policy.hold_for(4), Duration::hours(24));
        assert_eq!(policy.hold_for(5), Duration::minutes(15));
        assert_eq!(policy.hold_for(500), Duration::minutes(15));
    }
}
