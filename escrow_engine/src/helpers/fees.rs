//! Escrow fee computation.
//!
//! Buyers pay `price + flat fee + price × rate`. The fees are platform revenue and are never taken from the seller, so
//! the seller payout is always the item price.
use escrow_common::{Cents, FeeRate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::FeeBreakdown;

pub const DEFAULT_FLAT_FEE: Cents = Cents::new(300);
pub const DEFAULT_FEE_RATE_BPS: i64 = 300;
/// The smallest charge the payment processor accepts, in minor units.
pub const DEFAULT_MINIMUM_CHARGE: Cents = Cents::new(50);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeError {
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Cents, reason: String },
}

impl FeeError {
    fn invalid<S: Into<String>>(amount: Cents, reason: S) -> Self {
        Self::InvalidAmount { amount, reason: reason.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub flat_fee: Cents,
    pub rate: FeeRate,
    pub minimum_charge: Cents,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            flat_fee: DEFAULT_FLAT_FEE,
            rate: FeeRate::from_bps(DEFAULT_FEE_RATE_BPS),
            minimum_charge: DEFAULT_MINIMUM_CHARGE,
        }
    }
}

impl FeeSchedule {
    pub fn new(flat_fee: Cents, rate: FeeRate) -> Self {
        Self { flat_fee, rate, ..Default::default() }
    }

    pub fn with_minimum_charge(mut self, minimum_charge: Cents) -> Self {
        self.minimum_charge = minimum_charge;
        self
    }

    /// Computes the fee breakdown for an item price. The percentage fee is rounded half-up to the cent.
    ///
    /// Fails with [`FeeError::InvalidAmount`] if the price is not positive, if the arithmetic overflows, or if the
    /// total charge falls below the processor's minimum chargeable amount.
    pub fn calculate(&self, price: Cents) -> Result<FeeBreakdown, FeeError> {
        if !price.is_positive() {
            return Err(FeeError::invalid(price, "the price must be greater than zero"));
        }
        let percentage_fee =
            self.rate.apply(price).ok_or_else(|| FeeError::invalid(price, "the percentage fee is out of range"))?;
        let total_fee = self
            .flat_fee
            .checked_add(percentage_fee)
            .ok_or_else(|| FeeError::invalid(price, "the total fee is out of range"))?;
        let total_charge =
            price.checked_add(total_fee).ok_or_else(|| FeeError::invalid(price, "the total charge is out of range"))?;
        if total_charge < self.minimum_charge {
            return Err(FeeError::invalid(
                price,
                format!("the total charge of {total_charge} is below the minimum charge of {}", self.minimum_charge),
            ));
        }
        Ok(FeeBreakdown {
            flat_fee: self.flat_fee,
            percentage_fee,
            total_fee,
            total_charge,
            seller_payout: price,
            rate: self.rate,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn schedule() -> FeeSchedule {
        FeeSchedule::new(Cents::from_major(3), "0.03".parse().unwrap())
    }

    #[test]
    fn fifty_dollar_item() {
        let fees = schedule().calculate(Cents::from_major(50)).unwrap();
        assert_eq!(fees.flat_fee.to_string(), "3.00");
        assert_eq!(fees.percentage_fee.to_string(), "1.50");
        assert_eq!(fees.total_fee.to_string(), "4.50");
        assert_eq!(fees.total_charge.to_string(), "54.50");
        assert_eq!(fees.seller_payout.to_string(), "50.00");
    }

    #[test]
    fn total_charge_identity_holds_across_prices() {
        let schedule = schedule();
        for price in (1..200_000).step_by(997).map(Cents::from) {
            let fees = schedule.calculate(price).unwrap();
            assert_eq!(fees.total_charge, price + fees.flat_fee + fees.percentage_fee);
            assert_eq!(fees.total_fee, fees.flat_fee + fees.percentage_fee);
            assert_eq!(fees.seller_payout, price);
            // Within half a cent of the exact product, in ten-thousandths of a cent
            let error = fees.percentage_fee.value() * 10_000 - price.value() * 300;
            assert!(error.abs() <= 5_000, "{price}: {error}");
        }
    }

    #[test]
    fn rounds_half_up() {
        // 3% of 0.50 is 1.5 cents
        let fees = schedule().calculate(Cents::from(50)).unwrap();
        assert_eq!(fees.percentage_fee, Cents::from(2));
        // 3% of 0.49 is 1.47 cents
        let fees = schedule().calculate(Cents::from(49)).unwrap();
        assert_eq!(fees.percentage_fee, Cents::from(1));
    }

    #[test]
    fn non_positive_prices_are_rejected() {
        assert!(matches!(schedule().calculate(Cents::from(0)), Err(FeeError::InvalidAmount { .. })));
        assert!(matches!(schedule().calculate(Cents::from(-500)), Err(FeeError::InvalidAmount { .. })));
    }

    #[test]
    fn charges_below_the_processor_minimum_are_rejected() {
        let schedule = FeeSchedule::new(Cents::from(0), FeeRate::from_bps(0));
        let err = schedule.calculate(Cents::from(30)).unwrap_err();
        assert!(err.to_string().contains("below the minimum charge of 0.50"));
        assert!(schedule.calculate(Cents::from(50)).is_ok());
    }

    #[test]
    fn overflow_is_an_invalid_amount() {
        assert!(matches!(schedule().calculate(Cents::from(i64::MAX)), Err(FeeError::InvalidAmount { .. })));
    }
}
