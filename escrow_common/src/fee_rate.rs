use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::{
    helpers::{parse_decimal, DecimalParseError},
    Cents,
};

const BPS_SCALE: i64 = 10_000;

/// A percentage rate, held in basis points (1 bps = 0.01%). `FeeRate::from_bps(300)` is 3%.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct FeeRate(i64);

impl FeeRate {
    pub const fn from_bps(bps: i64) -> Self {
        Self(bps)
    }

    pub fn bps(&self) -> i64 {
        self.0
    }

    /// `amount × rate`, rounded half-up to the nearest cent. Returns `None` if the amount is negative or the product
    /// overflows.
    pub fn apply(&self, amount: Cents) -> Option<Cents> {
        if amount.value() < 0 || self.0 < 0 {
            return None;
        }
        let scaled = amount.value().checked_mul(self.0)?.checked_add(BPS_SCALE / 2)?;
        Some(Cents::from(scaled / BPS_SCALE))
    }
}

impl Display for FeeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// Parses a fraction, e.g. `"0.03"` for 3%.
impl FromStr for FeeRate {
    type Err = DecimalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_decimal(s, 4).map(Self)
    }
}
