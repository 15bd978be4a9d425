use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::{
    helpers::{parse_decimal, DecimalParseError},
    op,
};

/// The settlement currency. The core is single-currency; this is the ISO code handed to the payment processor.
pub const DEFAULT_CURRENCY: &str = "usd";

//--------------------------------------        Cents        ---------------------------------------------------------
/// An amount of money in the minor unit of the settlement currency.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Cents(i64);

op!(binary Cents, Add, add);
op!(binary Cents, Sub, sub);
op!(inplace Cents, AddAssign, add_assign);
op!(inplace Cents, SubAssign, sub_assign);
op!(unary Cents, Neg, neg);

impl Mul<i64> for Cents {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Parses an amount in major units, e.g. `"54.50"`. Sub-cent digits are rounded half-up.
impl FromStr for Cents {
    type Err = DecimalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_decimal(s, 2).map(Self)
    }
}

impl Cents {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Cents::from(5450).to_string(), "54.50");
        assert_eq!(Cents::from(7).to_string(), "0.07");
        assert_eq!(Cents::from(-310).to_string(), "-3.10");
        assert_eq!(Cents::from_major(3).to_string(), "3.00");
    }

    #[test]
    fn parse() {
        assert_eq!("50.00".parse::<Cents>().unwrap(), Cents::from(5000));
        assert_eq!("1.505".parse::<Cents>().unwrap(), Cents::from(151));
        assert!("fifty".parse::<Cents>().is_err());
    }

    #[test]
    fn arithmetic() {
        let mut total = Cents::from(5000) + Cents::from(300);
        total += Cents::from(150);
        assert_eq!(total, Cents::from(5450));
        assert_eq!(total - Cents::from(450), Cents::from(5000));
        assert_eq!(Cents::from(150) * 3, Cents::from(450));
        assert_eq!(vec![Cents::from(1), Cents::from(2)].into_iter().sum::<Cents>(), Cents::from(3));
        assert_eq!(Cents::from(i64::MAX).checked_add(Cents::from(1)), None);
    }

    #[test]
    fn serializes_as_minor_units() {
        assert_eq!(serde_json::to_string(&Cents::from(5450)).unwrap(), "5450");
    }
}
