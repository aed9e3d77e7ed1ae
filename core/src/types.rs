//! Shared primitive types used across the entire pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Customer identifier as carried by the source data.
pub type CustomerId = i64;

/// A monetary amount in minor currency units (pence, cents).
///
/// Every revenue figure is accumulated as `Money`, so totals are exact and
/// do not depend on the order lines are summed in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

/// Largest line revenue accepted, in minor units. Beyond 2^53 an `f64`
/// product no longer resolves to a whole cent.
pub const MAX_LINE_MINOR: i64 = 1 << 53;

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Round a major-unit amount (e.g. 12.34) to currency precision.
    pub fn from_major(amount: f64) -> Self {
        Money((amount * 100.0).round() as i64)
    }

    /// Revenue of a single line: quantity × unit price at currency precision.
    /// `None` when the product is not finite or exceeds `MAX_LINE_MINOR`.
    pub fn line_total(quantity: i64, unit_price: f64) -> Option<Self> {
        let minor = (quantity as f64 * unit_price * 100.0).round();
        if minor.is_finite() && minor.abs() <= MAX_LINE_MINOR as f64 {
            Some(Money(minor as i64))
        } else {
            None
        }
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Sum that reports overflow instead of wrapping or panicking.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
        amounts.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn as_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Divide evenly across `count` parts, rounded to currency precision.
    /// Returns zero when `count` is zero.
    pub fn per(self, count: u64) -> Money {
        if count == 0 {
            return Money::ZERO;
        }
        Money((self.0 as f64 / count as f64).round() as i64)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

// The operators assume a checked total already bounds every partial sum;
// the pipeline verifies that with `checked_sum` before aggregating.
impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Round to two decimal places (percentages, averages).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
