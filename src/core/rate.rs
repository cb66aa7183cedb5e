//! Numeric representation of rates and amounts
//!
//! A table is loaded with one representation for its whole lifetime: `f64` for
//! speed or `Decimal` for exact conversions.

use rust_decimal::Decimal;
use std::fmt::{Debug, Display};
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

pub trait Rate:
    Copy
    + Debug
    + Display
    + PartialOrd
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
{
    /// Short name of the representation, used in log output.
    const NAME: &'static str;

    fn one() -> Self;

    /// Converts a day count into this representation for date interpolation.
    fn from_days(days: i64) -> Self;

    /// Parses a finite number, `None` otherwise.
    fn parse_number(s: &str) -> Option<Self>;

    /// True for values above zero; zero and negatives are rejected.
    fn is_strictly_positive(&self) -> bool;

    /// `None` when the product does not fit this representation.
    fn checked_mul(self, other: Self) -> Option<Self>;

    /// `None` on division by zero or when the quotient does not fit.
    fn checked_div(self, other: Self) -> Option<Self>;

    fn checked_add(self, other: Self) -> Option<Self>;

    fn checked_sub(self, other: Self) -> Option<Self>;

    /// Rounds half away from zero to `dp` decimal places.
    fn round_to(self, dp: u32) -> Self;
}

impl Rate for f64 {
    const NAME: &'static str = "float";

    fn one() -> Self {
        1.0
    }

    fn from_days(days: i64) -> Self {
        days as f64
    }

    fn parse_number(s: &str) -> Option<Self> {
        s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    fn is_strictly_positive(&self) -> bool {
        *self > 0.0
    }

    fn checked_mul(self, other: Self) -> Option<Self> {
        finite(self * other)
    }

    fn checked_div(self, other: Self) -> Option<Self> {
        finite(self / other)
    }

    fn checked_add(self, other: Self) -> Option<Self> {
        finite(self + other)
    }

    fn checked_sub(self, other: Self) -> Option<Self> {
        finite(self - other)
    }

    fn round_to(self, dp: u32) -> Self {
        let factor = 10f64.powi(dp as i32);
        (self * factor).round() / factor
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl Rate for Decimal {
    const NAME: &'static str = "decimal";

    fn one() -> Self {
        Decimal::ONE
    }

    fn from_days(days: i64) -> Self {
        Decimal::from(days)
    }

    fn parse_number(s: &str) -> Option<Self> {
        let s = s.trim();
        Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .ok()
    }

    fn is_strictly_positive(&self) -> bool {
        self.is_sign_positive() && !self.is_zero()
    }

    fn checked_mul(self, other: Self) -> Option<Self> {
        Decimal::checked_mul(self, other)
    }

    fn checked_div(self, other: Self) -> Option<Self> {
        Decimal::checked_div(self, other)
    }

    fn checked_add(self, other: Self) -> Option<Self> {
        Decimal::checked_add(self, other)
    }

    fn checked_sub(self, other: Self) -> Option<Self> {
        Decimal::checked_sub(self, other)
    }

    fn round_to(self, dp: u32) -> Self {
        self.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
    }
}
