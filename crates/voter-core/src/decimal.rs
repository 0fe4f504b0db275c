//! Precision-safe decimal price type.
//!
//! Uses `rust_decimal` for exact decimal arithmetic, avoiding
//! floating-point rounding errors in venue prices. On-chain submissions
//! carry scaled integers; `scale_to_units` performs the conversion.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

use crate::error::CoreError;

/// Price with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const ONE: Self = Self(Decimal::ONE);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Scale to the submission integer: `floor(price * 10^decimals)`.
    ///
    /// # Errors
    /// Fails for negative prices or when the scaled value overflows `u128`.
    pub fn scale_to_units(&self, decimals: u32) -> Result<u128, CoreError> {
        if self.0.is_sign_negative() {
            return Err(CoreError::InvalidPrice(format!(
                "negative price cannot be submitted: {}",
                self.0
            )));
        }
        let factor = Decimal::from(10u64.pow(decimals));
        let scaled = self
            .0
            .checked_mul(factor)
            .ok_or_else(|| CoreError::InvalidPrice(format!("scaling overflow: {}", self.0)))?
            .floor();
        scaled
            .to_u128()
            .ok_or_else(|| CoreError::InvalidPrice(format!("scaled price out of range: {scaled}")))
    }

    /// Render a scaled integer back to a display string with the given precision.
    pub fn format_units(units: u128, decimals: u32) -> String {
        let factor = 10u128.pow(decimals);
        format!(
            "{}.{:0width$}",
            units / factor,
            units % factor,
            width = decimals as usize
        )
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Decimal> for Price {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}
