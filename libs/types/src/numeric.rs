//! Fixed-point decimal types for prices and sizes
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Feeds publish JSON floats; they are converted once, at decode time.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::TradeError;

/// Trade price. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Create a price, rejecting zero and negative values.
    pub fn try_new(value: Decimal) -> Result<Self, TradeError> {
        if value <= Decimal::ZERO {
            return Err(TradeError::InvalidPrice(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Convert a wire float. NaN and infinities are rejected.
    pub fn from_f64(value: f64) -> Result<Self, TradeError> {
        let dec = Decimal::from_f64(value)
            .ok_or_else(|| TradeError::InvalidPrice(value.to_string()))?;
        Self::try_new(dec)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Price {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dec = Decimal::from_str(s).map_err(|_| TradeError::InvalidPrice(s.to_string()))?;
        Self::try_new(dec)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traded size. Zero is allowed (some venues print zero-size ticks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(Decimal);

impl Size {
    pub const ZERO: Size = Size(Decimal::ZERO);

    /// Create a size, rejecting negative values.
    pub fn try_new(value: Decimal) -> Result<Self, TradeError> {
        if value < Decimal::ZERO {
            return Err(TradeError::InvalidSize(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Convert a wire float. NaN and infinities are rejected.
    pub fn from_f64(value: f64) -> Result<Self, TradeError> {
        let dec = Decimal::from_f64(value)
            .ok_or_else(|| TradeError::InvalidSize(value.to_string()))?;
        Self::try_new(dec)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Size {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dec = Decimal::from_str(s).map_err(|_| TradeError::InvalidSize(s.to_string()))?;
        Self::try_new(dec)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
