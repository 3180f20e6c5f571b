//! Decoded trade records
//!
//! A `Trade` is produced once by the feed decoder and never mutated. Only
//! records tagged as trades may enter the aggregation buffer; status and
//! other control records are surfaced to logging instead.

use crate::errors::TradeError;
use crate::numeric::{Price, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Event-type discriminator carried by every feed record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Executed trade print
    Trade,
    /// Connection/subscription status message
    Status,
    /// Any other channel (quotes, aggregates, ...) identified by its wire code
    Other(String),
}

impl EventType {
    /// Map a wire event code to a discriminator.
    pub fn from_code(code: &str) -> Self {
        match code {
            "XT" | "T" | "trade" => EventType::Trade,
            "status" => EventType::Status,
            other => EventType::Other(other.to_string()),
        }
    }

    /// Label for logging.
    pub fn label(&self) -> &str {
        match self {
            EventType::Trade => "trade",
            EventType::Status => "status",
            EventType::Other(code) => code.as_str(),
        }
    }

    pub fn is_trade(&self) -> bool {
        matches!(self, EventType::Trade)
    }
}

/// A single decoded trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub price: Price,
    pub size: Size,
    /// Exchange execution time, Unix milliseconds
    pub timestamp_millis: i64,
    pub event_type: EventType,
}

impl Trade {
    /// Create a trade record.
    pub fn new(price: Price, size: Size, timestamp_millis: i64) -> Self {
        Self {
            price,
            size,
            timestamp_millis,
            event_type: EventType::Trade,
        }
    }

    /// Create a record with an explicit event type.
    pub fn with_event_type(
        price: Price,
        size: Size,
        timestamp_millis: i64,
        event_type: EventType,
    ) -> Self {
        Self {
            price,
            size,
            timestamp_millis,
            event_type,
        }
    }

    /// Build from raw wire values, validating each field.
    pub fn from_wire(price: f64, size: f64, timestamp_millis: i64) -> Result<Self, TradeError> {
        if timestamp_millis < 0 {
            return Err(TradeError::InvalidTimestamp(timestamp_millis));
        }
        Ok(Self::new(
            Price::from_f64(price)?,
            Size::from_f64(size)?,
            timestamp_millis,
        ))
    }

    /// Execution time in Unix nanoseconds (saturating).
    pub fn timestamp_nanos(&self) -> i64 {
        self.timestamp_millis.saturating_mul(1_000_000)
    }

    /// Trade value (price × size)
    pub fn notional(&self) -> Decimal {
        self.price.as_decimal() * self.size.as_decimal()
    }

    pub fn is_trade(&self) -> bool {
        self.event_type.is_trade()
    }
}
