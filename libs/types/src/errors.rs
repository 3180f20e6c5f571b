//! Error types for trade records
//!
//! Error taxonomy using thiserror

use thiserror::Error;

/// Errors raised while building a trade record from raw values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_error_display() {
        let err = TradeError::InvalidPrice("-1".to_string());
        assert_eq!(err.to_string(), "Invalid price: -1");
        assert_eq!(TradeError::InvalidTimestamp(-5).to_string(), "Invalid timestamp: -5");
    }
}
