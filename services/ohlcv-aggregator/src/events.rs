//! Feed record definitions and frame decoding
//!
//! A frame is one message read off the feed transport: a JSON array of
//! records (a lone object is accepted too). Each record carries an `ev`
//! discriminator; trade records become [`Trade`]s, status records are handed
//! back so the caller can log them, anything else is ignored.

use serde::{Deserialize, Serialize};
use types::errors::TradeError;
use types::trade::{EventType, Trade};

/// Errors raised while decoding a frame or one of its records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("{event_type} record missing field `{field}`")]
    MissingField {
        event_type: String,
        field: &'static str,
    },

    #[error("invalid trade record: {0}")]
    InvalidValue(#[from] TradeError),
}

/// One record as published on the wire (crypto trade channel layout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    #[serde(rename = "ev")]
    pub event_type: String,
    #[serde(rename = "pair", default)]
    pub symbol: Option<String>,
    #[serde(rename = "p", default)]
    pub price: Option<f64>,
    #[serde(rename = "s", default)]
    pub size: Option<f64>,
    /// Execution time, Unix milliseconds
    #[serde(rename = "t", default)]
    pub timestamp: Option<i64>,
    #[serde(rename = "c", default)]
    pub conditions: Vec<i32>,
    #[serde(rename = "i", default)]
    pub trade_id: Option<String>,
    #[serde(rename = "x", default)]
    pub exchange_id: Option<i64>,
    /// Time the feed provider received the trade, Unix milliseconds
    #[serde(rename = "r", default)]
    pub received_at: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome of decoding a single record.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRecord {
    Trade(Trade),
    Status {
        status: Option<String>,
        message: Option<String>,
    },
    Ignored(EventType),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrameBody {
    Batch(Vec<FeedRecord>),
    Single(FeedRecord),
}

/// Parse a raw frame into its records.
pub fn decode_frame(frame: &[u8]) -> Result<Vec<FeedRecord>, DecodeError> {
    match serde_json::from_slice::<FrameBody>(frame) {
        Ok(FrameBody::Batch(records)) => Ok(records),
        Ok(FrameBody::Single(record)) => Ok(vec![record]),
        Err(e) => Err(DecodeError::Malformed(e.to_string())),
    }
}

impl FeedRecord {
    pub fn kind(&self) -> EventType {
        EventType::from_code(&self.event_type)
    }

    /// Convert the record into a domain value.
    pub fn decode(self) -> Result<DecodedRecord, DecodeError> {
        match self.kind() {
            EventType::Trade => {
                let price = self.price.ok_or_else(|| self.missing("p"))?;
                let size = self.size.ok_or_else(|| self.missing("s"))?;
                let timestamp = self.timestamp.ok_or_else(|| self.missing("t"))?;
                Ok(DecodedRecord::Trade(Trade::from_wire(price, size, timestamp)?))
            }
            EventType::Status => Ok(DecodedRecord::Status {
                status: self.status,
                message: self.message,
            }),
            other => Ok(DecodedRecord::Ignored(other)),
        }
    }

    fn missing(&self, field: &'static str) -> DecodeError {
        DecodeError::MissingField {
            event_type: self.event_type.clone(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    const TRADE_FRAME: &str = r#"[
        {"ev":"XT","pair":"BTC-USD","p":100.5,"t":1708123456789,"s":0.25,"c":[2],"i":"abc","x":1,"r":1708123456800},
        {"ev":"XT","pair":"BTC-USD","p":101,"t":1708123456790,"s":1}
    ]"#;

    #[test]
    fn test_decode_trade_batch() {
        let records = decode_frame(TRADE_FRAME.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol.as_deref(), Some("BTC-USD"));
        assert_eq!(records[0].conditions, vec![2]);

        match records[0].clone().decode().unwrap() {
            DecodedRecord::Trade(trade) => {
                assert_eq!(trade.price.as_decimal(), Decimal::new(1005, 1));
                assert_eq!(trade.size.as_decimal(), Decimal::new(25, 2));
                assert_eq!(trade.timestamp_millis, 1708123456789);
            }
            other => panic!("expected trade, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_status_record() {
        let frame = br#"[{"ev":"status","status":"auth_success","message":"authenticated"}]"#;
        let records = decode_frame(frame).unwrap();
        assert_eq!(
            records[0].clone().decode().unwrap(),
            DecodedRecord::Status {
                status: Some("auth_success".to_string()),
                message: Some("authenticated".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_single_object_frame() {
        let frame = br#"{"ev":"XQ","pair":"BTC-USD"}"#;
        let records = decode_frame(frame).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].clone().decode().unwrap(),
            DecodedRecord::Ignored(EventType::Other("XQ".to_string()))
        );
    }

    #[test]
    fn test_malformed_frame() {
        let err = decode_frame(b"not json").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_trade_missing_price() {
        let frame = br#"[{"ev":"XT","t":1,"s":1}]"#;
        let records = decode_frame(frame).unwrap();
        let err = records[0].clone().decode().unwrap_err();
        assert_eq!(
            err,
            DecodeError::MissingField {
                event_type: "XT".to_string(),
                field: "p",
            }
        );
    }

    #[test]
    fn test_trade_invalid_price() {
        let frame = br#"[{"ev":"XT","p":-3,"t":1,"s":1}]"#;
        let records = decode_frame(frame).unwrap();
        assert!(matches!(
            records[0].clone().decode(),
            Err(DecodeError::InvalidValue(TradeError::InvalidPrice(_)))
        ));
    }
}
