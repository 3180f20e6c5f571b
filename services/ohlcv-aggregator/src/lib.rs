//! OHLCV Aggregation Service
//!
//! Consumes a real-time trade feed for one instrument and produces one
//! open/high/low/close/volume bar per fixed time window. Trades that arrive
//! after their window closed revise the stored bar, as long as they are not
//! older than the stale window.
//!
//! # Architecture
//!
//! ```text
//!   Feed frames
//!        │
//!   ┌────▼─────┐
//!   │Backpress.│  ← bounded queue, block or drop
//!   └────┬─────┘
//!   ┌────▼─────┐
//!   │ Ingest   │  ← decode, filter, append
//!   └────┬─────┘
//!        │ pending buffer
//!   ┌────▼─────┐      ┌──────────┐
//!   │Scheduler │─────►│Reconcile │  ← late trades
//!   └────┬─────┘      └────┬─────┘
//!        │ fresh bar       │ revisions
//!   ┌────▼─────────────────▼────┐
//!   │    Bar store  /  Sink     │
//!   └───────────────────────────┘
//! ```

pub mod backpressure;
pub mod bars;
pub mod config;
pub mod events;
pub mod feed;
pub mod ingestion;
pub mod metrics;
pub mod reconcile;
pub mod scheduler;
pub mod service;
pub mod sink;
pub mod window;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
