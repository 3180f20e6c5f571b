//! Types library for the OHLCV aggregator
//!
//! Core type definitions shared between the aggregation engine and its
//! collaborators (feed decoding, presentation).
//!
//! # Modules
//! - `ids`: Window identifiers (WindowKey)
//! - `numeric`: Fixed-point decimal types (Price, Size)
//! - `trade`: Decoded trade records
//! - `bar`: OHLCV bar and its revision rules
//! - `errors`: Error taxonomy

pub mod bar;
pub mod errors;
pub mod ids;
pub mod numeric;
pub mod trade;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bar::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::trade::*;
}
