//! Domain layer for cls-log-shipper.
//!
//! Contains the canonical types shared across all modules:
//! - `LogRecord`: The pipeline's core data type, also the CLS `Log` message
//! - `Content`: One key/value field of a record
//! - `ShipperError`: Top-level error type

pub mod error;
pub mod log_record;

pub use error::ShipperError;
pub use log_record::{Content, LogRecord};
