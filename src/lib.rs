#![deny(rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_possible_truncation, // Sizes and durations stay within realistic bounds
    clippy::cast_possible_wrap,       // Unix timestamps fit in i64
    clippy::missing_errors_doc,       // Internal API
    clippy::missing_panics_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. ClsError in sender::error
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod app;
pub mod buffer;
pub mod domain;
pub mod sender;
pub mod signer;

// Re-export main types for easy access
pub use app::{App, Config, Shipper};
pub use domain::{LogRecord, ShipperError};
pub use sender::{ClsClient, ClsError, LogSender};
pub use signer::{AuthParam, sign};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
