//! errguard Logging - Structured, leveled logging service
//!
//! Provides the [`Logger`] used by the other services for their own
//! diagnostics. It batches and ships entries to a remote log sink
//! independently of report delivery.

pub mod entry;
pub mod logger;

pub use entry::{LogEntry, LogLevel};
pub use logger::{FlushOutcome, Logger};
