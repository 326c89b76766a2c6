//! errguard Privacy - Sanitization and consent
//!
//! Everything that leaves a fault boundary passes through this crate:
//!
//! - [`Sanitizer`] redacts sensitive substrings, fields and URLs
//! - [`ConsentManager`] decides which data may be collected and whether
//!   reports may be transported off the device

pub mod consent;
pub mod sanitizer;

pub use consent::{ConsentError, ConsentManager, ConsentStatus};
pub use sanitizer::{is_sensitive_key, Sanitizer, SanitizerConfig};
