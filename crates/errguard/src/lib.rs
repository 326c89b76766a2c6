//! errguard - Fault interception, recovery and privacy-aware reporting
//!
//! This crate is the composition root of the workspace:
//! - [`ErrorGuard`] - builds every service from a [`Config`](errguard_core::config::Config)
//!   and routes intercepted faults through monitoring, recovery, logging and
//!   reporting
//! - [`FaultBoundary`] - runs work and converts panics and errors into faults
//! - [`install_panic_hook`] - chains a process panic hook that captures the
//!   panic location and backtrace for the catching boundary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use errguard::{ErrorGuard, FaultBoundary};
//! use errguard_core::config::Config;
//! use errguard_core::domain::BoundaryId;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! errguard::install_panic_hook();
//! let guard = Arc::new(ErrorGuard::from_config(Config::default()).await?);
//! let boundary = FaultBoundary::new(guard.clone(), BoundaryId::new("app/dashboard")?);
//!
//! if let Err(caught) = boundary.run(|| render_dashboard()).await {
//!     eprintln!("{caught}");
//! }
//! guard.shutdown().await;
//! # Ok(())
//! # }
//! # fn render_dashboard() {}
//! ```

pub mod boundary;
pub mod guard;
pub mod panic_hook;

pub use boundary::{CaughtFault, FaultBoundary};
pub use guard::{ErrorGuard, FaultOutcome, SubmissionHandle};
pub use panic_hook::{install_panic_hook, panic_message, take_last_panic, PanicDetails};
