//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the services depend on; implementations live
//! in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IStateStore`] - Scoped key/value storage of JSON documents
//! - [`ITransport`] - Outbound JSON POST requests

pub mod state_store;
pub mod transport;

pub use state_store::{keys, read_json, remove_logged, write_json, IStateStore, MemoryStateStore};
pub use transport::{ITransport, TransportResponse};
