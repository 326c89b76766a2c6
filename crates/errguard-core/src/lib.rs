//! errguard Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `FaultEvent`, `ReportRecord`, `ConsentConfig`, `AlertConfig`
//! - **Pure rules** - fault classification, consent level table, report validation
//! - **Port definitions** - Traits for adapters: `IStateStore`, `ITransport`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`errguard-cache` for storage, `errguard-report` for HTTP transport).
//! Services (consent, recovery, reporting, monitoring, logging) live in
//! their own crates and depend only on this one for shared types.

pub mod config;
pub mod domain;
pub mod ports;
