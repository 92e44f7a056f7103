//! # fieldqc core
//!
//! Pure pipeline logic for fieldqc: data models, field normalization,
//! search/completion reconciliation, status filtering, deduplication,
//! per-fetch diagnostics, and the order store abstraction.
//!
//! This crate does no network or filesystem I/O and carries no tokio or
//! sqlx dependency. The `fieldqc` crate wires it to the provider API,
//! SQLite, the CLI, and the HTTP server.

pub mod dedup;
pub mod diagnostics;
pub mod filter;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod store;
