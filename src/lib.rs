//! # fieldqc
//!
//! Bulk order ingestion and reconciliation for field-service quality control.
//!
//! fieldqc pulls every order for a date range from a dispatch provider's
//! paginated search endpoint, fetches completion details for them in
//! concurrent batches, reconciles the two, keeps only orders with a
//! terminal completion outcome, removes duplicates, and imports the result
//! into SQLite in small sequential batches.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │   Provider   │──▶│       Pipeline       │──▶│    Import    │
//! │ search/compl │   │ merge·filter·dedup   │   │ batches of 25│
//! └──────────────┘   └──────────────────────┘   └──────┬───────┘
//!                                                      │
//!                      ┌───────────────────────────────┤
//!                      ▼                               ▼
//!                 ┌──────────┐                   ┌──────────┐
//!                 │   CLI    │                   │   HTTP   │
//!                 │  (fqc)   │                   │   API    │
//!                 └──────────┘                   └──────────┘
//! ```
//!
//! The pure stages (normalization, merge, filter, dedup, diagnostics, the
//! store trait) live in the `fieldqc-core` crate.
//!
//! ## Quick Start
//!
//! ```bash
//! fqc init                                          # create database
//! fqc fetch --from 2024-03-01 --to 2024-03-07       # preview
//! fqc fetch --from 2024-03-01 --to 2024-03-07 --import
//! fqc stats
//! fqc serve                                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Provider fetch errors |
//! | [`traits`] | The [`OrderProvider`](traits::OrderProvider) seam |
//! | [`provider`] | HTTP provider client |
//! | [`pager`] | Search pagination |
//! | [`completion`] | Concurrent completion batches |
//! | [`pipeline`] | Fetch orchestration |
//! | [`import`] | Sequential batched import |
//! | [`sqlite_store`] | SQLite order store |
//! | [`remote_store`] | Remote import endpoint store |
//! | [`progress`] | Progress reporting |
//! | [`stats`] | Database statistics |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod migrate;
pub mod pager;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod remote_store;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod traits;
