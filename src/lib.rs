//! # Patient Search
//!
//! Tenant-isolated fuzzy search over patient names on catalogued medical
//! documents, plus a cache for the short-lived credentials clients need to
//! reach the speech and blob storage services.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐   ┌──────────┐
//! │  register    │──▶│ patient-search-core │◀──│  SQLite   │
//! │ (filenames)  │   │ normalize/score/rank│   │ documents │
//! └──────────────┘   └─────────┬──────────┘   └──────────┘
//!                              │
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!             ┌──────────┐           ┌──────────┐   ┌──────────────┐
//!             │   CLI    │           │   HTTP   │──▶│ credentials  │
//!             │(psearch) │           │  (axum)  │   │ bearer / SAS │
//!             └──────────┘           └──────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! psearch init
//! psearch register --user clinic-1 "4000123456_GARCIA LOPEZ, MARIA_6001467010_EMER.pdf"
//! psearch search "garcia" --user clinic-1
//! psearch serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite-backed patient index |
//! | [`ingest`] | Document registration from filenames |
//! | [`search`] | CLI search commands |
//! | [`credentials`] | Credential cache and generators |
//! | [`tokens`] | CLI token commands |
//! | [`error`] | HTTP error envelope |
//! | [`server`] | HTTP server |

pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod tokens;
