//! sofa-admin: an administrative and analytics layer over CouchDB.
//!
//! The crate wraps CouchDB's HTTP API with a typed document gateway and
//! builds reporting, bulk transfer, and sample-data tooling on top of it:
//!
//! - [`config`] — layered TOML/environment configuration
//! - [`error`] — the store error taxonomy
//! - [`schema`] — document shapes and validating constructors
//! - [`store`] — the [`store::DocumentStore`] trait, its CouchDB
//!   implementation, and an in-memory store for tests
//! - [`views`] — map/reduce view definitions and native mirrors
//! - [`analytics`] — ad-hoc and view-backed aggregation reports
//! - [`transfer`] — export, import, backup, restore
//! - [`sample`] — sample-data generation and seeding
//! - [`stats`] — database status and statistics

pub mod analytics;
pub mod config;
pub mod error;
pub mod sample;
pub mod schema;
pub mod stats;
pub mod store;
pub mod transfer;
pub mod views;
