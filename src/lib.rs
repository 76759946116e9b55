//! Hockey data ingestion and cross-source reconciliation engine.
//!
//! Pulls game and player data from the NHL's JSON API, its HTML report
//! pages, and a handful of scraped line-combination/starting-goalie
//! pages, tracks per-item download progress durably, and reconciles the
//! resulting facts against each other to surface discrepancies.
//!
//! # Architecture
//!
//! - [`db`] - SQLite connection pool and migrations
//! - [`config`] - structured configuration surfaces (C1-C12)
//! - [`error`] - crate-level error aggregation
//! - [`download`] - HTTP client, rate limiter, retry executor (C1-C3)
//! - [`sources`] - the closed source registry and every adapter (C4, C7)
//! - [`model`] - parsed entity types shared across adapters and rules
//! - [`progress`] - durable per-item download progress tracking (C5/C6)
//! - [`batch`] - the batch coordinator driving one ingestion run (C9)
//! - [`validation`] - validation rules and the reconciliation engine (C10/C11)
//! - [`autovalidate`] - the auto-validation worker (C12)

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod autovalidate;
pub mod batch;
pub mod config;
pub mod db;
pub mod download;
pub mod error;
pub mod model;
pub mod progress;
pub mod sources;
pub mod validation;

pub use db::Database;
pub use download::{HttpClient, RateLimiter, RetryPolicy, classify_error};
pub use error::IngestError;
