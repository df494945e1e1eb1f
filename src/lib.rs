//! # Mirsal Delivery Library
//!
//! This library provides the core functionality for the mirsal review invite
//! delivery service: webhook ingestion, the outbox delivery worker, webhook
//! retries with a dead letter queue, and server configuration.

pub mod auth;
pub mod channels;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod models;
pub mod outbox_worker;
pub mod rate_limit;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod webhook_retry;
pub mod webhook_verification;
pub use migration;
