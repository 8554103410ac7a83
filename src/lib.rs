//! # Stockroom
//!
//! Coroutine-native retail inventory service on the `may` runtime.
//!
//! Products, stores and per-store stock levels are plain REST resources.
//! Stock only moves through the [`Ledger`]: a transfer debits one store,
//! credits another and appends a movement record in a single transaction,
//! so the total quantity of a product across all stores never changes and
//! no stock level ever goes below zero.
//!
//! Two storage backends implement the same [`store::Backend`] trait:
//! [`PgBackend`] over a pooled `may_postgres` connection set, and
//! [`MemoryBackend`] for tests and local runs.

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod http;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod pool;
pub mod store;
pub mod transaction;

pub use config::AppConfig;
pub use connection::{connect, ConnectionError};
pub use error::ApiError;
pub use executor::{DbError, DbErrorKind, PgExecutor, SqlExecutor};
pub use http::{serve, Api, ApiResponse};
pub use ledger::Ledger;
pub use migration::Migrator;
pub use pool::{DbPool, PooledConnection};
pub use store::{Backend, MemoryBackend, PgBackend, StoreError};
pub use transaction::{IsolationLevel, Transaction};
