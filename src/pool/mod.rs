//! Connection pooling.

pub mod config;
pub mod manager;
mod slots;

pub use manager::{DbPool, PooledConnection};
