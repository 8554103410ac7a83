//! Migration trait and applied-migration records

use crate::migration::checksum::calculate_checksum;
use chrono::{DateTime, Utc};

/// A schema change compiled into the binary.
///
/// Versions are timestamps (`YYYYMMDDHHMMSS`) and are applied in ascending
/// order. Statements run inside one transaction, so a failing migration
/// leaves nothing behind.
pub trait Migration: Send + Sync {
    fn version(&self) -> i64;

    fn name(&self) -> &str;

    /// SQL statements, executed in order.
    fn statements(&self) -> Vec<String>;

    fn checksum(&self) -> String {
        calculate_checksum(&self.statements())
    }
}

/// Row of the `stockroom_migrations` state table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    /// `SHA-256` of the statements when the migration was applied
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    pub execution_time_ms: Option<i64>,
}
