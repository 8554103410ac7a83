//! Migration state table management

use crate::executor::{DbError, SqlExecutor};
use crate::migration::MigrationRecord;
use may_postgres::Row;

/// Name of the state tracking table.
pub const STATE_TABLE: &str = "stockroom_migrations";

/// Create the state table if it does not exist yet.
///
/// # Errors
///
/// Returns the database error if the DDL fails.
pub fn initialize_state_table(executor: &dyn SqlExecutor) -> Result<(), DbError> {
    let sql = r#"
        CREATE TABLE IF NOT EXISTS stockroom_migrations (
            version BIGINT PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            checksum VARCHAR(64) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            execution_time_ms BIGINT
        )
    "#;
    executor.execute(sql, &[])?;
    Ok(())
}

fn record_from_row(row: &Row) -> Result<MigrationRecord, DbError> {
    let parse = |e: may_postgres::Error| DbError::Parse(format!("migration record: {e}"));
    Ok(MigrationRecord {
        version: row.try_get("version").map_err(parse)?,
        name: row.try_get("name").map_err(parse)?,
        checksum: row.try_get("checksum").map_err(parse)?,
        applied_at: row.try_get("applied_at").map_err(parse)?,
        execution_time_ms: row.try_get("execution_time_ms").map_err(parse)?,
    })
}

/// All applied migrations, oldest first.
///
/// # Errors
///
/// Returns the database error if the query fails or a row cannot be decoded.
pub fn applied_migrations(executor: &dyn SqlExecutor) -> Result<Vec<MigrationRecord>, DbError> {
    let sql = "SELECT version, name, checksum, applied_at, execution_time_ms \
               FROM stockroom_migrations ORDER BY version ASC";
    executor
        .query_all(sql, &[])?
        .iter()
        .map(record_from_row)
        .collect()
}

/// The record for one version, if it has been applied.
///
/// # Errors
///
/// Returns the database error if the query fails or the row cannot be decoded.
pub fn find_migration(
    executor: &dyn SqlExecutor,
    version: i64,
) -> Result<Option<MigrationRecord>, DbError> {
    let sql = "SELECT version, name, checksum, applied_at, execution_time_ms \
               FROM stockroom_migrations WHERE version = $1";
    executor
        .query_opt(sql, &[&version])?
        .as_ref()
        .map(record_from_row)
        .transpose()
}

/// # Errors
///
/// Returns the database error if the insert fails.
pub fn record_migration(
    executor: &dyn SqlExecutor,
    version: i64,
    name: &str,
    checksum: &str,
    execution_time_ms: i64,
) -> Result<(), DbError> {
    let sql = "INSERT INTO stockroom_migrations (version, name, checksum, execution_time_ms) \
               VALUES ($1, $2, $3, $4)";
    executor.execute(sql, &[&version, &name, &checksum, &execution_time_ms])?;
    Ok(())
}
