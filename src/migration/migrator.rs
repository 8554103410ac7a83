//! Migrator - applies built-in migrations in version order

use crate::executor::{DbError, SqlExecutor};
use crate::migration::checksum::validate_checksum;
use crate::migration::state_table::{
    applied_migrations, find_migration, initialize_state_table, record_migration,
};
use crate::migration::{schema, Migration, MigrationError, MigrationRecord};
use crate::pool::PooledConnection;
use crate::transaction::IsolationLevel;
use std::time::Instant;

/// Advisory lock key shared by every instance migrating the same database.
const MIGRATION_LOCK_KEY: i64 = 0x5354_4f43_4b52_4d00;

/// Where each known migration stands.
#[derive(Debug, Default)]
pub struct MigrationStatus {
    pub applied: Vec<MigrationRecord>,
    pub pending: Vec<(i64, String)>,
}

pub struct Migrator {
    migrations: Vec<Box<dyn Migration>>,
}

impl Migrator {
    pub fn new(mut migrations: Vec<Box<dyn Migration>>) -> Self {
        migrations.sort_by_key(|m| m.version());
        Self { migrations }
    }

    /// Migrator over the schema this build ships with.
    pub fn builtin() -> Self {
        Self::new(schema::builtin())
    }

    pub fn migrations(&self) -> &[Box<dyn Migration>] {
        &self.migrations
    }

    /// Compare the state table with the known migrations, validating
    /// checksums of everything already applied.
    ///
    /// # Errors
    ///
    /// Returns `ChecksumMismatch` or `MissingMigration` if the database
    /// disagrees with this build, or the database error.
    pub fn status(&self, executor: &dyn SqlExecutor) -> Result<MigrationStatus, MigrationError> {
        initialize_state_table(executor)?;
        let applied = applied_migrations(executor)?;

        for record in &applied {
            let migration = self
                .migrations
                .iter()
                .find(|m| m.version() == record.version)
                .ok_or_else(|| MigrationError::MissingMigration {
                    version: record.version,
                    name: record.name.clone(),
                })?;
            validate_checksum(
                record.version,
                &record.name,
                &record.checksum,
                &migration.checksum(),
            )?;
        }

        let pending = self
            .migrations
            .iter()
            .filter(|m| !applied.iter().any(|r| r.version == m.version()))
            .map(|m| (m.version(), m.name().to_string()))
            .collect();

        Ok(MigrationStatus { applied, pending })
    }

    /// Apply every pending migration. Each one runs in its own transaction
    /// holding a transaction-scoped advisory lock, so concurrent instances
    /// apply it exactly once.
    ///
    /// # Errors
    ///
    /// Returns the first failure; migrations applied before it stay applied.
    pub fn up(&self, conn: &PooledConnection) -> Result<usize, MigrationError> {
        initialize_state_table(&conn.executor())?;

        let mut applied = 0;
        for migration in &self.migrations {
            let version = migration.version();
            let name = migration.name();
            let checksum = migration.checksum();

            let tx = conn.begin(IsolationLevel::ReadCommitted)?;
            tx.execute("SELECT pg_advisory_xact_lock($1)", &[&MIGRATION_LOCK_KEY])?;

            if let Some(record) = find_migration(&tx, version)? {
                validate_checksum(version, name, &record.checksum, &checksum)?;
                tx.commit().map_err(DbError::from)?;
                continue;
            }

            let start = Instant::now();
            for statement in migration.statements() {
                tx.execute(&statement, &[])
                    .map_err(|error| MigrationError::ExecutionFailed {
                        version,
                        name: name.to_string(),
                        error,
                    })?;
            }
            let elapsed = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);
            record_migration(&tx, version, name, &checksum, elapsed)?;
            tx.commit().map_err(DbError::from)?;

            log::info!("Applied migration {} ({}) in {} ms", version, name, elapsed);
            applied += 1;
        }

        if applied == 0 {
            log::debug!("Schema is up to date");
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(i64);

    impl Migration for Noop {
        fn version(&self) -> i64 {
            self.0
        }

        fn name(&self) -> &str {
            "noop"
        }

        fn statements(&self) -> Vec<String> {
            vec![format!("SELECT {}", self.0)]
        }
    }

    #[test]
    fn test_migrations_are_sorted_by_version() {
        let migrator = Migrator::new(vec![Box::new(Noop(3)), Box::new(Noop(1)), Box::new(Noop(2))]);
        let versions: Vec<i64> = migrator.migrations().iter().map(|m| m.version()).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[test]
    fn test_builtin_is_not_empty() {
        assert!(!Migrator::builtin().migrations().is_empty());
    }
}
