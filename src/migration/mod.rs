//! Schema migrations.
//!
//! Migrations are compiled into the binary and applied at startup by the
//! [`Migrator`]. Applied versions are tracked in `stockroom_migrations`
//! together with a checksum of their statements; a checksum that no longer
//! matches stops startup instead of silently diverging.

pub mod checksum;
pub mod error;
pub mod migration;
pub mod migrator;
pub mod schema;
pub mod state_table;

pub use error::MigrationError;
pub use migration::{Migration, MigrationRecord};
pub use migrator::{MigrationStatus, Migrator};
