//! Fixed-size pool of `may_postgres` clients.
//!
//! `may_postgres` pipelines every statement of a client over one socket, so a
//! transaction must own its client exclusively until it ends. The pool keeps
//! `max_connections` slots behind a coroutine-aware semaphore;
//! [`DbPool::acquire`] takes one out and the returned [`PooledConnection`]
//! puts it back on drop. A client that fails its health check on checkout is
//! replaced with a fresh connection, so a database restart heals itself.

use crate::connection::{check_connection_health, connect};
use crate::executor::{DbError, PgExecutor};
use crate::pool::config::DatabaseConfig;
use crate::pool::slots::{Slots, TakeError};
use crate::transaction::{IsolationLevel, Transaction};
use may_postgres::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

pub struct DbPool {
    slots: Arc<Slots<Client>>,
    url: String,
    acquire_timeout: Duration,
}

impl DbPool {
    /// Open `config.max_connections` connections up front.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if any connection cannot be established.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let size = config.max_connections.max(1);
        let clients = (0..size)
            .map(|_| connect(&config.url).map_err(DbError::from))
            .collect::<Result<Vec<_>, _>>()?;
        log::info!("database pool ready with {size} connection(s)");

        Ok(Self {
            slots: Arc::new(Slots::new(clients)),
            url: config.url.clone(),
            acquire_timeout: Duration::from_secs(config.pool_timeout_seconds),
        })
    }

    /// Borrow a connection, waiting at most `pool_timeout_seconds`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Pool` when the wait times out or a dead connection
    /// cannot be re-opened.
    pub fn acquire(&self) -> Result<PooledConnection, DbError> {
        let start = Instant::now();
        let client = self
            .slots
            .take(
                self.acquire_timeout,
                |client| match check_connection_health(client) {
                    Ok(healthy) => healthy,
                    Err(e) => {
                        log::warn!("dropping pooled connection that failed its health check: {e}");
                        false
                    }
                },
                || connect(&self.url),
            )
            .map_err(|e| match e {
                TakeError::Timeout => DbError::Pool(format!(
                    "no connection available after {:?}",
                    self.acquire_timeout
                )),
                TakeError::Open(e) => DbError::Pool(format!("reconnect failed: {e}")),
            })?;

        #[cfg(feature = "metrics")]
        METRICS.observe_pool_wait(start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        Ok(PooledConnection {
            client,
            home: Arc::clone(&self.slots),
        })
    }

    pub fn size(&self) -> usize {
        self.slots.capacity()
    }

    /// Connections not currently checked out.
    pub fn idle(&self) -> usize {
        self.slots.idle()
    }
}

/// A client checked out of a [`DbPool`].
pub struct PooledConnection {
    client: Client,
    home: Arc<Slots<Client>>,
}

impl PooledConnection {
    fn client(&self) -> &Client {
        &self.client
    }

    /// An executor sharing this connection; valid while `self` is alive.
    pub fn executor(&self) -> PgExecutor {
        PgExecutor::new(self.client().clone())
    }

    /// Begin a transaction on this connection.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if `BEGIN` fails.
    pub fn begin(&self, isolation: IsolationLevel) -> Result<Transaction, DbError> {
        Ok(Transaction::new_with_isolation(self.client().clone(), isolation)?)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // Clients share their socket across clones.
        self.home.put(self.client.clone());
    }
}
