//! Connection lifecycle: establish with bounded retry, release exactly once.
//!
//! A [`ConnectionManager`] hands out [`Session`] guards. A session owns its
//! connection exclusively and releases it either through [`Session::close`]
//! or, on every other exit path (early return, `?`, panic, dropped future),
//! through `Drop`.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Error returned when no connection could be established.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("could not connect to database after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
}

/// Opens and releases connections for a [`ConnectionManager`].
///
/// `database` is `None` for a server-scoped session and `Some(name)` for a
/// session bound to an existing database.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Send;

    async fn connect(&self, database: Option<&str>) -> Result<Self::Connection, sqlx::Error>;

    /// Graceful release, used by [`Session::close`] and [`Session::rebind`].
    async fn close(&self, conn: Self::Connection) -> Result<(), sqlx::Error>;

    /// Synchronous release, used when a session is dropped without `close`.
    fn abandon(&self, conn: Self::Connection) {
        drop(conn);
    }
}

/// How many times to retry a failed connection attempt and how long to wait
/// before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts made after the first one fails.
    pub max_retries: u32,
    /// Fixed wait before every retry.
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
        }
    }

    /// Retry without waiting. Meant for tests and local tooling.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO)
    }

    /// Total number of attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Constant backoff that gives up after `max_retries` waits.
#[derive(Debug, Clone)]
pub struct FixedRetry {
    interval: Duration,
    max_retries: u32,
    remaining: u32,
}

impl FixedRetry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            interval: policy.interval,
            max_retries: policy.max_retries,
            remaining: policy.max_retries,
        }
    }
}

impl Backoff for FixedRetry {
    fn reset(&mut self) {
        self.remaining = self.max_retries;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.interval)
    }
}

/// Configuration errors cannot be fixed by waiting; everything else is
/// retried.
fn classify(err: sqlx::Error) -> backoff::Error<sqlx::Error> {
    match err {
        sqlx::Error::Configuration(_) => backoff::Error::permanent(err),
        err => backoff::Error::transient(err),
    }
}

/// Owns a [`Connector`] and the retry policy applied to every acquisition.
///
/// There is no pooling: each [`acquire`](Self::acquire) opens its own
/// connection.
#[derive(Debug)]
pub struct ConnectionManager<C: Connector> {
    connector: C,
    policy: RetryPolicy,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self { connector, policy }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Open a session, retrying failed attempts according to the policy.
    ///
    /// Waiting between attempts is a timer await, so dropping the returned
    /// future aborts the retry loop.
    ///
    /// # Errors
    /// Returns [`ConnectionError::Exhausted`] with the last underlying cause
    /// once every attempt has failed, or right after the first attempt when
    /// the connector reports a configuration error.
    pub async fn acquire(&self, database: Option<&str>) -> Result<Session<'_, C>, ConnectionError> {
        let conn = self.connect(database).await?;
        Ok(Session {
            manager: self,
            conn: Some(conn),
            database: database.map(str::to_owned),
        })
    }

    async fn connect(&self, database: Option<&str>) -> Result<C::Connection, ConnectionError> {
        let attempts = AtomicU32::new(0);
        let connector = &self.connector;
        let target = database.unwrap_or("<server>");

        let result = backoff::future::retry_notify(
            FixedRetry::new(self.policy),
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                async move {
                    connector.connect(database).await.map_err(classify)
                }
            },
            |err: sqlx::Error, wait: Duration| {
                debug!(
                    "Connection to {} failed ({}), retrying in {:?}",
                    target, err, wait
                );
            },
        )
        .await;

        let attempts = attempts.load(Ordering::Relaxed);
        match result {
            Ok(conn) => {
                debug!("Connected to {} after {} attempt(s)", target, attempts);
                Ok(conn)
            }
            Err(source) => {
                error!(
                    "Could not connect to {} after {} attempts: {}",
                    target, attempts, source
                );
                Err(ConnectionError::Exhausted { attempts, source })
            }
        }
    }

    async fn release(&self, conn: C::Connection) {
        if let Err(e) = self.connector.close(conn).await {
            warn!("Error while closing connection: {}", e);
        }
    }
}

/// Scope guard around one live connection.
///
/// Dereferences to the connector's connection type. The connection is
/// released exactly once, by [`close`](Self::close) or by `Drop`.
pub struct Session<'m, C: Connector> {
    manager: &'m ConnectionManager<C>,
    // Some(_) for the whole lifetime of the guard; taken only on release.
    conn: Option<C::Connection>,
    database: Option<String>,
}

impl<C: Connector> Session<'_, C> {
    /// Database the session is bound to, `None` when server-scoped.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Replace the underlying connection with one bound to `database`.
    ///
    /// The previous connection is released once the new one is open. On
    /// failure the session keeps its previous binding.
    pub async fn rebind(&mut self, database: Option<&str>) -> Result<(), ConnectionError> {
        let fresh = self.manager.connect(database).await?;
        if let Some(old) = self.conn.replace(fresh) {
            self.manager.release(old).await;
        }
        self.database = database.map(str::to_owned);
        Ok(())
    }

    /// Release the connection gracefully.
    pub async fn close(mut self) {
        if let Some(conn) = self.conn.take() {
            self.manager.release(conn).await;
        }
    }
}

impl<C: Connector> std::fmt::Debug for Session<'_, C>
where
    C::Connection: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.database)
            .field("conn", &self.conn)
            .finish()
    }
}

// `conn` is only taken by `close` and `Drop`, both of which consume the
// guard, so it is always present while the guard can be dereferenced.
impl<C: Connector> Deref for Session<'_, C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_ref()
            .expect("session connection is present until release")
    }
}

impl<C: Connector> DerefMut for Session<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_mut()
            .expect("session connection is present until release")
    }
}

impl<C: Connector> Drop for Session<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            debug!(
                "Session for {} dropped without close, releasing connection",
                self.database.as_deref().unwrap_or("<server>")
            );
            self.manager.connector.abandon(conn);
        }
    }
}
