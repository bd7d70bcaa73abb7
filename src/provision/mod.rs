//! Schema provisioning: existence check, conflict resolution, DDL and seeds.
//!
//! A provisioning pass runs on one server-scoped session:
//! 1. look the schema up in the catalog
//! 2. if present, ask the [`ConflictResolver`] whether to retain or replace it
//! 3. create the database and rebind the session to it
//! 4. create the tables in dependency order and seed the lookup tables inside
//!    one transaction
//! 5. commit
//!
//! A failure after the database was created rolls the transaction back and
//! drops the database again.

pub mod resolver;

pub use resolver::{
    parse_answer, ConflictResolver, DecisionError, FixedResolver, PromptResolver, Resolution,
};

use crate::db::connection::{ConnectionManager, Session};
use crate::db::schema::{self, validate_schema_name, SchemaError};
use crate::db::sqlite::SqliteConnector;
use crate::error::ProvisionError;
use serde::{Deserialize, Serialize};
use sqlx::Connection;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of a successful provisioning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProvisionOutcome {
    /// A fresh schema was created. `replaced` is set when an existing one was
    /// dropped first.
    Created { replaced: bool },
    /// The schema already existed and was left untouched.
    Retained,
}

impl std::fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionOutcome::Created { replaced: false } => write!(f, "created"),
            ProvisionOutcome::Created { replaced: true } => write!(f, "replaced"),
            ProvisionOutcome::Retained => write!(f, "retained"),
        }
    }
}

/// Creates the dataset schema on top of a [`ConnectionManager`].
pub struct SchemaProvisioner {
    manager: ConnectionManager<SqliteConnector>,
    resolver: Arc<dyn ConflictResolver>,
}

impl SchemaProvisioner {
    pub fn new(
        manager: ConnectionManager<SqliteConnector>,
        resolver: Arc<dyn ConflictResolver>,
    ) -> Self {
        Self { manager, resolver }
    }

    pub fn manager(&self) -> &ConnectionManager<SqliteConnector> {
        &self.manager
    }

    /// Provision schema `schema_name`.
    ///
    /// # Errors
    /// - [`ProvisionError::Connection`] if no connection could be established
    /// - [`ProvisionError::Schema`] for an invalid name or a failed catalog,
    ///   DDL or seed statement
    /// - [`ProvisionError::Decision`] if the resolver could not produce an
    ///   answer
    pub async fn provision(&self, schema_name: &str) -> Result<ProvisionOutcome, ProvisionError> {
        validate_schema_name(schema_name)?;

        let mut session = self.manager.acquire(None).await?;
        let mut replaced = false;

        if session.database_exists(schema_name).await? {
            info!("Schema {} already exists", schema_name);
            match self.resolver.resolve(schema_name).await? {
                Resolution::Retain => {
                    info!("Keeping existing schema {}", schema_name);
                    session.close().await;
                    return Ok(ProvisionOutcome::Retained);
                }
                Resolution::Replace => {
                    session.drop_database(schema_name).await?;
                    info!("Schema {} deleted", schema_name);
                    replaced = true;
                }
            }
        }

        session.create_database(schema_name).await?;
        self.populate_or_discard(&mut session, schema_name).await?;
        session.close().await;

        info!("Provisioned schema {}", schema_name);
        Ok(ProvisionOutcome::Created { replaced })
    }

    /// Fill a freshly created database, dropping it again if anything fails.
    async fn populate_or_discard(
        &self,
        session: &mut Session<'_, SqliteConnector>,
        schema_name: &str,
    ) -> Result<(), ProvisionError> {
        match self.populate(session, schema_name).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!("Provisioning of {} failed: {}", schema_name, err);
                self.discard(session, schema_name).await;
                Err(err)
            }
        }
    }

    async fn populate(
        &self,
        session: &mut Session<'_, SqliteConnector>,
        schema_name: &str,
    ) -> Result<(), ProvisionError> {
        session.rebind(Some(schema_name)).await?;

        let mut tx = session
            .connection()
            .begin()
            .await
            .map_err(SchemaError::statement("begin transaction"))?;

        schema::create_tables(&mut tx).await?;
        schema::seed_lookup_data(&mut tx).await?;

        tx.commit()
            .await
            .map_err(SchemaError::statement("commit"))?;
        Ok(())
    }

    async fn discard(&self, session: &mut Session<'_, SqliteConnector>, schema_name: &str) {
        if session.database().is_some() {
            if let Err(e) = session.rebind(None).await {
                warn!("Could not return to server session: {}", e);
                return;
            }
        }
        match session.drop_database(schema_name).await {
            Ok(()) => info!("Dropped incomplete schema {}", schema_name),
            Err(e) => warn!("Could not drop incomplete schema {}: {}", schema_name, e),
        }
    }
}
