//! SQLite rendition of a database server.
//!
//! The server is a data directory and every database is one file in it,
//! `<data_dir>/<name>.sqlite3`. A server-scoped session is an in-memory
//! connection used to create databases through `ATTACH`; a bound session is
//! a connection to the database file with foreign keys enforced.

use super::connection::Connector;
use super::schema::{validate_schema_name, SchemaError};
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteSynchronous,
};
use sqlx::{ConnectOptions, Connection};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// File extension of database files inside the data directory.
pub const DATABASE_EXTENSION: &str = "sqlite3";

const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// Path of database `name` inside `data_dir`.
pub fn database_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{}.{}", name, DATABASE_EXTENSION))
}

/// Connect options for a session bound to an existing database file.
pub fn bound_options(data_dir: &Path, name: &str) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(database_path(data_dir, name))
        .create_if_missing(false)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
}

/// Opens sessions against a data directory.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    data_dir: PathBuf,
}

impl SqliteConnector {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    type Connection = SqliteHandle;

    async fn connect(&self, database: Option<&str>) -> Result<SqliteHandle, sqlx::Error> {
        let options = match database {
            None => {
                tokio::fs::create_dir_all(&self.data_dir).await?;
                // ATTACH inherits the open flags of this connection: plain
                // ":memory:" keeps SQLITE_OPEN_MEMORY out of them and
                // create_if_missing puts SQLITE_OPEN_CREATE in.
                SqliteConnectOptions::new()
                    .filename(":memory:")
                    .create_if_missing(true)
                    .foreign_keys(true)
            }
            Some(name) => {
                validate_schema_name(name)
                    .map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;
                bound_options(&self.data_dir, name)
            }
        };

        let conn = options.connect().await?;
        debug!(
            "Opened session on {} ({})",
            self.data_dir.display(),
            database.unwrap_or("server")
        );
        Ok(SqliteHandle {
            conn,
            data_dir: self.data_dir.clone(),
        })
    }

    async fn close(&self, handle: SqliteHandle) -> Result<(), sqlx::Error> {
        handle.conn.close().await
    }
}

/// Live connection plus the data directory it belongs to.
///
/// Catalog operations (`database_exists`, `create_database`,
/// `drop_database`) act on the data directory; SQL goes through
/// [`connection`](Self::connection).
#[derive(Debug)]
pub struct SqliteHandle {
    conn: SqliteConnection,
    data_dir: PathBuf,
}

impl SqliteHandle {
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Whether database `name` exists in the catalog.
    pub async fn database_exists(&self, name: &str) -> Result<bool, SchemaError> {
        validate_schema_name(name)?;
        let path = database_path(&self.data_dir, name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SchemaError::Catalog {
                context: format!("lookup of database {}", name),
                source,
            }),
        }
    }

    /// Create an empty database file.
    ///
    /// # Errors
    /// Returns [`SchemaError::DatabaseExists`] if the database is already
    /// present.
    pub async fn create_database(&mut self, name: &str) -> Result<(), SchemaError> {
        if self.database_exists(name).await? {
            return Err(SchemaError::DatabaseExists(name.to_string()));
        }

        let path = database_path(&self.data_dir, name);
        let context = format!("create database {}", name);

        // The name is a validated identifier; the path is bound.
        sqlx::query(&format!("ATTACH DATABASE ? AS \"{}\"", name))
            .bind(path.to_string_lossy().into_owned())
            .execute(&mut self.conn)
            .await
            .map_err(SchemaError::statement(context.clone()))?;
        // Writing the header materializes the file.
        sqlx::query(&format!("PRAGMA \"{}\".user_version = 1", name))
            .execute(&mut self.conn)
            .await
            .map_err(SchemaError::statement(context.clone()))?;
        sqlx::query(&format!("DETACH DATABASE \"{}\"", name))
            .execute(&mut self.conn)
            .await
            .map_err(SchemaError::statement(context))?;

        info!("Created database {} at {}", name, path.display());
        Ok(())
    }

    /// Remove database `name` and everything stored in it.
    pub async fn drop_database(&mut self, name: &str) -> Result<(), SchemaError> {
        validate_schema_name(name)?;
        let path = database_path(&self.data_dir, name);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SchemaError::UnknownDatabase(name.to_string()))
            }
            Err(source) => {
                return Err(SchemaError::Catalog {
                    context: format!("drop database {}", name),
                    source,
                })
            }
        }

        for suffix in SIDECAR_SUFFIXES {
            let mut sidecar = path.clone().into_os_string();
            sidecar.push(suffix);
            match tokio::fs::remove_file(&sidecar).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(SchemaError::Catalog {
                        context: format!("drop database {}", name),
                        source,
                    })
                }
            }
        }

        info!("Dropped database {}", name);
        Ok(())
    }
}
