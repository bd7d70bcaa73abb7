//! Database module for SQLite operations.
//!
//! This module provides:
//! - Connection lifecycle with bounded retry and scoped release
//! - The SQLite server rendition (data directory, catalog operations)
//! - Schema definitions, dependency-ordered DDL and lookup seeding
//! - Repository layer used by ingestion on a provisioned database

pub mod connection;
pub mod repo;
pub mod schema;
pub mod sqlite;

pub use connection::{ConnectionError, ConnectionManager, Connector, RetryPolicy, Session};
pub use repo::{open_dataset, Repository, StudentRowCounts};
pub use schema::{SchemaError, Table, TableDef, TABLES};
pub use sqlite::{SqliteConnector, SqliteHandle};
