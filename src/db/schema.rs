//! Table definitions, dependency-ordered DDL and lookup seeding.
//!
//! Every fact table cascades deletes from `dataset`, so removing a student
//! removes all of their derived physiological data. SQLite only enforces
//! this while `PRAGMA foreign_keys` is on, which every bound session sets.

use crate::domain::{ExamTerm, HrvParameter};
use sqlx::sqlite::SqliteConnection;
use thiserror::Error;
use tracing::{debug, info};

/// Longest schema name accepted, matching common server identifier limits.
pub const MAX_SCHEMA_NAME_LEN: usize = 64;

/// Error type for catalog, DDL and seed operations.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(
        "invalid schema name {0:?}: expected 1-{} characters of [A-Za-z0-9_] not starting with a digit",
        MAX_SCHEMA_NAME_LEN
    )]
    InvalidName(String),
    #[error("database {0} already exists")]
    DatabaseExists(String),
    #[error("database {0} does not exist")]
    UnknownDatabase(String),
    #[error("cannot create table {table}: referenced table {target} does not exist")]
    MissingForeignKeyTarget { table: Table, target: Table },
    #[error("{context} failed: {source}")]
    Statement {
        context: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("{context} failed: {source}")]
    Catalog {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl SchemaError {
    pub(crate) fn statement(context: impl Into<String>) -> impl FnOnce(sqlx::Error) -> Self {
        let context = context.into();
        move |source| SchemaError::Statement { context, source }
    }
}

/// The six tables of the dataset schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Dataset,
    Exam,
    Hrv,
    InterBeatInterval,
    MasterData,
    WindowValues,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Dataset => "dataset",
            Table::Exam => "exam",
            Table::Hrv => "hrv",
            Table::InterBeatInterval => "inter_beat_interval",
            Table::MasterData => "master_data",
            Table::WindowValues => "window_values",
        }
    }

    pub fn definition(&self) -> &'static TableDef {
        // TABLES is laid out in declaration order of this enum.
        &TABLES[*self as usize]
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// DDL for one table together with the tables its foreign keys point at.
#[derive(Debug)]
pub struct TableDef {
    pub table: Table,
    pub references: &'static [Table],
    pub ddl: &'static str,
}

/// All tables in creation order: lookup tables first, then fact tables.
pub static TABLES: [TableDef; 6] = [
    TableDef {
        table: Table::Dataset,
        references: &[],
        ddl: r#"
        CREATE TABLE dataset (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL UNIQUE CHECK (length(student_id) BETWEEN 1 AND 5)
        )
        "#,
    },
    TableDef {
        table: Table::Exam,
        references: &[],
        ddl: r#"
        CREATE TABLE exam (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            term TEXT NOT NULL UNIQUE CHECK (length(term) <= 10)
        )
        "#,
    },
    TableDef {
        table: Table::Hrv,
        references: &[],
        ddl: r#"
        CREATE TABLE hrv (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parameter TEXT NOT NULL UNIQUE CHECK (length(parameter) <= 15)
        )
        "#,
    },
    TableDef {
        table: Table::InterBeatInterval,
        references: &[Table::Dataset, Table::Exam],
        ddl: r#"
        CREATE TABLE inter_beat_interval (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES dataset(id) ON DELETE CASCADE,
            term_id INTEGER NOT NULL REFERENCES exam(id),
            ibi_value_id INTEGER,
            ibi_value INTEGER,
            timestamp INTEGER
        )
        "#,
    },
    TableDef {
        table: Table::MasterData,
        references: &[Table::Dataset, Table::Exam],
        ddl: r#"
        CREATE TABLE master_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES dataset(id) ON DELETE CASCADE,
            term_id INTEGER NOT NULL REFERENCES exam(id),
            grade INTEGER,
            nni_mean REAL,
            sdnn REAL,
            number_of_ibi INTEGER,
            duration_in_h REAL,
            UNIQUE (student_id, term_id)
        )
        "#,
    },
    TableDef {
        table: Table::WindowValues,
        references: &[Table::Dataset, Table::Exam, Table::Hrv],
        ddl: r#"
        CREATE TABLE window_values (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES dataset(id) ON DELETE CASCADE,
            term_id INTEGER NOT NULL REFERENCES exam(id),
            window_id INTEGER,
            timestamp INTEGER,
            parameter_id INTEGER NOT NULL REFERENCES hrv(id),
            hrv_value REAL,
            number_of_ibi INTEGER
        )
        "#,
    },
];

/// Check that `name` can be used as a database name.
///
/// Names end up in DDL and file paths where they cannot be bound as
/// parameters, so only plain identifiers are accepted.
pub fn validate_schema_name(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && name.len() <= MAX_SCHEMA_NAME_LEN
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidName(name.to_string()))
    }
}

/// Whether `table` exists in the main database of `conn`.
pub async fn table_exists(conn: &mut SqliteConnection, table: Table) -> Result<bool, SchemaError> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table.name())
            .fetch_one(&mut *conn)
            .await
            .map_err(SchemaError::statement(format!("lookup of table {}", table)))?;
    Ok(count > 0)
}

/// Create one table after verifying that every table it references exists.
///
/// # Errors
/// Returns [`SchemaError::MissingForeignKeyTarget`] if a referenced table has
/// not been created yet.
pub async fn create_table(conn: &mut SqliteConnection, def: &TableDef) -> Result<(), SchemaError> {
    for target in def.references {
        if !table_exists(conn, *target).await? {
            return Err(SchemaError::MissingForeignKeyTarget {
                table: def.table,
                target: *target,
            });
        }
    }

    sqlx::query(def.ddl)
        .execute(&mut *conn)
        .await
        .map_err(SchemaError::statement(format!("create table {}", def.table)))?;
    debug!("Created table {}", def.table);
    Ok(())
}

/// Create all six tables in dependency order.
pub async fn create_tables(conn: &mut SqliteConnection) -> Result<(), SchemaError> {
    for def in &TABLES {
        create_table(conn, def).await?;
    }
    info!("Created {} tables", TABLES.len());
    Ok(())
}

/// Insert the fixed exam terms and HRV parameters, one statement per row.
pub async fn seed_lookup_data(conn: &mut SqliteConnection) -> Result<(), SchemaError> {
    for term in ExamTerm::ALL {
        sqlx::query("INSERT INTO exam (term) VALUES (?)")
            .bind(term.as_str())
            .execute(&mut *conn)
            .await
            .map_err(SchemaError::statement(format!("seed exam term {}", term)))?;
    }

    for parameter in HrvParameter::ALL {
        sqlx::query("INSERT INTO hrv (parameter) VALUES (?)")
            .bind(parameter.as_str())
            .execute(&mut *conn)
            .await
            .map_err(SchemaError::statement(format!(
                "seed hrv parameter {}",
                parameter
            )))?;
    }

    info!(
        "Seeded {} exam terms and {} hrv parameters",
        ExamTerm::ALL.len(),
        HrvParameter::ALL.len()
    );
    Ok(())
}
