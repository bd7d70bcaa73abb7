//! Repository layer for a provisioned dataset.
//!
//! Ingestion writes students and their recordings through [`Repository`];
//! the schema itself is created by the provisioner beforehand.

use super::schema::{validate_schema_name, Table};
use super::sqlite::bound_options;
use crate::domain::{
    ExamTerm, HrvParameter, IbiSample, MasterDataRecord, StudentCode, WindowValueRecord,
};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info};

/// Open a connection pool on an already provisioned database.
///
/// Foreign keys are enforced on every pooled connection.
///
/// # Errors
/// Returns an error if the name is invalid or the database does not exist.
pub async fn open_dataset(data_dir: &Path, schema: &str) -> Result<SqlitePool, sqlx::Error> {
    validate_schema_name(schema).map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(bound_options(data_dir, schema))
        .await?;

    info!("Opened dataset {} in {}", schema, data_dir.display());
    Ok(pool)
}

/// Fact-table row counts for one student.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StudentRowCounts {
    pub inter_beat_intervals: i64,
    pub master_data: i64,
    pub window_values: i64,
}

/// Repository for dataset operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Lookup data
    // =========================================================================

    /// Primary key of an exam term.
    ///
    /// # Errors
    /// Returns `RowNotFound` if the lookup table was not seeded.
    pub async fn term_id(&self, term: ExamTerm) -> Result<i64, sqlx::Error> {
        let (id,): (i64,) = sqlx::query_as("SELECT id FROM exam WHERE term = ?")
            .bind(term.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    /// Primary key of an HRV parameter.
    pub async fn parameter_id(&self, parameter: HrvParameter) -> Result<i64, sqlx::Error> {
        let (id,): (i64,) = sqlx::query_as("SELECT id FROM hrv WHERE parameter = ?")
            .bind(parameter.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    /// Exam term names in insertion order.
    pub async fn exam_terms(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT term FROM exam ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(term,)| term).collect())
    }

    /// HRV parameter names in insertion order.
    pub async fn hrv_parameters(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT parameter FROM hrv ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(parameter,)| parameter).collect())
    }

    // =========================================================================
    // Students
    // =========================================================================

    /// Insert a student and return its primary key.
    ///
    /// # Errors
    /// Returns a database error if the code is already present.
    pub async fn insert_student(&self, code: &StudentCode) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO dataset (student_id) VALUES (?)")
            .bind(code.as_str())
            .execute(&self.pool)
            .await?;
        debug!("Inserted student {}", code);
        Ok(result.last_insert_rowid())
    }

    /// Primary key of a student, if present.
    pub async fn student_pk(&self, code: &StudentCode) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM dataset WHERE student_id = ?")
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Delete a student. Their IBI, master-data and window rows go with them.
    ///
    /// Returns whether a student was deleted.
    pub async fn delete_student(&self, code: &StudentCode) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM dataset WHERE student_id = ?")
            .bind(code.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Fact tables
    // =========================================================================

    /// Insert a raw IBI recording in a single transaction.
    ///
    /// Returns the number of inserted rows.
    pub async fn insert_ibi_batch(
        &self,
        student_pk: i64,
        term: ExamTerm,
        samples: &[IbiSample],
    ) -> Result<usize, sqlx::Error> {
        if samples.is_empty() {
            return Ok(0);
        }

        let term_id = self.term_id(term).await?;
        let mut tx = self.pool.begin().await?;

        for sample in samples {
            sqlx::query(
                r#"
                INSERT INTO inter_beat_interval (student_id, term_id, ibi_value_id, ibi_value, timestamp)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(student_pk)
            .bind(term_id)
            .bind(sample.ibi_value_id)
            .bind(sample.ibi_value)
            .bind(sample.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            "Inserted {} ibi samples for student {} ({})",
            samples.len(),
            student_pk,
            term
        );
        Ok(samples.len())
    }

    /// Insert the per-exam aggregate of a student.
    ///
    /// # Errors
    /// Returns a database error if the student already has a row for the term.
    pub async fn insert_master_data(
        &self,
        student_pk: i64,
        record: &MasterDataRecord,
    ) -> Result<i64, sqlx::Error> {
        let term_id = self.term_id(record.term).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO master_data (student_id, term_id, grade, nni_mean, sdnn, number_of_ibi, duration_in_h)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(student_pk)
        .bind(term_id)
        .bind(record.grade)
        .bind(record.nni_mean)
        .bind(record.sdnn)
        .bind(record.number_of_ibi)
        .bind(record.duration_in_h)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Insert windowed HRV values in a single transaction.
    pub async fn insert_window_values(
        &self,
        student_pk: i64,
        term: ExamTerm,
        values: &[WindowValueRecord],
    ) -> Result<usize, sqlx::Error> {
        if values.is_empty() {
            return Ok(0);
        }

        let term_id = self.term_id(term).await?;
        let mut parameter_ids = Vec::with_capacity(HrvParameter::ALL.len());
        for parameter in HrvParameter::ALL {
            parameter_ids.push((parameter, self.parameter_id(parameter).await?));
        }

        let mut tx = self.pool.begin().await?;
        for value in values {
            let parameter_id = parameter_ids
                .iter()
                .find(|(parameter, _)| *parameter == value.parameter)
                .map(|(_, id)| *id)
                .ok_or(sqlx::Error::RowNotFound)?;

            sqlx::query(
                r#"
                INSERT INTO window_values (student_id, term_id, window_id, timestamp, parameter_id, hrv_value, number_of_ibi)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(student_pk)
            .bind(term_id)
            .bind(value.window_id)
            .bind(value.timestamp)
            .bind(parameter_id)
            .bind(value.hrv_value)
            .bind(value.number_of_ibi)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(values.len())
    }

    // =========================================================================
    // Counts
    // =========================================================================

    /// Number of rows in `table`.
    pub async fn count_rows(&self, table: Table) -> Result<i64, sqlx::Error> {
        // Table names come from a closed enum.
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table.name()))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Fact-table row counts for one student.
    pub async fn count_student_rows(&self, student_pk: i64) -> Result<StudentRowCounts, sqlx::Error> {
        let (inter_beat_intervals, master_data, window_values): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM inter_beat_interval WHERE student_id = ?1),
                (SELECT COUNT(*) FROM master_data WHERE student_id = ?1),
                (SELECT COUNT(*) FROM window_values WHERE student_id = ?1)
            "#,
        )
        .bind(student_pk)
        .fetch_one(&self.pool)
        .await?;

        Ok(StudentRowCounts {
            inter_beat_intervals,
            master_data,
            window_values,
        })
    }
}
