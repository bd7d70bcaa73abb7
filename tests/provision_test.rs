//! End-to-end provisioning against a temporary data directory.

use async_trait::async_trait;
use hrv_dataset::db::sqlite::database_path;
use hrv_dataset::domain::{IbiSample, MasterDataRecord};
use hrv_dataset::provision::DecisionError;
use hrv_dataset::{
    open_dataset, ConflictResolver, ConnectionError, ConnectionManager, ExamTerm, FixedResolver,
    PromptResolver, ProvisionError, ProvisionOutcome, Repository, Resolution, RetryPolicy,
    SchemaError, SchemaProvisioner, SqliteConnector, StudentCode, Table,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const SCHEMA: &str = "hrv_study";

/// Resolver that records how often it was asked.
#[derive(Debug)]
struct CountingResolver {
    resolution: Resolution,
    calls: AtomicU32,
}

impl CountingResolver {
    fn new(resolution: Resolution) -> Arc<Self> {
        Arc::new(Self {
            resolution,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ConflictResolver for CountingResolver {
    async fn resolve(&self, _schema: &str) -> Result<Resolution, DecisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.resolution)
    }
}

fn provisioner(temp_dir: &TempDir, resolver: Arc<dyn ConflictResolver>) -> SchemaProvisioner {
    let manager = ConnectionManager::new(
        SqliteConnector::new(temp_dir.path()),
        RetryPolicy::immediate(0),
    );
    SchemaProvisioner::new(manager, resolver)
}

async fn open_repo(temp_dir: &TempDir) -> Repository {
    let pool = open_dataset(temp_dir.path(), SCHEMA)
        .await
        .expect("open_dataset failed");
    Repository::new(pool)
}

async fn table_names(repo: &Repository) -> Vec<String> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(repo.pool())
    .await
    .unwrap();
    rows.into_iter().map(|(name,)| name).collect()
}

async fn insert_sample_student(repo: &Repository, code: &str) -> i64 {
    let code = StudentCode::parse(code).unwrap();
    let pk = repo.insert_student(&code).await.unwrap();
    repo.insert_ibi_batch(
        pk,
        ExamTerm::Mid1,
        &[
            IbiSample {
                ibi_value_id: 1,
                ibi_value: 812,
                timestamp: 0,
            },
            IbiSample {
                ibi_value_id: 2,
                ibi_value: 790,
                timestamp: 812,
            },
        ],
    )
    .await
    .unwrap();
    repo.insert_master_data(
        pk,
        &MasterDataRecord {
            term: ExamTerm::Mid1,
            grade: 78,
            nni_mean: 801.0,
            sdnn: 11.0,
            number_of_ibi: 2,
            duration_in_h: 0.0004,
        },
    )
    .await
    .unwrap();
    pk
}

#[tokio::test]
async fn test_fresh_provisioning() {
    let temp_dir = TempDir::new().unwrap();
    let resolver = CountingResolver::new(Resolution::Retain);
    let provisioner = provisioner(&temp_dir, resolver.clone());

    let outcome = provisioner.provision(SCHEMA).await.unwrap();
    assert_eq!(outcome, ProvisionOutcome::Created { replaced: false });
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);

    let repo = open_repo(&temp_dir).await;
    assert_eq!(
        table_names(&repo).await,
        vec![
            "dataset",
            "exam",
            "hrv",
            "inter_beat_interval",
            "master_data",
            "window_values"
        ]
    );

    for table in [
        Table::Dataset,
        Table::InterBeatInterval,
        Table::MasterData,
        Table::WindowValues,
    ] {
        assert_eq!(repo.count_rows(table).await.unwrap(), 0, "{} not empty", table);
    }
    assert_eq!(repo.count_rows(Table::Exam).await.unwrap(), 3);
    assert_eq!(repo.count_rows(Table::Hrv).await.unwrap(), 2);
}

#[tokio::test]
async fn test_seeded_lookup_rows() {
    let temp_dir = TempDir::new().unwrap();
    provisioner(&temp_dir, Arc::new(FixedResolver(Resolution::Retain)))
        .provision(SCHEMA)
        .await
        .unwrap();

    let repo = open_repo(&temp_dir).await;
    assert_eq!(repo.exam_terms().await.unwrap(), vec!["mid1", "mid2", "final"]);
    assert_eq!(repo.hrv_parameters().await.unwrap(), vec!["nni_mean", "sdnn"]);
}

#[tokio::test]
async fn test_retain_leaves_existing_schema_untouched() {
    let temp_dir = TempDir::new().unwrap();
    provisioner(&temp_dir, Arc::new(FixedResolver(Resolution::Retain)))
        .provision(SCHEMA)
        .await
        .unwrap();

    let repo = open_repo(&temp_dir).await;
    insert_sample_student(&repo, "S1").await;
    let before: Vec<(i64, i64, i64)> =
        sqlx::query_as("SELECT id, student_id, ibi_value FROM inter_beat_interval ORDER BY id")
            .fetch_all(repo.pool())
            .await
            .unwrap();

    let resolver = CountingResolver::new(Resolution::Retain);
    let outcome = provisioner(&temp_dir, resolver.clone())
        .provision(SCHEMA)
        .await
        .unwrap();
    assert_eq!(outcome, ProvisionOutcome::Retained);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

    let after: Vec<(i64, i64, i64)> =
        sqlx::query_as("SELECT id, student_id, ibi_value FROM inter_beat_interval ORDER BY id")
            .fetch_all(repo.pool())
            .await
            .unwrap();
    assert_eq!(before, after);
    assert_eq!(repo.count_rows(Table::Dataset).await.unwrap(), 1);
    assert_eq!(repo.count_rows(Table::MasterData).await.unwrap(), 1);
    assert_eq!(repo.count_rows(Table::Exam).await.unwrap(), 3);
}

#[tokio::test]
async fn test_replace_recreates_schema_with_seed_rows_only() {
    let temp_dir = TempDir::new().unwrap();
    provisioner(&temp_dir, Arc::new(FixedResolver(Resolution::Retain)))
        .provision(SCHEMA)
        .await
        .unwrap();

    let repo = open_repo(&temp_dir).await;
    insert_sample_student(&repo, "S1").await;
    insert_sample_student(&repo, "S2").await;
    repo.pool().close().await;

    let outcome = provisioner(&temp_dir, Arc::new(FixedResolver(Resolution::Replace)))
        .provision(SCHEMA)
        .await
        .unwrap();
    assert_eq!(outcome, ProvisionOutcome::Created { replaced: true });

    let repo = open_repo(&temp_dir).await;
    assert_eq!(repo.count_rows(Table::Dataset).await.unwrap(), 0);
    assert_eq!(repo.count_rows(Table::InterBeatInterval).await.unwrap(), 0);
    assert_eq!(repo.count_rows(Table::MasterData).await.unwrap(), 0);
    assert_eq!(repo.exam_terms().await.unwrap(), vec!["mid1", "mid2", "final"]);
    assert_eq!(repo.hrv_parameters().await.unwrap(), vec!["nni_mean", "sdnn"]);
}

#[tokio::test]
async fn test_prompt_decides_replace_after_invalid_input() {
    let temp_dir = TempDir::new().unwrap();
    provisioner(&temp_dir, Arc::new(FixedResolver(Resolution::Retain)))
        .provision(SCHEMA)
        .await
        .unwrap();

    let prompt = PromptResolver::new(&b"later\nY\n"[..], Vec::new());
    let outcome = provisioner(&temp_dir, Arc::new(prompt))
        .provision(SCHEMA)
        .await
        .unwrap();
    assert_eq!(outcome, ProvisionOutcome::Created { replaced: true });
}

#[tokio::test]
async fn test_closed_prompt_input_aborts_without_changes() {
    let temp_dir = TempDir::new().unwrap();
    provisioner(&temp_dir, Arc::new(FixedResolver(Resolution::Retain)))
        .provision(SCHEMA)
        .await
        .unwrap();

    let prompt = PromptResolver::new(&b""[..], Vec::new());
    let err = provisioner(&temp_dir, Arc::new(prompt))
        .provision(SCHEMA)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProvisionError::Decision(DecisionError::InputClosed)
    ));

    let repo = open_repo(&temp_dir).await;
    assert_eq!(repo.count_rows(Table::Exam).await.unwrap(), 3);
}

#[tokio::test]
async fn test_check_and_create_use_the_same_name() {
    let temp_dir = TempDir::new().unwrap();
    let resolver = CountingResolver::new(Resolution::Retain);
    let provisioner = provisioner(&temp_dir, resolver.clone());

    provisioner.provision("first_study").await.unwrap();
    let outcome = provisioner.provision("second_study").await.unwrap();

    assert_eq!(outcome, ProvisionOutcome::Created { replaced: false });
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    assert!(database_path(temp_dir.path(), "first_study").is_file());
    assert!(database_path(temp_dir.path(), "second_study").is_file());
}

#[tokio::test]
async fn test_invalid_schema_name_is_rejected_before_io() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("never_created");
    let manager = ConnectionManager::new(SqliteConnector::new(&data_dir), RetryPolicy::immediate(0));
    let provisioner = SchemaProvisioner::new(manager, Arc::new(FixedResolver(Resolution::Replace)));

    let err = provisioner.provision("../outside").await.unwrap_err();
    assert!(matches!(err, ProvisionError::Schema(SchemaError::InvalidName(_))));
    assert!(!data_dir.exists());
}

#[tokio::test]
async fn test_connection_failure_propagates_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    // A regular file where the data directory should be makes every
    // server-scoped connection attempt fail.
    let blocked = temp_dir.path().join("blocked");
    std::fs::write(&blocked, b"not a directory").unwrap();

    let manager = ConnectionManager::new(SqliteConnector::new(&blocked), RetryPolicy::immediate(2));
    let provisioner = SchemaProvisioner::new(manager, Arc::new(FixedResolver(Resolution::Replace)));

    match provisioner.provision(SCHEMA).await {
        Err(ProvisionError::Connection(ConnectionError::Exhausted { attempts, .. })) => {
            assert_eq!(attempts, 3)
        }
        other => panic!("expected connection error, got {:?}", other),
    }
}
