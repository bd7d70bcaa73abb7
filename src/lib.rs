pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod provision;

pub use config::Config;
pub use db::{
    open_dataset, ConnectionError, ConnectionManager, Connector, Repository, RetryPolicy,
    SchemaError, Session, SqliteConnector, Table,
};
pub use domain::{ExamTerm, HrvParameter, StudentCode};
pub use error::ProvisionError;
pub use provision::{
    ConflictResolver, FixedResolver, PromptResolver, ProvisionOutcome, Resolution,
    SchemaProvisioner,
};
