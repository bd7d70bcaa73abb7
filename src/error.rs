use crate::db::connection::ConnectionError;
use crate::db::schema::SchemaError;
use crate::provision::resolver::DecisionError;
use thiserror::Error;

/// Error returned by a provisioning pass.
///
/// Connection failures pass through unchanged so callers see the root cause.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Decision(#[from] DecisionError),
}
