use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlagError {
    #[error("experiment {0} not found")]
    ExperimentNotFound(String),
    #[error("data integrity error: {0}")]
    DataIntegrityError(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to compute assignment hash: {0}")]
    HashingError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}
