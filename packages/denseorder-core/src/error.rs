use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("inconsistent state: {0}")]
    InconsistentState(String),
}
