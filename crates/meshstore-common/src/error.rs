use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the mesh memory store.
///
/// `DataFormatWarning` deliberately has no variant here: a malformed embedding
/// or missing document field is logged at `warn` and absorbed by the
/// operation that produced it, never surfaced as an `Error`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("initialization error: {0}")]
    Initialization(String),

    #[error("backend io error: {0}")]
    BackendIo(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
