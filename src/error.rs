use thiserror::Error;

/// Per-row input problems surfaced at submission time. All recoverable:
/// the user corrects the row and resubmits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("URL must be an absolute http or https URL")]
    InvalidUrl,
    #[error("validity must be an integer number of minutes >= 0")]
    InvalidValidity,
    #[error("shortcode must be 3-30 characters of A-Z, a-z, 0-9, '_' or '-'")]
    InvalidShortcode,
    #[error("shortcode '{0}' is already in use")]
    ShortcodeTaken(String),
}

/// Why a batch submission was rejected. Batches are all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: ValidationError,
    },
    #[error("batch of {rows} rows exceeds the limit of {max}")]
    TooManyRows { rows: usize, max: usize },
}

impl SubmissionError {
    /// Zero-based index of the offending row, if the failure is row-specific.
    pub fn row(&self) -> Option<usize> {
        match self {
            SubmissionError::Row { row, .. } => Some(*row),
            SubmissionError::TooManyRows { .. } => None,
        }
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            SubmissionError::Row { source, .. } => Some(source),
            SubmissionError::TooManyRows { .. } => None,
        }
    }
}

/// Failure to read or write the persisted blob.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Why the persisted state could not be used at construction.
#[derive(Debug, Error)]
pub enum StateLoadError {
    #[error("failed to read persisted state: {0}")]
    Read(#[from] StorageError),
    #[error("persisted state is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("persisted state is inconsistent: {0}")]
    Inconsistent(String),
}

/// Failure to deliver a log event to the remote sink.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("log transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("log sink answered with status {0}")]
    Status(reqwest::StatusCode),
}
