use thiserror::Error;

#[derive(Error, Debug)]
pub enum MagsafError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{datasets} experimental datasets do not match {channels} field directions")]
    DataShapeMismatch { datasets: usize, channels: usize },

    #[error("Length mismatch: expected {expected} values, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Unsupported unit: {0}")]
    UnsupportedUnit(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("At most {0} experimental datasets can be loaded")]
    TooManyDatasets(usize),

    #[error("Optimizer error: {0}")]
    Optimizer(String),

    #[error("Another simulation or fit is already running")]
    Busy,

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MagsafError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type MagsafResult<T> = Result<T, MagsafError>;
