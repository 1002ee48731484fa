use std::path::PathBuf;
use thiserror::Error;

/// Error reading or writing policy weights.
#[derive(Debug, Error)]
pub enum ExpertError{
    #[error("I/O error on {path:?}: {explanation}")]
    Io{
        path: PathBuf,
        explanation: String
    },
    #[error("Weights file {path:?} is not usable: {reason}")]
    Format{
        path: PathBuf,
        reason: String
    },
    #[error("Expert for slice {slice_id} is already written to {path:?}")]
    AlreadyWritten{
        slice_id: u32,
        path: PathBuf,
    },
}
