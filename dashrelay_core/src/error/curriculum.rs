use std::path::PathBuf;
use thiserror::Error;

/// Error in curriculum definition or progress persistence.
#[derive(Debug, Error)]
pub enum CurriculumError{
    #[error("Curriculum definition {path:?} cannot be read: {source}")]
    DefinitionUnreadable{
        path: PathBuf,
        #[source]
        source: std::io::Error
    },
    #[error("Curriculum definition {path:?} is malformed: {source}")]
    DefinitionMalformed{
        path: PathBuf,
        #[source]
        source: serde_json::Error
    },
    #[error("Invalid slice list: {reason}")]
    InvalidSlices{
        reason: String
    },
    #[error("Failed persisting curriculum progress to {path:?}: {explanation}")]
    PersistFailed{
        path: PathBuf,
        explanation: String
    },
}
