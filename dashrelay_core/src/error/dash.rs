use thiserror::Error;
use crate::error::{ChannelError, CurriculumError, ExpertError, RelayError};

/// Top level crate error, constructed from more specific error.
#[derive(Debug, Error)]
pub enum DashError{
    /// Error attaching or talking to the game process.
    #[error("Channel error: {source}")]
    Channel{
        #[source]
        source: ChannelError
    },
    /// Error in curriculum definition or its persisted progress.
    #[error("Curriculum error: {source}")]
    Curriculum{
        #[source]
        source: CurriculumError
    },
    /// Error reading or writing expert weights.
    #[error("Expert error: {source}")]
    Expert{
        #[source]
        source: ExpertError
    },
    /// Relay could not bring agent to the start of training slice.
    #[error("Relay error: {source}")]
    Relay{
        #[source]
        source: RelayError
    },
    /// Error raised by policy implementation (e.g. neural network backend).
    #[error("Agent error: {context}")]
    Agent{
        context: String
    },
    /// Standard Input/Output error.
    #[error("Error in I/O operation: {explanation:}")]
    IO{
        explanation: String
    },
    /// Custom error to return if error does not fit any other category.
    #[error("Custom: {0}")]
    Custom(String),
}

impl From<ChannelError> for DashError{
    fn from(value: ChannelError) -> Self {
        Self::Channel{source: value}
    }
}

impl From<CurriculumError> for DashError{
    fn from(value: CurriculumError) -> Self {
        Self::Curriculum{source: value}
    }
}

impl From<ExpertError> for DashError{
    fn from(value: ExpertError) -> Self {
        Self::Expert{source: value}
    }
}

impl From<RelayError> for DashError{
    fn from(value: RelayError) -> Self {
        Self::Relay{source: value}
    }
}

impl From<std::io::Error> for DashError{
    fn from(value: std::io::Error) -> Self {
        Self::IO{explanation: format!("{value}")}
    }
}
