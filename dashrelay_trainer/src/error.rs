use std::path::PathBuf;
use thiserror::Error;
use dashrelay_core::error::DashError;
use dashrelay_rl::error::DashRlError;

#[derive(Error, Debug)]
pub enum TrainerError{
    #[error("Dashrelay error: {0}")]
    Dash(#[from] DashError),
    #[error("Learning backend error: {0}")]
    Rl(#[from] DashRlError),
    #[error("Settings file {path:?} is not usable: {reason}")]
    Settings{
        path: PathBuf,
        reason: String,
    },
    #[error("Journal file {path:?}: {explanation}")]
    Journal{
        path: PathBuf,
        explanation: String,
    },
    #[error("Tensorboard error in context: {context}: {error}")]
    Tboard{
        context: String,
        error: String,
    },
}
