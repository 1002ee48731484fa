use thiserror::Error;

/// Relay navigation failure. It is fatal for training run.
#[derive(Debug, Clone, Error)]
pub enum RelayError{
    #[error("Relay failed to reach {target:.1}% in {attempts} attempts (best {best_percent:.1}%)")]
    Exhausted{
        target: f32,
        attempts: u32,
        best_percent: f32,
    },
    #[error("Relay interrupted by stop request after {attempts} attempts")]
    Interrupted{
        attempts: u32,
    },
}
