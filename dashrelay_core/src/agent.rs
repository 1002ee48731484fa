use std::path::Path;
use crate::error::{DashError, ExpertError};
use crate::frame::Action;
use crate::observation::Observation;
use crate::replay::{ReplayBuffer, Transition};

/// Serializable set of policy parameters.
pub trait PolicyWeights: Sized{
    /// File extension (without dot) used for weight files.
    const EXTENSION: &'static str;

    fn save_to(&self, path: &Path) -> Result<(), ExpertError>;
    fn load_from(path: &Path) -> Result<Self, ExpertError>;
}

/// Policy that can act without exploration and can have its parameters swapped.
/// This is all relay needs to fly through already mastered slices.
pub trait ExpertPolicy{
    type Weights: PolicyWeights;

    /// Best action according to current parameters.
    fn act_greedy(&mut self, observation: &Observation) -> Result<Action, DashError>;

    /// Replaces current parameters. Implementations should sync any auxiliary (e.g. target) networks.
    fn load_weights(&mut self, weights: &Self::Weights) -> Result<(), DashError>;
}

/// Everything a learning agent trains with: policy parameters and, when the agent has them,
/// auxiliary parameters (e.g. a lagging target network) that [`ExpertPolicy::load_weights`] overwrites.
#[derive(Clone, Debug)]
pub struct TrainingSnapshot<W>{
    pub policy: W,
    pub auxiliary: Option<W>,
}

/// Policy that is trained by orchestrator.
pub trait LearningAgent: ExpertPolicy{

    /// Action selected with exploration, used while training.
    fn act_exploring(&mut self, observation: &Observation) -> Result<Action, DashError>;

    /// Performs one learning step on sample from `memory`.
    /// Returns `None` when nothing was learned (e.g. memory too small).
    fn learn(&mut self, memory: &ReplayBuffer<Transition>) -> Result<Option<f32>, DashError>;

    /// Copy of current parameters.
    fn snapshot(&self) -> Result<Self::Weights, DashError>;

    /// Discards learned parameters and starts from fresh random initialisation.
    fn reinitialize(&mut self) -> Result<(), DashError>;

    /// Current exploration rate.
    fn exploration(&self) -> f64;

    /// Sets exploration rate. Any decay continues from this value.
    fn set_exploration(&mut self, epsilon: f64);

    /// Captures full training state, so it can be put back after experts were flown.
    fn training_snapshot(&self) -> Result<TrainingSnapshot<Self::Weights>, DashError>{
        Ok(TrainingSnapshot{policy: self.snapshot()?, auxiliary: None})
    }

    /// Restores state captured by [`training_snapshot`](LearningAgent::training_snapshot).
    fn restore_training_snapshot(&mut self, snapshot: &TrainingSnapshot<Self::Weights>) -> Result<(), DashError>{
        self.load_weights(&snapshot.policy)
    }

    fn save_checkpoint(&self, path: &Path) -> Result<(), DashError>{
        self.snapshot()?.save_to(path)?;
        Ok(())
    }

    fn load_checkpoint(&mut self, path: &Path) -> Result<(), DashError>{
        let weights = <Self::Weights as PolicyWeights>::load_from(path)?;
        self.load_weights(&weights)
    }
}
