//! Reward shaping. Strategy is chosen per frame from the mode reported by the game.
//! Terminal rewards (death, slice clear) are applied by the environment before a strategy is consulted.
mod ground;
mod flight;

pub use ground::*;
pub use flight::*;

use serde::{Deserialize, Serialize};
use crate::frame::{Action, PlayerMode, RawFrame};

/// Per episode shaping context, threaded through reward computations.
/// Environment creates fresh one on every reset.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ShapingState{
    /// Hazards passed in this episode.
    pub hazards_cleared: u32,
    /// Action chosen on previous decision step.
    pub previous_action: Option<Action>,
}

/// Everything a strategy needs to score one frame.
#[derive(Copy, Clone, Debug)]
pub struct RewardInput<'a>{
    pub frame: &'a RawFrame,
    pub action: Action,
    pub previous_percent: f32,
    pub previous_hazard_distance: Option<f32>,
}

/// Parameters of both strategies.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig{
    pub ground: GroundParams,
    pub flight: FlightParams,
}

/// Bonus for clearing hazards, growing with number of hazards already cleared in episode.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardBonus{
    pub base: f32,
    pub step: f32,
    pub cap: f32,
}

impl Default for HazardBonus{
    fn default() -> Self {
        Self{base: 10.0, step: 10.0, cap: 50.0}
    }
}

impl HazardBonus{
    pub fn value(&self, cleared_before: u32) -> f32{
        (self.base + cleared_before as f32 * self.step).min(self.cap)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RewardStrategy{
    Ground(GroundParams),
    Flight(FlightParams),
}

impl RewardStrategy{
    pub fn for_mode(mode: PlayerMode, config: &RewardConfig) -> Self{
        match mode{
            PlayerMode::Ground => RewardStrategy::Ground(config.ground.clone()),
            PlayerMode::Flight => RewardStrategy::Flight(config.flight.clone()),
        }
    }

    pub fn mode(&self) -> PlayerMode{
        match self{
            RewardStrategy::Ground(_) => PlayerMode::Ground,
            RewardStrategy::Flight(_) => PlayerMode::Flight,
        }
    }

    /// Shaped reward for one frame and shaping state for the next one.
    pub fn reward(&self, input: &RewardInput, state: ShapingState) -> (f32, ShapingState){
        match self{
            RewardStrategy::Ground(p) => p.reward(input, state),
            RewardStrategy::Flight(p) => p.reward(input, state),
        }
    }

    /// Whether switching into this strategy's mode from `previous_mode` should discard policy weights.
    pub fn should_reset_weights(&self, previous_mode: PlayerMode) -> bool{
        previous_mode != self.mode()
    }
}

pub(crate) fn progress_term(input: &RewardInput, scale: f32) -> f32{
    let delta = input.frame.percent - input.previous_percent;
    if delta > 0.0 { delta * scale } else { 0.0 }
}

pub(crate) fn action_term(input: &RewardInput, state: &ShapingState, active_penalty: f32, spam_penalty: f32) -> f32{
    if !input.action.is_active(){
        return 0.0
    }
    match state.previous_action{
        Some(Action::Hold) => -active_penalty - spam_penalty,
        _ => -active_penalty
    }
}

/// Small bonus when distance to hazard grows while it was close.
pub(crate) fn clearance_term(input: &RewardInput, threshold: f32, bonus: f32) -> f32{
    match input.previous_hazard_distance{
        Some(prev) if prev < threshold && input.frame.hazard_distance > prev => bonus,
        _ => 0.0
    }
}

/// Nearest hazard was within threshold and now nearest one is beyond it, so it was passed.
pub(crate) fn hazard_cleared_term(input: &RewardInput, threshold: f32, bonus: &HazardBonus, state: &mut ShapingState) -> f32{
    match input.previous_hazard_distance{
        Some(prev) if prev < threshold && input.frame.hazard_distance >= threshold => {
            let r = bonus.value(state.hazards_cleared);
            state.hazards_cleared += 1;
            r
        },
        _ => 0.0
    }
}
