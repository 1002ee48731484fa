use serde::{Deserialize, Serialize};
use crate::reward::{action_term, clearance_term, hazard_cleared_term, progress_term, HazardBonus, RewardInput, ShapingState};

/// Ground (cube) mode shaping. Progress is the main signal, everything else is small.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundParams{
    pub progress_scale: f32,
    pub step_penalty: f32,
    pub jump_penalty: f32,
    pub spam_jump_penalty: f32,
    pub clearance_bonus: f32,
    pub hazard_proximity_threshold: f32,
    pub hazard_bonus: HazardBonus,
}

impl Default for GroundParams{
    fn default() -> Self {
        Self{
            progress_scale: 20.0,
            step_penalty: 0.0001,
            jump_penalty: 0.0005,
            spam_jump_penalty: 0.001,
            clearance_bonus: 0.01,
            hazard_proximity_threshold: 30.0,
            hazard_bonus: HazardBonus::default(),
        }
    }
}

impl GroundParams{
    pub fn reward(&self, input: &RewardInput, mut state: ShapingState) -> (f32, ShapingState){
        let mut r = progress_term(input, self.progress_scale);
        r -= self.step_penalty;
        r += action_term(input, &state, self.jump_penalty, self.spam_jump_penalty);
        r += clearance_term(input, self.hazard_proximity_threshold, self.clearance_bonus);
        r += hazard_cleared_term(input, self.hazard_proximity_threshold, &self.hazard_bonus, &mut state);
        (r, state)
    }
}
