use serde::{Deserialize, Serialize};
use crate::reward::{action_term, clearance_term, hazard_cleared_term, progress_term, HazardBonus, RewardInput, ShapingState};

/// Flight (ship) mode shaping: progress, staying inside a vertical corridor and smooth vertical motion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightParams{
    pub progress_scale: f32,
    pub survival_bonus: f32,
    pub step_penalty: f32,
    pub thrust_penalty: f32,
    pub spam_thrust_penalty: f32,
    pub clearance_bonus: f32,
    pub hazard_proximity_threshold: f32,
    pub hazard_bonus: HazardBonus,
    /// Vertical position of corridor center.
    pub center_y: f32,
    /// Half width of corridor in which centering bonus is paid.
    pub center_band: f32,
    pub center_bonus: f32,
    /// Penalty per unit of distance from center outside corridor.
    pub off_center_penalty: f32,
    pub velocity_limit: f32,
    pub instability_penalty: f32,
}

impl Default for FlightParams{
    fn default() -> Self {
        Self{
            progress_scale: 10.0,
            survival_bonus: 0.05,
            step_penalty: 0.0001,
            thrust_penalty: 0.0005,
            spam_thrust_penalty: 0.001,
            clearance_bonus: 0.01,
            hazard_proximity_threshold: 30.0,
            hazard_bonus: HazardBonus::default(),
            center_y: 235.0,
            center_band: 15.0,
            center_bonus: 0.1,
            off_center_penalty: 0.0005,
            velocity_limit: 3.2,
            instability_penalty: 0.5,
        }
    }
}

impl FlightParams{
    fn centering(&self, y: f32) -> f32{
        let distance = (y - self.center_y).abs();
        if distance < self.center_band{
            self.center_bonus * (1.0 - distance / self.center_band)
        } else {
            -self.off_center_penalty * distance
        }
    }

    pub fn reward(&self, input: &RewardInput, mut state: ShapingState) -> (f32, ShapingState){
        let mut r = self.survival_bonus - self.step_penalty;
        r += progress_term(input, self.progress_scale);
        r += action_term(input, &state, self.thrust_penalty, self.spam_thrust_penalty);
        r += self.centering(input.frame.y);
        if input.frame.vel_y.abs() > self.velocity_limit{
            r -= self.instability_penalty;
        }
        r += clearance_term(input, self.hazard_proximity_threshold, self.clearance_bonus);
        r += hazard_cleared_term(input, self.hazard_proximity_threshold, &self.hazard_bonus, &mut state);
        (r, state)
    }
}

#[cfg(test)]
mod tests{
    use crate::frame::{Action, PlayerMode};
    use crate::reward::{FlightParams, RewardInput, ShapingState};
    use crate::reward::tests::frame;

    #[test]
    fn centered_flight_beats_drifting(){
        let p = FlightParams::default();
        let centered = frame(20.0, 500.0, PlayerMode::Flight);
        let mut drifting = centered;
        drifting.y = 400.0;
        let a = RewardInput{frame: &centered, action: Action::Release, previous_percent: 20.0, previous_hazard_distance: None};
        let b = RewardInput{frame: &drifting, ..a};
        let (ra, _) = p.reward(&a, ShapingState::default());
        let (rb, _) = p.reward(&b, ShapingState::default());
        assert!(ra > 0.0);
        assert!(rb < ra);
    }

    #[test]
    fn jerky_motion_is_penalized(){
        let p = FlightParams::default();
        let calm = frame(20.0, 500.0, PlayerMode::Flight);
        let mut jerky = calm;
        jerky.vel_y = -8.0;
        let a = RewardInput{frame: &calm, action: Action::Hold, previous_percent: 20.0, previous_hazard_distance: None};
        let b = RewardInput{frame: &jerky, ..a};
        let (ra, _) = p.reward(&a, ShapingState::default());
        let (rb, _) = p.reward(&b, ShapingState::default());
        assert!((ra - rb - p.instability_penalty).abs() < 1e-6);
    }

    #[test]
    fn repeated_thrust_costs_more(){
        let p = FlightParams::default();
        let f = frame(20.0, 500.0, PlayerMode::Flight);
        let input = RewardInput{frame: &f, action: Action::Hold, previous_percent: 20.0, previous_hazard_distance: None};
        let (single, _) = p.reward(&input, ShapingState{previous_action: Some(Action::Release), ..Default::default()});
        let (spam, _) = p.reward(&input, ShapingState{previous_action: Some(Action::Hold), ..Default::default()});
        assert!(spam < single);
        assert!((single - spam - p.spam_thrust_penalty).abs() < 1e-6);
    }
}
