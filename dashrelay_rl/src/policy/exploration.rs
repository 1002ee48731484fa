use serde::{Deserialize, Serialize};

/// Exponentially decaying exploration rate.
///
/// `epsilon(steps) = end + (origin - end) * exp(-(steps - anchor) / decay)`, where `origin`
/// is the configured start value until [`restart_from`](EpsilonSchedule::restart_from) moves it.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpsilonSchedule{
    end: f64,
    decay: f64,
    origin: f64,
    anchor: u64,
}

impl EpsilonSchedule{
    pub fn new(start: f64, end: f64, decay: f64) -> Self{
        Self{end, decay: decay.max(f64::MIN_POSITIVE), origin: start, anchor: 0}
    }

    pub fn epsilon(&self, steps: u64) -> f64{
        let elapsed = steps.saturating_sub(self.anchor) as f64;
        let e = self.end + (self.origin - self.end) * (-elapsed / self.decay).exp();
        e.clamp(0.0, 1.0)
    }

    /// Continues decay from `epsilon` as observed at `steps`.
    pub fn restart_from(&mut self, epsilon: f64, steps: u64){
        self.origin = epsilon.clamp(0.0, 1.0);
        self.anchor = steps;
    }

    pub fn end(&self) -> f64{
        self.end
    }
}
