use std::collections::VecDeque;
use serde::{Deserialize, Serialize};

/// Bounded FIFO of episode outcomes.
#[derive(Clone, Debug)]
pub struct RollingWindow{
    capacity: usize,
    outcomes: VecDeque<bool>,
    wins: usize,
}

impl RollingWindow{
    /// Capacity of `0` is treated as `1`.
    pub fn new(capacity: usize) -> Self{
        let capacity = capacity.max(1);
        Self{capacity, outcomes: VecDeque::with_capacity(capacity), wins: 0}
    }

    /// Pushes outcome and returns success rate of window.
    pub fn push(&mut self, won: bool) -> f32{
        if self.outcomes.len() == self.capacity{
            if let Some(true) = self.outcomes.pop_front(){
                self.wins -= 1;
            }
        }
        self.outcomes.push_back(won);
        if won{
            self.wins += 1;
        }
        self.success_rate()
    }

    /// Wins divided by number of stored outcomes, `0.0` for empty window.
    pub fn success_rate(&self) -> f32{
        if self.outcomes.is_empty(){
            0.0
        } else {
            self.wins as f32 / self.outcomes.len() as f32
        }
    }

    pub fn len(&self) -> usize{
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool{
        self.outcomes.is_empty()
    }

    pub fn capacity(&self) -> usize{
        self.capacity
    }

    pub fn clear(&mut self){
        self.outcomes.clear();
        self.wins = 0;
    }
}

/// Rule deciding when slice is mastered.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionGate{
    /// Minimal number of outcomes in window.
    pub min_episodes: usize,
    /// Minimal success rate.
    pub threshold: f32,
    /// Capacity of rolling window.
    pub window: usize,
}

impl Default for PromotionGate{
    fn default() -> Self {
        Self{min_episodes: 20, threshold: 0.7, window: 50}
    }
}

impl PromotionGate{
    pub fn is_open(&self, window: &RollingWindow) -> bool{
        window.len() >= self.min_episodes && window.success_rate() >= self.threshold
    }
}
