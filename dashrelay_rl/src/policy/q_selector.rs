use rand::Rng;
use tch::Tensor;

/// Enum used to select action from Q-values
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum QSelector{
    /// Always select action with maximal Q-value (do not explore)
    Max,
    /// With probability epsilon pick uniformly random action, otherwise select max
    EpsilonGreedy(f64),
}

impl QSelector{

    /// Index of selected action for single row of Q-values (shape `[actions]` or `[1, actions]`).
    pub fn select_q_value_index(&self, q_vals: &Tensor, exploring_enabled: bool) -> Option<usize>{
        let q_vals = q_vals.flatten(0, -1);
        let actions = q_vals.size().first().copied().unwrap_or(0);
        if actions <= 0{
            return None
        }
        if let (true, Self::EpsilonGreedy(epsilon)) = (exploring_enabled, self){
            let mut rng = rand::rng();
            if rng.random::<f64>() < *epsilon{
                return Some(rng.random_range(0..actions as usize))
            }
        }
        q_vals.argmax(0, false).f_int64_value(&[]).ok().map(|i| i as usize)
    }
}
