mod q_selector;
mod exploration;
mod dqn;

pub use q_selector::*;
pub use exploration::*;
pub use dqn::*;
