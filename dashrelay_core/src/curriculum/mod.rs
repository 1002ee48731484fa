//! Curriculum of level slices.
//!
//! Slices are trained one after another. Outcome of every episode lands in a [`RollingWindow`],
//! and when [`PromotionGate`] opens the [`CurriculumManager`] moves on to the next slice.
mod slice;
mod window;
mod manager;

pub use slice::*;
pub use window::*;
pub use manager::*;
