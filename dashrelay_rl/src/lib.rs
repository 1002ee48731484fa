//! # dashrelay_rl
//! Torch backed learning policy for [`dashrelay_core`].
//! Crate provides dueling Q network, epsilon greedy action selection and Double DQN agent
//! implementing [`LearningAgent`](dashrelay_core::agent::LearningAgent),
//! so it can be driven by [`Orchestrator`](dashrelay_core::orchestrator::Orchestrator).
//! ## Licence: MIT

/// Neural network wrapper and dueling Q network built on [`tch`] crate.
pub mod torch_net;
/// Error types defined in this crate.
pub mod error;
/// Action selection, exploration schedule and Double DQN agent.
pub mod policy;
/// Named tensor snapshots used as expert and checkpoint files.
pub mod weights;

/// Reexports compatible [`tch`]
pub use tch;
