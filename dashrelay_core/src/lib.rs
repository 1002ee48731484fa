//! # dashrelay
//!
//!
//! Crate providing training orchestration for a reinforcement learning agent that plays
//! a platform-runner level hosted by an external game process.
//! Game and trainer exchange one fixed-layout record through a shared memory segment,
//! the level is split into ordered _slices_ learned one after another and every mastered
//! slice leaves an _expert_ policy that is later used to relay the agent back to the
//! frontier of training.
//!
//! Neural networks are not part of this crate, they are plugged in through traits from
//! [`agent`]. Torch based implementation lives in `dashrelay_rl`.
//! ## Licence: MIT

/// Binary layout of the record shared with game process.
pub mod frame;
/// Shared memory region and two-flag handshake.
pub mod channel;
/// Normalised observation vectors and frame stacking.
pub mod observation;
/// Reward shaping for ground and flight modes.
pub mod reward;
/// Step/reset interface built on top of the channel.
pub mod env;
/// Slices, rolling success window and promotion gate.
pub mod curriculum;
/// Traits binding learning policies to the orchestration layer.
pub mod agent;
/// Uniform replay memory.
pub mod replay;
/// Expert weights cache and checkpoint file layout.
pub mod expert;
/// Navigation through mastered slices using cached experts.
pub mod relay;
/// Top level training loop.
pub mod orchestrator;
/// Structures used for error handling in crate.
pub mod error;
/// Simulated game process and scripted agent used to exercise the crate without the game.
pub mod demo;
