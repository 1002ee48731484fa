//! Relay navigation.
//!
//! Before slice `S` can be trained the player must be brought to `S.start`. Current policy is not
//! trusted with that, instead every already mastered slice is flown by its own expert: after each step
//! the slice containing current progress is looked up, and if its expert is cached the agent's weights
//! are swapped to it. Once the target is reached the game is asked to set a practice checkpoint,
//! so later resets respawn there.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::agent::ExpertPolicy;
use crate::channel::SharedRegion;
use crate::curriculum::{Slice, SliceSet};
use crate::env::RunnerEnvironment;
use crate::error::{DashError, RelayError};
use crate::expert::ExpertCache;
use crate::observation::Observation;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig{
    /// Distance (in percent) before slice start at which checkpoint is placed.
    pub run_up: f32,
    pub max_attempts: u32,
}

impl Default for RelayConfig{
    fn default() -> Self {
        Self{run_up: 0.5, max_attempts: 15}
    }
}

/// Switch of active expert during relay.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Handoff{
    pub percent: f32,
    pub slice_id: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelayReport{
    pub target: f32,
    /// Number of attempts used, `0` when no relay was needed.
    pub attempts: u32,
    pub reached_percent: f32,
    /// Hand-offs made in the successful attempt.
    pub handoffs: Vec<Handoff>,
}

pub struct RelayNavigator{
    config: RelayConfig,
    stop: Option<Arc<AtomicBool>>,
}

impl RelayNavigator{
    pub fn new(config: RelayConfig) -> Self{
        Self{config, stop: None}
    }

    /// Flag checked before every attempt, raised flag ends navigation with [`RelayError::Interrupted`].
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self{
        self.stop = Some(stop);
        self
    }

    fn check_stop(&self, attempts: u32) -> Result<(), RelayError>{
        match &self.stop{
            Some(stop) if stop.load(Ordering::Relaxed) => {
                #[cfg(feature = "log_warn")]
                log::warn!("[Relay] Stop requested after {} attempt(s)", attempts);
                Err(RelayError::Interrupted {attempts})
            },
            _ => Ok(())
        }
    }

    pub fn config(&self) -> &RelayConfig{
        &self.config
    }

    /// Progress at which relay for `slice` stops.
    pub fn target_for(&self, slice: &Slice) -> f32{
        (slice.start - self.config.run_up).max(0.0)
    }

    fn handoff<A: ExpertPolicy>(
        agent: &mut A,
        experts: &ExpertCache<A::Weights>,
        slice: Option<&Slice>,
        percent: f32,
        active: &mut Option<u32>,
        handoffs: &mut Vec<Handoff>,
        allowed: impl Fn(&Slice) -> bool,
    ) -> Result<(), DashError>{
        let slice = match slice{
            Some(s) if allowed(s) && *active != Some(s.id) => s,
            _ => return Ok(())
        };
        if let Some(weights) = experts.get(slice.id){
            agent.load_weights(weights)?;
            *active = Some(slice.id);
            handoffs.push(Handoff{percent, slice_id: slice.id});
            #[cfg(feature = "log_info")]
            log::info!("[Relay] {:.1}% -> expert {}", percent, slice.id);
        }
        Ok(())
    }

    /// Brings player to [`target_for`](RelayNavigator::target_for) `target_slice` using cached experts of slices
    /// preceding it, then requests checkpoint. Environment should have `target_slice` set as active slice.
    ///
    /// Agent is left with weights of the last expert used, caller is responsible for restoring its own.
    pub fn navigate<R: SharedRegion, A: ExpertPolicy>(
        &self,
        env: &mut RunnerEnvironment<R>,
        agent: &mut A,
        experts: &ExpertCache<A::Weights>,
        slices: &SliceSet,
        target_slice: &Slice,
    ) -> Result<RelayReport, DashError>{
        let target = self.target_for(target_slice);
        if target_slice.start <= 0.0{
            return Ok(RelayReport{target, attempts: 0, reached_percent: 0.0, handoffs: Vec::new()})
        }
        #[cfg(feature = "log_info")]
        log::info!("[Relay] Target {:.1}% for slice {}, experts available: {:?}", target, target_slice.id, experts.ids());

        let mut best = 0.0f32;
        for attempt in 1..=self.config.max_attempts{
            self.check_stop(attempt - 1)?;
            let mut observation: Observation = env.reset();
            let mut active = None;
            let mut handoffs = Vec::new();
            loop{
                let action = agent.act_greedy(&observation)?;
                let step = env.step(action);
                observation = step.observation;
                let percent = step.info.percent;
                best = best.max(percent);

                Self::handoff(agent, experts, slices.slice_at(percent), percent, &mut active, &mut handoffs,
                    |s| s.id < target_slice.id)?;

                if percent >= target{
                    env.channel_mut().send_checkpoint();
                    #[cfg(feature = "log_info")]
                    log::info!("[Relay] Reached {:.1}% in attempt {}, checkpoint set", percent, attempt);
                    return Ok(RelayReport{target, attempts: attempt, reached_percent: percent, handoffs})
                }
                if step.terminated || step.truncated{
                    #[cfg(feature = "log_warn")]
                    log::warn!("[Relay] Attempt {} failed at {:.1}%", attempt, percent);
                    break;
                }
            }
        }
        Err(RelayError::Exhausted {target, attempts: self.config.max_attempts, best_percent: best}.into())
    }

    /// Greedy run through whole level, each slice flown by its own cached expert.
    /// Environment should have no active slice. Succeeds when level end is reached.
    pub fn play_through<R: SharedRegion, A: ExpertPolicy>(
        &self,
        env: &mut RunnerEnvironment<R>,
        agent: &mut A,
        experts: &ExpertCache<A::Weights>,
        slices: &SliceSet,
    ) -> Result<RelayReport, DashError>{
        let target = 100.0;
        let mut best = 0.0f32;
        for attempt in 1..=self.config.max_attempts{
            self.check_stop(attempt - 1)?;
            let mut observation = env.reset();
            let start = env.last_frame().map(|f| f.percent).unwrap_or(0.0);
            let mut active = None;
            let mut handoffs = Vec::new();
            Self::handoff(agent, experts, slices.slice_at(start), start, &mut active, &mut handoffs, |_| true)?;
            loop{
                let step = env.step(agent.act_greedy(&observation)?);
                observation = step.observation;
                let percent = step.info.percent;
                best = best.max(percent);
                if percent >= target || (step.terminated && !step.info.died){
                    #[cfg(feature = "log_info")]
                    log::info!("Level completed in attempt {}", attempt);
                    return Ok(RelayReport{target, attempts: attempt, reached_percent: percent, handoffs})
                }
                if step.terminated || step.truncated{
                    #[cfg(feature = "log_info")]
                    log::info!("Attempt {} ended at {:.1}%", attempt, percent);
                    break;
                }
                Self::handoff(agent, experts, slices.slice_at(percent), percent, &mut active, &mut handoffs, |_| true)?;
            }
        }
        Err(RelayError::Exhausted {target, attempts: self.config.max_attempts, best_percent: best}.into())
    }
}
