//! Training loop tying together environment, agent, curriculum, expert cache and relay.
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::agent::{LearningAgent, PolicyWeights};
use crate::channel::SharedRegion;
use crate::curriculum::{CurriculumManager, Slice};
use crate::env::RunnerEnvironment;
use crate::error::{DashError, ExpertError, RelayError};
use crate::expert::{CheckpointLayout, ExpertCache};
use crate::relay::{RelayConfig, RelayNavigator, RelayReport};
use crate::replay::{ReplayBuffer, Transition};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig{
    /// Current weights are saved every this many episodes.
    pub checkpoint_interval: u64,
    /// Replay memory must hold at least this many transitions before learning starts.
    pub batch_size: usize,
    pub replay_capacity: usize,
    /// Exploration rate after transferring weights from an expert of the same mode.
    pub transfer_epsilon: f64,
    /// Stop after this many training episodes.
    pub max_episodes: Option<u64>,
}

impl Default for OrchestratorConfig{
    fn default() -> Self {
        Self{
            checkpoint_interval: 50,
            batch_size: 64,
            replay_capacity: 50_000,
            transfer_epsilon: 0.5,
            max_episodes: None,
        }
    }
}

/// Result of single episode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary{
    pub episode: u64,
    pub slice_id: u32,
    pub percent: f32,
    pub reward: f32,
    pub won: bool,
    pub died: bool,
    pub steps: u64,
    pub epsilon: f64,
    /// Last loss reported by agent in this episode.
    pub loss: Option<f32>,
    /// Success rate of rolling window after this episode.
    pub success_rate: f32,
}

/// Receives notifications from training loop (journals, dashboards).
pub trait TrainingObserver{
    fn on_episode(&mut self, summary: &EpisodeSummary);

    /// Called after `mastered` slice was promoted. `next` is `None` when curriculum is complete.
    fn on_promotion(&mut self, _mastered: &Slice, _next: Option<&Slice>){}
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrainingOutcome{
    /// Last slice was mastered.
    CurriculumComplete,
    /// Stop flag was raised.
    Interrupted,
    /// Configured episode limit was reached.
    EpisodeLimit,
}

/// How policy was initialised for a slice.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PolicyInit{
    /// Loaded from the slice's current checkpoint.
    Resumed,
    /// Copied from expert of the most recent slice with the same mode.
    Transferred{from: u32},
    /// Previous slice has same mode but no expert is available, current weights are kept.
    Kept,
    /// Weights reinitialised, exploration at maximum.
    Fresh,
}

pub struct Orchestrator<R: SharedRegion, A: LearningAgent>{
    env: RunnerEnvironment<R>,
    agent: A,
    curriculum: CurriculumManager,
    experts: ExpertCache<A::Weights>,
    relay: RelayNavigator,
    replay: ReplayBuffer<Transition>,
    layout: CheckpointLayout,
    config: OrchestratorConfig,
    observer: Option<Box<dyn TrainingObserver>>,
    stop: Arc<AtomicBool>,
    episode: u64,
}

impl<R: SharedRegion, A: LearningAgent> Orchestrator<R, A>{
    pub fn new(
        env: RunnerEnvironment<R>,
        agent: A,
        curriculum: CurriculumManager,
        layout: CheckpointLayout,
        relay: RelayConfig,
        config: OrchestratorConfig,
    ) -> Self{
        let mut experts = ExpertCache::new(&layout);
        let _loaded = experts.load_all();
        #[cfg(feature = "log_info")]
        log::info!("Loaded {} experts into memory: {:?}", _loaded, experts.ids());
        let stop = Arc::new(AtomicBool::new(false));
        Self{
            env,
            agent,
            curriculum,
            experts,
            relay: RelayNavigator::new(relay).with_stop_flag(stop.clone()),
            replay: ReplayBuffer::new(config.replay_capacity),
            layout,
            config,
            observer: None,
            stop,
            episode: 0,
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn TrainingObserver>) -> Self{
        self.observer = Some(observer);
        self
    }

    /// Uses externally owned stop flag (e.g. one set by Ctrl-C handler).
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self{
        self.relay = self.relay.with_stop_flag(stop.clone());
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool>{
        self.stop.clone()
    }

    fn stop_requested(&self) -> bool{
        self.stop.load(Ordering::Relaxed)
    }

    pub fn agent(&self) -> &A{
        &self.agent
    }

    pub fn env(&self) -> &RunnerEnvironment<R>{
        &self.env
    }

    pub fn curriculum(&self) -> &CurriculumManager{
        &self.curriculum
    }

    pub fn experts(&self) -> &ExpertCache<A::Weights>{
        &self.experts
    }

    pub fn episode(&self) -> u64{
        self.episode
    }

    /// Brings the agent to the start of current slice and initialises its policy.
    /// Weights used by relay experts never stay in the training policy, auxiliary networks included.
    /// Raised stop flag ends relay with [`RelayError::Interrupted`].
    pub fn prepare_slice(&mut self) -> Result<PolicyInit, DashError>{
        let slice = self.curriculum.current_slice().clone();
        self.env.set_slice(Some(slice.clone()));
        if slice.start > 0.0{
            let own = self.agent.training_snapshot()?;
            let relay = self.relay.navigate(&mut self.env, &mut self.agent, &self.experts,
                self.curriculum.slices(), &slice);
            self.agent.restore_training_snapshot(&own)?;
            let _report: RelayReport = relay?;
            #[cfg(feature = "log_info")]
            log::info!("Relay reached {:.1}% after {} attempt(s) with {} hand-off(s)",
                _report.reached_percent, _report.attempts, _report.handoffs.len());
        }
        self.init_policy(&slice)
    }

    fn init_policy(&mut self, slice: &Slice) -> Result<PolicyInit, DashError>{
        let current = self.layout.current_path(slice.id, <A::Weights as PolicyWeights>::EXTENSION);
        if current.exists(){
            self.agent.load_checkpoint(&current)?;
            self.agent.set_exploration(self.config.transfer_epsilon);
            #[cfg(feature = "log_info")]
            log::info!("Slice {}: resumed from {:?}", slice.id, current);
            return Ok(PolicyInit::Resumed)
        }
        let same_mode = self.curriculum.slices().previous_with_mode(slice.id, slice.mode)
            .and_then(|s| self.experts.get(s.id).map(|w| (s.id, w)));
        if let Some((from, weights)) = same_mode{
            self.agent.load_weights(weights)?;
            self.agent.set_exploration(self.config.transfer_epsilon);
            #[cfg(feature = "log_info")]
            log::info!("Slice {}: transfer from expert of slice {} ({} mode)", slice.id, from, slice.mode);
            return Ok(PolicyInit::Transferred {from})
        }
        let strategy = self.env.reward_strategy(slice.mode);
        match self.curriculum.previous_slice(){
            Some(previous) if !strategy.should_reset_weights(previous.mode) => {
                self.agent.set_exploration(self.config.transfer_epsilon);
                #[cfg(feature = "log_warn")]
                log::warn!("Slice {}: no expert of same mode available, continuing with current weights", slice.id);
                Ok(PolicyInit::Kept)
            },
            _ => {
                self.agent.reinitialize()?;
                self.agent.set_exploration(1.0);
                #[cfg(feature = "log_info")]
                log::info!("Slice {}: new mode {} -> fresh policy", slice.id, slice.mode);
                Ok(PolicyInit::Fresh)
            }
        }
    }

    /// Runs one episode. Returns `None` if stop was requested before it ended.
    fn run_episode(&mut self, training: bool) -> Result<Option<EpisodeSummary>, DashError>{
        let slice_id = self.curriculum.current_slice().id;
        let slice_end = self.curriculum.current_slice().end;
        let mut observation = self.env.reset();
        let mut reward = 0.0;
        let mut loss = None;
        let mut steps = 0u64;
        let info = loop{
            if self.stop_requested(){
                return Ok(None)
            }
            let action = match training{
                true => self.agent.act_exploring(&observation)?,
                false => self.agent.act_greedy(&observation)?
            };
            let step = self.env.step(action);
            steps += 1;
            reward += step.reward;
            if training{
                self.replay.push(Transition{
                    observation,
                    action,
                    reward: step.reward,
                    next_observation: step.observation.clone(),
                    terminated: step.terminated,
                });
                if self.replay.len() >= self.config.batch_size{
                    if let Some(l) = self.agent.learn(&self.replay)?{
                        loss = Some(l);
                    }
                }
            }
            observation = step.observation;
            if step.terminated || step.truncated{
                break step.info;
            }
        };
        let won = info.percent >= slice_end;
        let success_rate = match training{
            true => {
                self.episode += 1;
                self.curriculum.update(won, steps)
            },
            false => self.curriculum.success_rate()
        };
        Ok(Some(EpisodeSummary{
            episode: self.episode,
            slice_id,
            percent: info.percent,
            reward,
            won,
            died: info.died,
            steps,
            epsilon: self.agent.exploration(),
            loss,
            success_rate,
        }))
    }

    /// Saves current weights of active slice together with curriculum progress.
    pub fn save_current(&mut self) -> Result<PathBuf, DashError>{
        let path = self.layout.current_path(self.curriculum.current_slice().id, <A::Weights as PolicyWeights>::EXTENSION);
        std::fs::create_dir_all(self.layout.root())
            .map_err(|e| ExpertError::Io {path: self.layout.root().to_path_buf(), explanation: format!("{e}")})?;
        self.agent.save_checkpoint(&path)?;
        self.curriculum.save_state()?;
        #[cfg(feature = "log_info")]
        log::info!("Checkpoint saved to {:?}", path);
        Ok(path)
    }

    /// Saves expert of mastered slice and moves on. Returns `true` when curriculum is complete.
    fn promote(&mut self) -> Result<bool, DashError>{
        let mastered = self.curriculum.current_slice().clone();
        #[cfg(feature = "log_info")]
        log::info!("Slice {} mastered with success rate {:.2}", mastered.id, self.curriculum.success_rate());
        match self.experts.save_one(mastered.id, self.agent.snapshot()?){
            Ok(_) | Err(ExpertError::AlreadyWritten {..}) => {},
            Err(e) => return Err(e.into())
        }
        if !self.curriculum.advance()?{
            #[cfg(feature = "log_info")]
            log::info!("Curriculum complete");
            if let Some(o) = self.observer.as_mut(){
                o.on_promotion(&mastered, None);
            }
            return Ok(true)
        }
        self.experts.load_all();
        if let Some(o) = self.observer.as_mut(){
            o.on_promotion(&mastered, Some(self.curriculum.current_slice()));
        }
        Ok(false)
    }

    /// Prepares current slice. Returns `false` when stop was requested during relay,
    /// in that case only curriculum progress is flushed: policy is not yet set up for the slice.
    fn enter_slice(&mut self) -> Result<bool, DashError>{
        match self.prepare_slice(){
            Ok(_) => Ok(true),
            Err(DashError::Relay {source: RelayError::Interrupted {..}}) => {
                self.curriculum.save_state()?;
                Ok(false)
            },
            Err(e) => Err(e)
        }
    }

    /// Trains until curriculum is complete, stop is requested or episode limit is reached.
    /// When stopped, current weights are flushed before returning.
    pub fn train(&mut self) -> Result<TrainingOutcome, DashError>{
        if !self.enter_slice()?{
            return Ok(TrainingOutcome::Interrupted)
        }
        #[cfg(feature = "log_info")]
        log::info!("Training slice {} [{:.1}%, {:.1}%)", self.curriculum.current_slice().id,
            self.curriculum.current_slice().start, self.curriculum.current_slice().end);
        loop{
            if self.stop_requested(){
                self.save_current()?;
                return Ok(TrainingOutcome::Interrupted)
            }
            if self.config.max_episodes.is_some_and(|max| self.episode >= max){
                self.save_current()?;
                return Ok(TrainingOutcome::EpisodeLimit)
            }
            let summary = match self.run_episode(true)?{
                Some(s) => s,
                None => {
                    self.save_current()?;
                    return Ok(TrainingOutcome::Interrupted)
                }
            };
            #[cfg(feature = "log_info")]
            log::info!("Ep {:<4} | Slice {} | Win% {:>5.1}% | % {:>5.1} | Reward {:>8.2} | Loss {:.4}",
                summary.episode, summary.slice_id, summary.success_rate * 100.0, summary.percent,
                summary.reward, summary.loss.unwrap_or(0.0));
            if let Some(o) = self.observer.as_mut(){
                o.on_episode(&summary);
            }
            if self.curriculum.should_promote(){
                if self.promote()?{
                    return Ok(TrainingOutcome::CurriculumComplete)
                }
                if !self.enter_slice()?{
                    return Ok(TrainingOutcome::Interrupted)
                }
            }
            if self.config.checkpoint_interval > 0 && self.episode % self.config.checkpoint_interval == 0{
                self.save_current()?;
            }
        }
    }

    /// Runs greedy episodes on current slice without learning. Returns win rate.
    pub fn evaluate(&mut self, episodes: u32) -> Result<f32, DashError>{
        let slice = self.curriculum.current_slice().clone();
        self.env.set_slice(Some(slice));
        let mut wins = 0u32;
        let mut played = 0u32;
        for _ in 0..episodes{
            match self.run_episode(false)?{
                Some(s) => {
                    played += 1;
                    if s.won{
                        wins += 1;
                    }
                },
                None => break
            }
        }
        Ok(if played == 0 { 0.0 } else { wins as f32 / played as f32 })
    }
}
