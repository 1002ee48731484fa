//! Step/reset interface over [`SharedChannel`].
//!
//! One [`step`](RunnerEnvironment::step) repeats the chosen action for `frame_skip` game frames,
//! accumulating per frame rewards, and returns stacked observation of the last frame.
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::channel::{SharedChannel, SharedRegion};
use crate::curriculum::Slice;
use crate::frame::{Action, PlayerMode, RawFrame};
use crate::observation::{normalize, FrameStack, Observation};
use crate::reward::{RewardConfig, RewardInput, RewardStrategy, ShapingState};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig{
    /// Number of game frames one action is repeated for.
    pub frame_skip: usize,
    /// Number of trailing frames concatenated into observation.
    pub frame_stack: usize,
    /// Reward for frame in which player died.
    pub death_penalty: f32,
    /// Reward for frame in which active slice end was reached.
    pub clear_bonus: f32,
    /// Sleep after reset request before first frame is read.
    pub settle_delay_ms: u64,
    /// Episode is truncated after this many steps.
    pub max_episode_steps: Option<u64>,
}

impl Default for EnvConfig{
    fn default() -> Self {
        Self{
            frame_skip: 4,
            frame_stack: 2,
            death_penalty: -100.0,
            clear_bonus: 1000.0,
            settle_delay_ms: 100,
            max_episode_steps: None,
        }
    }
}

impl EnvConfig{
    pub fn settle_delay(&self) -> Duration{
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Details of step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StepInfo{
    /// Progress reported by last read frame.
    pub percent: f32,
    pub died: bool,
    /// Active slice end was reached.
    pub cleared: bool,
    /// Number of game frames consumed by step.
    pub frames: usize,
}

#[derive(Clone, Debug)]
pub struct Step{
    pub observation: Observation,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

/// Reward for single frame. Death and slice clear override shaped reward.
pub fn frame_reward(
    config: &EnvConfig,
    rewards: &RewardConfig,
    slice_end: Option<f32>,
    input: &RewardInput,
    shaping: ShapingState
) -> (f32, ShapingState){
    if input.frame.dead{
        return (config.death_penalty, shaping)
    }
    if slice_end.is_some_and(|end| input.frame.percent >= end){
        return (config.clear_bonus, shaping)
    }
    RewardStrategy::for_mode(input.frame.mode, rewards).reward(input, shaping)
}

/// Environment of a single level hosted by the game process.
pub struct RunnerEnvironment<R: SharedRegion>{
    channel: SharedChannel<R>,
    config: EnvConfig,
    rewards: RewardConfig,
    slice: Option<Slice>,
    stack: FrameStack,
    previous_percent: f32,
    previous_hazard_distance: Option<f32>,
    shaping: ShapingState,
    episode_steps: u64,
    last_frame: Option<RawFrame>,
}

impl<R: SharedRegion> RunnerEnvironment<R>{
    pub fn new(channel: SharedChannel<R>, config: EnvConfig, rewards: RewardConfig) -> Self{
        let stack = FrameStack::new(config.frame_stack);
        Self{
            channel,
            config,
            rewards,
            slice: None,
            stack,
            previous_percent: 0.0,
            previous_hazard_distance: None,
            shaping: ShapingState::default(),
            episode_steps: 0,
            last_frame: None,
        }
    }

    /// Sets slice whose end terminates episodes. `None` means whole level.
    pub fn set_slice(&mut self, slice: Option<Slice>){
        self.slice = slice;
    }

    pub fn slice(&self) -> Option<&Slice>{
        self.slice.as_ref()
    }

    pub fn config(&self) -> &EnvConfig{
        &self.config
    }

    pub fn rewards(&self) -> &RewardConfig{
        &self.rewards
    }

    /// Reward strategy used for frames in `mode`.
    pub fn reward_strategy(&self, mode: PlayerMode) -> RewardStrategy{
        RewardStrategy::for_mode(mode, &self.rewards)
    }

    /// Length of observations produced.
    pub fn observation_len(&self) -> usize{
        self.stack.observation_len()
    }

    pub fn episode_steps(&self) -> u64{
        self.episode_steps
    }

    pub fn last_frame(&self) -> Option<&RawFrame>{
        self.last_frame.as_ref()
    }

    pub fn channel(&self) -> &SharedChannel<R>{
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut SharedChannel<R>{
        &mut self.channel
    }

    /// Requests level reset, waits for respawn and returns first observation replicated in all stack slots.
    pub fn reset(&mut self) -> Observation{
        self.channel.send_reset();
        let settle = self.config.settle_delay();
        if !settle.is_zero(){
            std::thread::sleep(settle);
        }
        let frame = self.channel.read();
        self.episode_steps = 0;
        self.previous_percent = frame.percent;
        self.previous_hazard_distance = Some(frame.hazard_distance);
        self.shaping = ShapingState::default();
        self.last_frame = Some(frame);
        #[cfg(feature = "log_trace")]
        log::trace!("Environment reset, starting at {:.2}%", frame.percent);
        self.stack.reset_with(normalize(&frame))
    }

    fn slice_cleared(&self, frame: &RawFrame) -> bool{
        self.slice.as_ref().is_some_and(|s| frame.percent >= s.end)
    }

    pub fn step(&mut self, action: Action) -> Step{
        self.episode_steps += 1;
        let slice_end = self.slice.as_ref().map(|s| s.end);
        let mut total = 0.0;
        let mut frames = 0;
        let mut last = None;

        for _ in 0..self.config.frame_skip.max(1){
            self.channel.write_action(action);
            let frame = self.channel.read();
            frames += 1;

            let input = RewardInput{
                frame: &frame,
                action,
                previous_percent: self.previous_percent,
                previous_hazard_distance: self.previous_hazard_distance,
            };
            let (r, shaping) = frame_reward(&self.config, &self.rewards, slice_end, &input, self.shaping);
            self.shaping = shaping;
            total += r;

            self.previous_percent = frame.percent;
            self.previous_hazard_distance = Some(frame.hazard_distance);
            last = Some(frame);

            if frame.dead || self.slice_cleared(&frame) || (self.slice.is_none() && frame.terminal){
                break;
            }
        }
        self.shaping.previous_action = Some(action);

        let frame = match last{
            Some(f) => f,
            None => self.channel.read()
        };
        self.last_frame = Some(frame);

        let died = frame.dead;
        let cleared = self.slice_cleared(&frame);
        let terminated = match self.slice{
            Some(_) => died || cleared,
            None => died || frame.terminal
        };
        let truncated = !terminated && self.config.max_episode_steps
            .is_some_and(|max| self.episode_steps >= max);

        Step{
            observation: self.stack.push(normalize(&frame)),
            reward: total,
            terminated,
            truncated,
            info: StepInfo{percent: frame.percent, died, cleared, frames},
        }
    }
}

#[cfg(test)]
mod tests{
    use proptest::prelude::*;
    use crate::channel::{ChannelTiming, SharedChannel};
    use crate::curriculum::Slice;
    use crate::demo::{LockstepPeer, ScriptedLevel};
    use crate::env::{frame_reward, EnvConfig, RunnerEnvironment};
    use crate::frame::{layout, Action, PlayerMode};
    use crate::observation::SINGLE_FRAME_LEN;
    use crate::reward::{GroundParams, RewardConfig, RewardInput, ShapingState};
    use crate::reward::tests::frame;

    fn env(level: ScriptedLevel, config: EnvConfig) -> RunnerEnvironment<LockstepPeer>{
        let channel = SharedChannel::new(LockstepPeer::new(level), ChannelTiming::immediate());
        RunnerEnvironment::new(channel, EnvConfig{settle_delay_ms: 0, ..config}, RewardConfig::default())
    }

    #[test]
    fn reset_replicates_first_frame(){
        let mut e = env(ScriptedLevel::flat(1.0), EnvConfig::default());
        let o = e.reset();
        assert_eq!(o.len(), 2 * SINGLE_FRAME_LEN);
        assert_eq!(&o.as_slice()[..SINGLE_FRAME_LEN], &o.as_slice()[SINGLE_FRAME_LEN..]);
        assert_eq!(e.observation_len(), o.len());
    }

    #[test]
    fn step_repeats_action_for_frame_skip(){
        let mut e = env(ScriptedLevel::flat(0.5), EnvConfig::default());
        e.reset();
        let s = e.step(Action::Release);
        assert_eq!(s.info.frames, 4);
        assert!((s.info.percent - 2.0).abs() < 1e-4);
        assert!(!s.terminated && !s.truncated);
        assert!(s.reward > 0.0);
        assert_eq!(s.observation.len(), 2 * SINGLE_FRAME_LEN);
    }

    #[test]
    fn death_stops_skip_early(){
        let mut e = env(ScriptedLevel::flat(1.0).with_hazards(&[2.0]), EnvConfig::default());
        e.reset();
        let s = e.step(Action::Release);
        assert!(s.terminated);
        assert!(s.info.died);
        assert_eq!(s.info.frames, 2);
        assert!(s.reward < -50.0);
    }

    #[test]
    fn slice_end_terminates_with_bonus(){
        let mut e = env(ScriptedLevel::flat(1.0), EnvConfig::default());
        e.set_slice(Some(Slice::new(1, 0.0, 3.0, PlayerMode::Ground)));
        e.reset();
        let s = e.step(Action::Release);
        assert!(s.terminated && s.info.cleared && !s.info.died);
        assert_eq!(s.info.frames, 3);
        assert!(s.reward >= 1000.0);
    }

    #[test]
    fn episode_is_truncated_after_limit(){
        let mut e = env(ScriptedLevel::flat(0.1), EnvConfig{max_episode_steps: Some(3), ..Default::default()});
        e.reset();
        assert!(!e.step(Action::Release).truncated);
        assert!(!e.step(Action::Release).truncated);
        let s = e.step(Action::Release);
        assert!(s.truncated && !s.terminated);
    }

    #[test]
    fn without_slice_level_end_terminates(){
        let mut e = env(ScriptedLevel::flat(10.0), EnvConfig{frame_skip: 1, ..Default::default()});
        e.reset();
        let mut steps = 0;
        loop{
            steps += 1;
            let s = e.step(Action::Release);
            if s.terminated{
                assert_eq!(s.info.percent, 100.0);
                break;
            }
            assert!(steps < 20);
        }
        assert_eq!(steps, 10);
    }

    #[test]
    fn action_is_written_before_flag_is_released(){
        let mut e = env(ScriptedLevel::flat(1.0), EnvConfig{frame_skip: 1, ..Default::default()});
        e.reset();
        e.channel().region().clear_store_log();
        e.step(Action::Hold);
        let log = e.channel().region().store_log();
        let action = log.iter().position(|(o, v)| *o == layout::ACTION_COMMAND && *v == 1).unwrap();
        let release = log.iter().position(|(o, v)| *o == layout::TRAINER_READING && *v == 0).unwrap();
        assert!(action < release);
    }

    proptest!{
        #[test]
        fn terminal_rewards_dominate(
            progress_scale in 0.0f32..1e4,
            jump in 0.0f32..100.0,
            death in -1e4f32..0.0,
            clear in 0.0f32..1e4,
            percent in 0.0f32..100.0,
            hold in any::<bool>(),
        ){
            let rewards = RewardConfig{
                ground: GroundParams{progress_scale, jump_penalty: jump, ..Default::default()},
                ..Default::default()
            };
            let config = EnvConfig{death_penalty: death, clear_bonus: clear, ..Default::default()};
            let action = if hold { Action::Hold } else { Action::Release };

            let mut dead = frame(percent, 10.0, PlayerMode::Ground);
            dead.dead = true;
            let input = RewardInput{frame: &dead, action, previous_percent: 0.0, previous_hazard_distance: Some(5.0)};
            let (r, _) = frame_reward(&config, &rewards, Some(percent), &input, ShapingState::default());
            prop_assert_eq!(r, death);

            let alive = frame(percent, 10.0, PlayerMode::Flight);
            let input = RewardInput{frame: &alive, ..input};
            let (r, s) = frame_reward(&config, &rewards, Some(percent), &input, ShapingState::default());
            prop_assert_eq!(r, clear);
            prop_assert_eq!(s, ShapingState::default());
        }
    }
}
