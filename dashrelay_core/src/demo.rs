//! Simulated game process and scripted agent.
//!
//! [`LockstepPeer`] plays the game side of the handshake in the trainer's own thread:
//! every time the trainer releases its flag the peer simulates one game frame and publishes it.
//! Together with [`ScriptedAgent`] it drives environment, relay and orchestrator through their real
//! code paths without the game running.
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::agent::{ExpertPolicy, LearningAgent, PolicyWeights};
use crate::channel::{InMemoryRegion, SharedRegion};
use crate::error::{DashError, ExpertError};
use crate::frame::{layout, Action, ObjectRecord, PlayerMode, SharedRecord, EMPTY_OBJECT_DX, MAX_OBJECTS};
use crate::observation::{Observation, OBJECT_FEATURES, PLAYER_FEATURES, SINGLE_FRAME_LEN};
use crate::replay::{ReplayBuffer, Transition};

/// Object kind used for hazards in simulated level.
pub const SPIKE_KIND: i32 = 1;
const GROUND_Y: f32 = 105.0;
const FLIGHT_Y: f32 = 235.0;
const VISIBLE_RANGE: f32 = 800.0;

/// Level layout for [`LockstepPeer`].
///
/// Player advances `percent_per_frame` each frame. A hazard at `h` kills the player on the frame
/// that crosses it unless [`Action::Hold`] is active on that frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedLevel{
    pub percent_per_frame: f32,
    pub hazards: Vec<f32>,
    /// Ranges `[start, end)` flown in flight mode.
    pub flight_zones: Vec<(f32, f32)>,
    /// Horizontal pixels per one percent of progress.
    pub pixels_per_percent: f32,
}

impl ScriptedLevel{
    /// Level without hazards.
    pub fn flat(percent_per_frame: f32) -> Self{
        Self{percent_per_frame, hazards: Vec::new(), flight_zones: Vec::new(), pixels_per_percent: 60.0}
    }

    pub fn with_hazards(mut self, hazards: &[f32]) -> Self{
        self.hazards.extend_from_slice(hazards);
        self.hazards.sort_by(f32::total_cmp);
        self
    }

    pub fn with_flight_zone(mut self, start: f32, end: f32) -> Self{
        self.flight_zones.push((start, end));
        self
    }

    pub fn mode_at(&self, percent: f32) -> PlayerMode{
        match self.flight_zones.iter().any(|(s, e)| *s <= percent && percent < *e){
            true => PlayerMode::Flight,
            false => PlayerMode::Ground
        }
    }
}

#[derive(Debug)]
struct Simulation{
    level: ScriptedLevel,
    percent: f32,
    dead: bool,
    checkpoint: Option<f32>,
    frames: u64,
    resets: u32,
    checkpoints_set: u32,
}

impl Simulation{
    fn advance(&mut self, action: Action){
        self.frames += 1;
        if self.dead || self.percent >= 100.0{
            return;
        }
        let next = (self.percent + self.level.percent_per_frame).min(100.0);
        let crossed = self.level.hazards.iter().copied().find(|h| self.percent < *h && *h <= next);
        match crossed{
            Some(h) if !action.is_active() => {
                self.percent = h;
                self.dead = true;
            },
            _ => self.percent = next,
        }
    }

    fn respawn(&mut self){
        self.percent = self.checkpoint.unwrap_or(0.0);
        self.dead = false;
        self.resets += 1;
    }

    fn record(&self) -> SharedRecord{
        let mode = self.level.mode_at(self.percent);
        let ppp = self.level.pixels_per_percent;
        let mut objects = [ObjectRecord::empty(); MAX_OBJECTS];
        let ahead = self.level.hazards.iter()
            .map(|h| (h - self.percent) * ppp)
            .filter(|dx| *dx > 0.0 && *dx <= VISIBLE_RANGE);
        for (slot, dx) in objects.iter_mut().zip(ahead){
            *slot = ObjectRecord{dx, dy: 0.0, width: 30.0, height: 30.0, kind: SPIKE_KIND};
        }
        let hazard_distance = self.level.hazards.iter()
            .map(|h| (h - self.percent) * ppp)
            .find(|dx| *dx > 0.0)
            .unwrap_or(EMPTY_OBJECT_DX);
        let level_complete = self.percent >= 100.0;
        SharedRecord{
            host_writing: 0,
            trainer_reading: 0,
            player_x: self.percent * ppp,
            player_y: if mode == PlayerMode::Flight { FLIGHT_Y } else { GROUND_Y },
            player_vel_x: self.level.percent_per_frame * ppp,
            player_vel_y: 0.0,
            player_rotation: 0.0,
            gravity: 0,
            on_ground: (mode == PlayerMode::Ground) as i32,
            dead: self.dead as i32,
            terminal: (self.dead || level_complete) as i32,
            percent: self.percent,
            hazard_distance,
            solid_distance: EMPTY_OBJECT_DX,
            player_mode: mode.code(),
            player_speed: 1.0,
            objects,
            action_command: 0,
            reset_command: 0,
            checkpoint_command: 0,
        }
    }
}

/// Game side of the handshake simulated in process. Every word store made by the trainer is logged.
#[derive(Debug)]
pub struct LockstepPeer{
    region: InMemoryRegion,
    simulation: RefCell<Simulation>,
    store_log: RefCell<Vec<(usize, u32)>>,
}

impl LockstepPeer{
    pub fn new(level: ScriptedLevel) -> Self{
        let peer = Self{
            region: InMemoryRegion::new(),
            simulation: RefCell::new(Simulation{
                level,
                percent: 0.0,
                dead: false,
                checkpoint: None,
                frames: 0,
                resets: 0,
                checkpoints_set: 0,
            }),
            store_log: RefCell::new(Vec::new()),
        };
        peer.publish();
        peer
    }

    /// Writes current frame under host flag. Command words are left untouched.
    fn publish(&self){
        let record = self.simulation.borrow().record();
        let words: &[u32] = bytemuck::cast_slice(std::slice::from_ref(&record));
        self.region.store_i32(layout::HOST_WRITING, 1);
        for (i, w) in words.iter().enumerate(){
            let offset = i * 4;
            if offset == layout::HOST_WRITING || offset == layout::TRAINER_READING || offset >= layout::ACTION_COMMAND{
                continue;
            }
            self.region.store_word(offset, *w);
        }
        self.region.store_i32(layout::HOST_WRITING, 0);
    }

    /// One game tick, run when trainer releases the record.
    fn tick(&self){
        if self.region.load_i32(layout::RESET_COMMAND) == 1{
            self.region.store_i32(layout::RESET_COMMAND, 0);
            self.simulation.borrow_mut().respawn();
        } else {
            let action = Action::from_index(self.region.load_i32(layout::ACTION_COMMAND) as usize)
                .unwrap_or_default();
            self.simulation.borrow_mut().advance(action);
        }
        self.publish();
    }

    fn set_checkpoint(&self){
        self.region.store_i32(layout::CHECKPOINT_COMMAND, 0);
        let mut sim = self.simulation.borrow_mut();
        sim.checkpoint = Some(sim.percent);
        sim.checkpoints_set += 1;
    }

    pub fn percent(&self) -> f32{
        self.simulation.borrow().percent
    }

    /// Practice checkpoint the player respawns at.
    pub fn checkpoint(&self) -> Option<f32>{
        self.simulation.borrow().checkpoint
    }

    pub fn clear_checkpoint(&self){
        self.simulation.borrow_mut().checkpoint = None;
    }

    pub fn checkpoints_set(&self) -> u32{
        self.simulation.borrow().checkpoints_set
    }

    pub fn resets(&self) -> u32{
        self.simulation.borrow().resets
    }

    pub fn frames(&self) -> u64{
        self.simulation.borrow().frames
    }

    /// Stores made by trainer, in order: `(offset, value)`.
    pub fn store_log(&self) -> Vec<(usize, u32)>{
        self.store_log.borrow().clone()
    }

    pub fn clear_store_log(&self){
        self.store_log.borrow_mut().clear()
    }
}

impl SharedRegion for LockstepPeer{
    fn load_word(&self, offset: usize) -> u32 {
        self.region.load_word(offset)
    }

    fn store_word(&self, offset: usize, value: u32) {
        self.store_log.borrow_mut().push((offset, value));
        self.region.store_word(offset, value);
        match offset{
            layout::TRAINER_READING if value == 0 => self.tick(),
            layout::CHECKPOINT_COMMAND if value == 1 => self.set_checkpoint(),
            _ => {}
        }
    }
}

/// Parameters of [`ScriptedAgent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedWeights{
    /// Identifies origin of weights, e.g. slice id of an expert.
    pub tag: u32,
    /// Competent policy holds before hazards, incompetent one never does.
    pub competent: bool,
}

impl PolicyWeights for ScriptedWeights{
    const EXTENSION: &'static str = "json";

    fn save_to(&self, path: &Path) -> Result<(), ExpertError> {
        let io = |e: std::io::Error| ExpertError::Io {path: path.to_path_buf(), explanation: format!("{e}")};
        if let Some(parent) = path.parent(){
            fs::create_dir_all(parent).map_err(io)?;
        }
        let text = serde_json::to_string(self)
            .map_err(|e| ExpertError::Format {path: path.to_path_buf(), reason: format!("{e}")})?;
        fs::write(path, text).map_err(io)
    }

    fn load_from(path: &Path) -> Result<Self, ExpertError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ExpertError::Io {path: path.to_path_buf(), explanation: format!("{e}")})?;
        serde_json::from_str(&text)
            .map_err(|e| ExpertError::Format {path: path.to_path_buf(), reason: format!("{e}")})
    }
}

/// Agent with hand written reflex instead of a network. It holds when the nearest object in
/// the newest stacked frame is closer than `lookahead` pixels, provided its weights are competent.
/// Learning makes it competent after a configured number of learning steps.
#[derive(Clone, Debug)]
pub struct ScriptedAgent{
    weights: ScriptedWeights,
    lookahead: f32,
    epsilon: f64,
    mastery_after: usize,
    learn_steps: usize,
    loaded: Vec<u32>,
    reinitializations: u32,
}

impl ScriptedAgent{
    /// Agent that is competent from the start.
    pub fn competent(lookahead: f32) -> Self{
        Self{
            weights: ScriptedWeights{tag: 0, competent: true},
            lookahead,
            epsilon: 1.0,
            mastery_after: 0,
            learn_steps: 0,
            loaded: Vec::new(),
            reinitializations: 0,
        }
    }

    /// Agent that becomes competent after `mastery_after` learning steps.
    pub fn novice(lookahead: f32, mastery_after: usize) -> Self{
        Self{
            weights: ScriptedWeights{tag: 0, competent: false},
            mastery_after,
            ..Self::competent(lookahead)
        }
    }

    pub fn weights(&self) -> &ScriptedWeights{
        &self.weights
    }

    /// Tags of all weights loaded through [`ExpertPolicy::load_weights`], in order.
    pub fn loaded_tags(&self) -> &[u32]{
        &self.loaded
    }

    pub fn reinitializations(&self) -> u32{
        self.reinitializations
    }

    fn reflex(&self, observation: &Observation) -> Action{
        if !self.weights.competent{
            return Action::Release
        }
        let v = observation.as_slice();
        let newest = match v.len().checked_sub(SINGLE_FRAME_LEN){
            Some(start) => &v[start..],
            None => return Action::Release
        };
        let nearest = &newest[PLAYER_FEATURES..PLAYER_FEATURES + OBJECT_FEATURES];
        let present = nearest[4] > 0.0;
        match present && nearest[0] * 1000.0 <= self.lookahead{
            true => Action::Hold,
            false => Action::Release
        }
    }
}

impl ExpertPolicy for ScriptedAgent{
    type Weights = ScriptedWeights;

    fn act_greedy(&mut self, observation: &Observation) -> Result<Action, DashError> {
        Ok(self.reflex(observation))
    }

    fn load_weights(&mut self, weights: &Self::Weights) -> Result<(), DashError> {
        self.weights = weights.clone();
        self.loaded.push(weights.tag);
        Ok(())
    }
}

impl LearningAgent for ScriptedAgent{
    fn act_exploring(&mut self, observation: &Observation) -> Result<Action, DashError> {
        Ok(self.reflex(observation))
    }

    fn learn(&mut self, memory: &ReplayBuffer<Transition>) -> Result<Option<f32>, DashError> {
        if memory.is_empty(){
            return Ok(None)
        }
        self.learn_steps += 1;
        if self.learn_steps >= self.mastery_after{
            self.weights.competent = true;
        }
        Ok(Some(0.0))
    }

    fn snapshot(&self) -> Result<Self::Weights, DashError> {
        Ok(self.weights.clone())
    }

    fn reinitialize(&mut self) -> Result<(), DashError> {
        self.weights = ScriptedWeights{tag: 0, competent: false};
        self.learn_steps = 0;
        self.reinitializations += 1;
        Ok(())
    }

    fn exploration(&self) -> f64 {
        self.epsilon
    }

    fn set_exploration(&mut self, epsilon: f64) {
        self.epsilon = epsilon;
    }
}

#[cfg(test)]
mod tests{
    use crate::channel::{ChannelTiming, SharedChannel};
    use crate::demo::{LockstepPeer, ScriptedAgent, ScriptedLevel};
    use crate::env::{EnvConfig, RunnerEnvironment};
    use crate::agent::ExpertPolicy;
    use crate::frame::PlayerMode;
    use crate::reward::RewardConfig;

    fn env(level: ScriptedLevel) -> RunnerEnvironment<LockstepPeer>{
        RunnerEnvironment::new(
            SharedChannel::new(LockstepPeer::new(level), ChannelTiming::immediate()),
            EnvConfig{settle_delay_ms: 0, ..Default::default()},
            RewardConfig::default())
    }

    #[test]
    fn competent_agent_finishes_level(){
        let mut e = env(ScriptedLevel::flat(0.5).with_hazards(&[10.0, 20.5, 55.0, 90.0]));
        let mut agent = ScriptedAgent::competent(130.0);
        let mut o = e.reset();
        loop{
            let a = agent.act_greedy(&o).unwrap();
            let s = e.step(a);
            o = s.observation;
            if s.terminated{
                assert!(!s.info.died, "died at {}", s.info.percent);
                assert_eq!(s.info.percent, 100.0);
                break;
            }
        }
    }

    #[test]
    fn incompetent_agent_dies_on_first_hazard(){
        let mut e = env(ScriptedLevel::flat(0.5).with_hazards(&[10.0, 20.5]));
        let mut agent = ScriptedAgent::novice(130.0, 100);
        let mut o = e.reset();
        loop{
            let s = e.step(agent.act_greedy(&o).unwrap());
            o = s.observation;
            if s.terminated{
                assert!(s.info.died);
                assert_eq!(s.info.percent, 10.0);
                break;
            }
        }
    }

    #[test]
    fn reset_respawns_at_checkpoint(){
        let mut e = env(ScriptedLevel::flat(1.0).with_flight_zone(5.0, 10.0));
        e.reset();
        for _ in 0..2{
            e.step(crate::frame::Action::Release);
        }
        assert_eq!(e.last_frame().unwrap().mode, PlayerMode::Flight);
        e.channel_mut().send_checkpoint();
        assert_eq!(e.channel().region().checkpoint(), Some(8.0));
        e.reset();
        assert_eq!(e.last_frame().unwrap().percent, 8.0);
        assert_eq!(e.channel().region().resets(), 2);
        assert_eq!(e.channel().region().checkpoints_set(), 1);
    }
}
