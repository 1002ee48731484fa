use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use tch::nn::{Adam, Optimizer, VarStore};
use tch::{Device, Kind, Reduction, Tensor};
use dashrelay_core::agent::{ExpertPolicy, LearningAgent, TrainingSnapshot};
use dashrelay_core::error::DashError;
use dashrelay_core::frame::Action;
use dashrelay_core::observation::Observation;
use dashrelay_core::replay::{ReplayBuffer, Transition};
use crate::error::DashRlError;
use crate::policy::{EpsilonSchedule, QSelector};
use crate::torch_net::{DuelingShape, QValueNet};
use crate::weights::TensorWeights;

/// Hyperparameters of [`DqnAgent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnConfig{
    pub gamma: f64,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Target network is synchronised every this many learning steps.
    pub target_update: u64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    /// Steps after which exploration drops by factor `e` towards `epsilon_end`.
    pub epsilon_decay: f64,
    pub hidden_layers: Vec<i64>,
    /// Width of value and advantage heads.
    pub head: i64,
    /// Gradient values are clamped to `[-grad_clip, grad_clip]` when set.
    pub grad_clip: Option<f64>,
}

impl Default for DqnConfig{
    fn default() -> Self {
        Self{
            gamma: 0.99,
            learning_rate: 3e-4,
            batch_size: 64,
            target_update: 1000,
            epsilon_start: 1.0,
            epsilon_end: 0.01,
            epsilon_decay: 50_000.0,
            hidden_layers: vec![256, 256],
            head: 128,
            grad_clip: None,
        }
    }
}

/// Double DQN agent with dueling Q network.
///
/// Online network selects the best next action, target network evaluates it.
/// Loss is mean squared error of `Q(s, a)` against `r + gamma * Q_target(s', argmax_a' Q(s', a'))`
/// (future part zeroed for terminal transitions).
#[derive(Getters, CopyGetters)]
pub struct DqnAgent{
    online: QValueNet,
    target: QValueNet,
    optimizer: Optimizer,
    #[getset(get = "pub")]
    shape: DuelingShape,
    #[getset(get = "pub")]
    config: DqnConfig,
    schedule: EpsilonSchedule,
    /// Number of exploring action selections.
    #[getset(get_copy = "pub")]
    steps_done: u64,
    #[getset(get_copy = "pub")]
    learn_steps: u64,
}

impl DqnAgent{
    pub fn new(observation_len: usize, config: DqnConfig, device: Device) -> Result<Self, DashRlError>{
        let shape = DuelingShape::new(observation_len, &config.hidden_layers, config.head, Action::COUNT);
        let (online, target, optimizer) = Self::build_networks(&shape, &config, device)?;
        #[cfg(feature = "log_info")]
        log::info!("Created DQN agent: input {}, layers {:?}, head {}, device {:?}",
            observation_len, config.hidden_layers, config.head, device);
        Ok(Self{
            online,
            target,
            optimizer,
            shape,
            schedule: EpsilonSchedule::new(config.epsilon_start, config.epsilon_end, config.epsilon_decay),
            config,
            steps_done: 0,
            learn_steps: 0,
        })
    }

    fn build_networks(shape: &DuelingShape, config: &DqnConfig, device: Device)
        -> Result<(QValueNet, QValueNet, Optimizer), DashRlError>{
        let online = shape.build(device);
        let mut target = shape.build(device);
        target.var_store_mut().copy(online.var_store())
            .map_err(DashRlError::torch("initial target sync"))?;
        let optimizer = online.build_optimizer(Adam::default(), config.learning_rate)
            .map_err(DashRlError::torch("building optimizer"))?;
        Ok((online, target, optimizer))
    }

    pub fn device(&self) -> Device{
        self.online.device()
    }

    pub fn var_store(&self) -> &VarStore{
        self.online.var_store()
    }

    pub fn target_var_store(&self) -> &VarStore{
        self.target.var_store()
    }

    fn sync_target(&mut self) -> Result<(), DashRlError>{
        self.target.var_store_mut().copy(self.online.var_store())
            .map_err(DashRlError::torch("target sync"))
    }

    fn observation_tensor(&self, observation: &Observation) -> Result<Tensor, DashRlError>{
        let expected = self.shape.input as usize;
        if observation.len() != expected{
            return Err(DashRlError::Torch {
                source: tch::TchError::Shape(format!("observation of length {}, network expects {}", observation.len(), expected)),
                context: "encoding observation".into()
            })
        }
        Ok(Tensor::from_slice(observation.as_slice()).unsqueeze(0).to_device(self.device()))
    }

    fn select(&self, observation: &Observation, selector: QSelector, exploring: bool) -> Result<Action, DashRlError>{
        let input = self.observation_tensor(observation)?;
        let q_vals = tch::no_grad(|| (self.online.net())(&input));
        selector.select_q_value_index(&q_vals, exploring)
            .and_then(Action::from_index)
            .ok_or_else(|| DashRlError::Torch {
                source: tch::TchError::Kind(format!("no action for Q-values of shape {:?}", q_vals.size())),
                context: "selecting action".into()
            })
    }

    /// Stacks sampled transitions into batch tensors:
    /// observations, actions, rewards, next observations, continuation mask (`0` for terminal).
    fn batch(&self, sample: &[&Transition]) -> Result<[Tensor; 5], DashRlError>{
        let rows = sample.len() as i64;
        let width = self.shape.input;
        let device = self.device();
        let mut observations = Vec::with_capacity(sample.len() * width as usize);
        let mut next_observations = Vec::with_capacity(sample.len() * width as usize);
        let mut actions = Vec::with_capacity(sample.len());
        let mut rewards = Vec::with_capacity(sample.len());
        let mut continues = Vec::with_capacity(sample.len());
        for t in sample{
            observations.extend_from_slice(t.observation.as_slice());
            next_observations.extend_from_slice(t.next_observation.as_slice());
            actions.push(t.action.index() as i64);
            rewards.push(t.reward);
            continues.push(if t.terminated {0.0f32} else {1.0});
        }
        let observations = Tensor::from_slice(&observations).f_view([rows, width])
            .map_err(DashRlError::torch("stacking observations"))?;
        let next_observations = Tensor::from_slice(&next_observations).f_view([rows, width])
            .map_err(DashRlError::torch("stacking next observations"))?;
        Ok([
            observations.to_device(device),
            Tensor::from_slice(&actions).to_device(device),
            Tensor::from_slice(&rewards).to_device(device),
            next_observations.to_device(device),
            Tensor::from_slice(&continues).to_device(device),
        ])
    }

    /// One Double DQN update on a sample of `batch_size` transitions.
    pub fn train_on_memory(&mut self, memory: &ReplayBuffer<Transition>) -> Result<f32, DashRlError>{
        let sample = memory.sample(self.config.batch_size).ok_or(DashRlError::NotEnoughSamples {
            available: memory.len(),
            required: self.config.batch_size,
        })?;
        let [observations, actions, rewards, next_observations, continues] = self.batch(&sample)?;

        let q = (self.online.net())(&observations)
            .gather(1, &actions.unsqueeze(1), false)
            .squeeze_dim(1);
        let target_q = tch::no_grad(|| {
            let next_actions = (self.online.net())(&next_observations).argmax(1, true);
            let next_q = (self.target.net())(&next_observations)
                .gather(1, &next_actions, false)
                .squeeze_dim(1);
            &rewards + &continues * next_q * self.config.gamma
        });
        let loss = q.mse_loss(&target_q, Reduction::Mean);
        match self.config.grad_clip{
            Some(clip) => self.optimizer.backward_step_clip(&loss, clip),
            None => self.optimizer.backward_step(&loss),
        }
        self.learn_steps += 1;
        if self.learn_steps % self.config.target_update.max(1) == 0{
            self.sync_target()?;
            #[cfg(feature = "log_debug")]
            log::debug!("Target network synchronised after {} learning steps", self.learn_steps);
        }
        let loss = loss.to_kind(Kind::Float).f_double_value(&[])
            .map_err(DashRlError::torch("reading loss"))?;
        #[cfg(feature = "log_trace")]
        log::trace!("DQN loss {:.6} (learn step {})", loss, self.learn_steps);
        Ok(loss as f32)
    }
}

impl ExpertPolicy for DqnAgent{
    type Weights = TensorWeights;

    fn act_greedy(&mut self, observation: &Observation) -> Result<Action, DashError> {
        Ok(self.select(observation, QSelector::Max, false)?)
    }

    fn load_weights(&mut self, weights: &Self::Weights) -> Result<(), DashError> {
        weights.restore_into(self.online.var_store_mut())?;
        self.sync_target()?;
        Ok(())
    }
}

impl LearningAgent for DqnAgent{
    fn act_exploring(&mut self, observation: &Observation) -> Result<Action, DashError> {
        let epsilon = self.schedule.epsilon(self.steps_done);
        self.steps_done += 1;
        Ok(self.select(observation, QSelector::EpsilonGreedy(epsilon), true)?)
    }

    fn learn(&mut self, memory: &ReplayBuffer<Transition>) -> Result<Option<f32>, DashError> {
        if memory.len() < self.config.batch_size{
            return Ok(None)
        }
        Ok(Some(self.train_on_memory(memory)?))
    }

    fn snapshot(&self) -> Result<Self::Weights, DashError> {
        Ok(TensorWeights::capture(self.online.var_store()))
    }

    fn training_snapshot(&self) -> Result<TrainingSnapshot<Self::Weights>, DashError> {
        Ok(TrainingSnapshot{
            policy: TensorWeights::capture(self.online.var_store()),
            auxiliary: Some(TensorWeights::capture(self.target.var_store())),
        })
    }

    fn restore_training_snapshot(&mut self, snapshot: &TrainingSnapshot<Self::Weights>) -> Result<(), DashError> {
        snapshot.policy.restore_into(self.online.var_store_mut())?;
        match &snapshot.auxiliary{
            Some(target) => target.restore_into(self.target.var_store_mut())?,
            None => self.sync_target()?,
        }
        Ok(())
    }

    fn reinitialize(&mut self) -> Result<(), DashError> {
        let (online, target, optimizer) = Self::build_networks(&self.shape, &self.config, self.device())?;
        self.online = online;
        self.target = target;
        self.optimizer = optimizer;
        self.schedule.restart_from(self.config.epsilon_start, self.steps_done);
        #[cfg(feature = "log_info")]
        log::info!("DQN networks reinitialised, exploration reset to {}", self.config.epsilon_start);
        Ok(())
    }

    fn exploration(&self) -> f64 {
        self.schedule.epsilon(self.steps_done)
    }

    fn set_exploration(&mut self, epsilon: f64) {
        self.schedule.restart_from(epsilon, self.steps_done);
    }
}

#[cfg(test)]
mod tests{
    use tch::Device;
    use dashrelay_core::agent::{ExpertPolicy, LearningAgent};
    use dashrelay_core::frame::Action;
    use dashrelay_core::observation::Observation;
    use dashrelay_core::replay::{ReplayBuffer, Transition};
    use crate::error::DashRlError;
    use crate::policy::{DqnAgent, DqnConfig};
    use crate::weights::TensorWeights;

    fn small_config() -> DqnConfig{
        DqnConfig{
            batch_size: 8,
            hidden_layers: vec![16],
            head: 8,
            learning_rate: 1e-2,
            target_update: 5,
            epsilon_decay: 100.0,
            ..Default::default()
        }
    }

    fn obs(v: f32) -> Observation{
        Observation::new(vec![v, 1.0 - v, 0.5])
    }

    /// Single-step bandit: action Hold pays 1, Release pays 0, every transition terminal.
    fn bandit_memory() -> ReplayBuffer<Transition>{
        let mut memory = ReplayBuffer::new(256);
        for i in 0..64{
            let action = if i % 2 == 0 {Action::Hold} else {Action::Release};
            memory.push(Transition{
                observation: obs(0.25),
                action,
                reward: if action == Action::Hold {1.0} else {0.0},
                next_observation: obs(0.75),
                terminated: true,
            });
        }
        memory
    }

    #[test]
    fn learns_rewarded_action(){
        tch::manual_seed(11);
        let mut agent = DqnAgent::new(3, small_config(), Device::Cpu).unwrap();
        let memory = bandit_memory();
        let mut last = f32::MAX;
        for _ in 0..300{
            last = agent.learn(&memory).unwrap().unwrap();
        }
        assert!(last < 0.05, "loss {last}");
        assert_eq!(agent.act_greedy(&obs(0.25)).unwrap(), Action::Hold);
        assert_eq!(agent.learn_steps(), 300);
    }

    #[test]
    fn learning_waits_for_batch(){
        let mut agent = DqnAgent::new(3, small_config(), Device::Cpu).unwrap();
        let mut memory = ReplayBuffer::new(16);
        assert_eq!(agent.learn(&memory).unwrap(), None);
        memory.push(Transition{observation: obs(0.0), action: Action::Hold, reward: 0.0,
            next_observation: obs(0.0), terminated: false});
        assert!(matches!(agent.train_on_memory(&memory), Err(DashRlError::NotEnoughSamples {available: 1, required: 8})));
    }

    #[test]
    fn exploration_decays_and_restarts(){
        let mut agent = DqnAgent::new(3, small_config(), Device::Cpu).unwrap();
        assert_eq!(agent.exploration(), 1.0);
        for _ in 0..200{
            agent.act_exploring(&obs(0.5)).unwrap();
        }
        assert_eq!(agent.steps_done(), 200);
        let decayed = agent.exploration();
        assert!(decayed < 0.2);
        agent.set_exploration(0.5);
        assert_eq!(agent.exploration(), 0.5);
        agent.act_exploring(&obs(0.5)).unwrap();
        assert!(agent.exploration() < 0.5);
        agent.reinitialize().unwrap();
        assert_eq!(agent.exploration(), 1.0);
    }

    #[test]
    fn snapshot_and_load_reproduce_policy(){
        tch::manual_seed(3);
        let mut trained = DqnAgent::new(3, small_config(), Device::Cpu).unwrap();
        let memory = bandit_memory();
        for _ in 0..300{
            trained.learn(&memory).unwrap();
        }
        let weights = trained.snapshot().unwrap();

        let mut other = DqnAgent::new(3, small_config(), Device::Cpu).unwrap();
        other.load_weights(&weights).unwrap();
        assert_eq!(other.act_greedy(&obs(0.25)).unwrap(), Action::Hold);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slice_01_current.ot");
        trained.save_checkpoint(&path).unwrap();
        let mut restored = DqnAgent::new(3, small_config(), Device::Cpu).unwrap();
        restored.load_checkpoint(&path).unwrap();
        let a = trained.var_store().variables();
        for (name, t) in restored.var_store().variables(){
            assert!(t.allclose(&a[&name], 0.0, 0.0, false), "{name} differs");
        }
    }

    #[test]
    fn training_snapshot_keeps_target_lag(){
        tch::manual_seed(7);
        let config = DqnConfig{target_update: 1000, ..small_config()};
        let mut agent = DqnAgent::new(3, config.clone(), Device::Cpu).unwrap();
        let memory = bandit_memory();
        for _ in 0..20{
            agent.learn(&memory).unwrap();
        }
        let online = agent.snapshot().unwrap();
        let target = TensorWeights::capture(agent.target_var_store());
        assert!(!online.get("fc1.weight").unwrap().allclose(target.get("fc1.weight").unwrap(), 0.0, 0.0, false));

        let stash = agent.training_snapshot().unwrap();
        let expert = DqnAgent::new(3, config, Device::Cpu).unwrap().snapshot().unwrap();
        agent.load_weights(&expert).unwrap();
        agent.restore_training_snapshot(&stash).unwrap();

        let restored_online = agent.snapshot().unwrap();
        let restored_target = TensorWeights::capture(agent.target_var_store());
        for name in online.names(){
            assert!(restored_online.get(name).unwrap().allclose(online.get(name).unwrap(), 0.0, 0.0, false), "{name}");
            assert!(restored_target.get(name).unwrap().allclose(target.get(name).unwrap(), 0.0, 0.0, false), "{name}");
        }
    }

    #[test]
    fn reinitialize_discards_weights(){
        tch::manual_seed(5);
        let mut agent = DqnAgent::new(3, small_config(), Device::Cpu).unwrap();
        let before = agent.snapshot().unwrap();
        agent.reinitialize().unwrap();
        let after = agent.snapshot().unwrap();
        let w0 = before.get("fc1.weight").unwrap();
        let w1 = after.get("fc1.weight").unwrap();
        assert_eq!(w0.size(), w1.size());
        assert!(!w0.allclose(w1, 0.0, 0.0, false));
    }

    #[test]
    fn wrong_observation_length_is_error(){
        let mut agent = DqnAgent::new(3, small_config(), Device::Cpu).unwrap();
        assert!(agent.act_greedy(&Observation::new(vec![0.0; 5])).is_err());
    }

    #[test]
    fn drives_orchestrator_on_simulated_level(){
        use dashrelay_core::channel::{ChannelTiming, SharedChannel};
        use dashrelay_core::curriculum::{CurriculumManager, PromotionGate, Slice, SliceSet};
        use dashrelay_core::demo::{LockstepPeer, ScriptedLevel};
        use dashrelay_core::env::{EnvConfig, RunnerEnvironment};
        use dashrelay_core::expert::CheckpointLayout;
        use dashrelay_core::frame::PlayerMode;
        use dashrelay_core::orchestrator::{Orchestrator, OrchestratorConfig, TrainingOutcome};
        use dashrelay_core::relay::RelayConfig;
        use dashrelay_core::reward::RewardConfig;

        let dir = tempfile::tempdir().unwrap();
        let level = ScriptedLevel::flat(1.0).with_hazards(&[15.0, 30.0]);
        let env = RunnerEnvironment::new(
            SharedChannel::new(LockstepPeer::new(level), ChannelTiming::immediate()),
            EnvConfig{settle_delay_ms: 0, max_episode_steps: Some(40), ..Default::default()},
            RewardConfig::default());
        let agent = DqnAgent::new(env.observation_len(), small_config(), Device::Cpu).unwrap();
        let slices = SliceSet::new(vec![Slice::new(1, 0.0, 100.0, PlayerMode::Ground)]).unwrap();
        let curriculum = CurriculumManager::with_progress(slices, PromotionGate::default(),
            dir.path().join("training_meta.json"));
        let mut o = Orchestrator::new(env, agent, curriculum, CheckpointLayout::new(dir.path().join("checkpoints")),
            RelayConfig::default(), OrchestratorConfig{max_episodes: Some(3), batch_size: 8, checkpoint_interval: 2, ..Default::default()});

        assert_eq!(o.train().unwrap(), TrainingOutcome::EpisodeLimit);
        assert_eq!(o.episode(), 3);
        assert!(o.agent().steps_done() > 0);
        assert!(o.agent().learn_steps() > 0);
        assert!(CheckpointLayout::new(dir.path().join("checkpoints")).current_path(1, "ot").exists());
    }
}
