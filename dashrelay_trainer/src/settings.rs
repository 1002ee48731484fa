use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use dashrelay_core::channel::{ChannelTiming, DEFAULT_SEGMENT};
use dashrelay_core::curriculum::PromotionGate;
use dashrelay_core::env::EnvConfig;
use dashrelay_core::orchestrator::OrchestratorConfig;
use dashrelay_core::relay::RelayConfig;
use dashrelay_core::reward::RewardConfig;
use dashrelay_rl::policy::DqnConfig;
use crate::error::TrainerError;
use crate::options::{PlayOptions, TrainOptions};

/// File system locations used by trainer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings{
    pub segment: PathBuf,
    pub curriculum: PathBuf,
    pub checkpoints: PathBuf,
    pub logs: PathBuf,
}

impl Default for PathSettings{
    fn default() -> Self {
        Self{
            segment: PathBuf::from(DEFAULT_SEGMENT),
            curriculum: PathBuf::from("curriculum.json"),
            checkpoints: PathBuf::from("checkpoints"),
            logs: PathBuf::from("logs"),
        }
    }
}

impl PathSettings{
    /// Persisted curriculum progress.
    pub fn progress_file(&self) -> PathBuf{
        self.logs.join("training_meta.json")
    }
}

/// Every tunable of training session. Each section may be omitted in YAML file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings{
    pub paths: PathSettings,
    pub channel: ChannelTiming,
    pub env: EnvConfig,
    pub rewards: RewardConfig,
    pub promotion: PromotionGate,
    pub relay: RelayConfig,
    pub orchestrator: OrchestratorConfig,
    pub dqn: DqnConfig,
}

impl Settings{
    /// Reads settings from YAML file, or returns defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, TrainerError>{
        let path = match path{
            None => return Ok(Self::default()),
            Some(p) => p
        };
        let text = fs::read_to_string(path)
            .map_err(|e| TrainerError::Settings {path: path.to_path_buf(), reason: format!("{e}")})?;
        let settings: Settings = serde_yaml::from_str(&text)
            .map_err(|e| TrainerError::Settings {path: path.to_path_buf(), reason: format!("{e}")})?;
        log::info!("Settings loaded from {:?}", path);
        Ok(settings)
    }

    pub fn apply_train_options(&mut self, options: &TrainOptions){
        if let Some(s) = &options.link.segment{
            self.paths.segment = s.clone();
        }
        if let Some(c) = &options.curriculum{
            self.paths.curriculum = c.clone();
        }
        if let Some(c) = &options.checkpoints{
            self.paths.checkpoints = c.clone();
        }
        if let Some(l) = &options.logs{
            self.paths.logs = l.clone();
        }
        if let Some(m) = options.max_episodes{
            self.orchestrator.max_episodes = Some(m);
        }
        if let Some(lr) = options.learning_rate{
            self.dqn.learning_rate = lr;
        }
        if let Some(layers) = &options.layer_sizes{
            self.dqn.hidden_layers = layers.clone();
        }
    }

    pub fn apply_play_options(&mut self, options: &PlayOptions){
        if let Some(s) = &options.link.segment{
            self.paths.segment = s.clone();
        }
        if let Some(c) = &options.curriculum{
            self.paths.curriculum = c.clone();
        }
        if let Some(c) = &options.checkpoints{
            self.paths.checkpoints = c.clone();
        }
        if let Some(a) = options.attempts{
            self.relay.max_attempts = a;
        }
    }
}
