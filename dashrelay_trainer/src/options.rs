use std::path::PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ComputeDevice{
    Cpu,
    Cuda,
}

#[derive(Parser)]
#[command(author, version, about = "Curriculum trainer for a shared-memory platform runner", long_about = None)]
pub struct DashRelayOptions{

    #[arg(short = 'v', long = "log-level", default_value = "info")]
    pub log_level: LevelFilter,

    #[arg(short = 'c', long = "log-level-core", default_value = "info")]
    pub log_level_core: LevelFilter,

    #[arg(short = 'r', long = "log-level-rl", default_value = "warn")]
    pub log_level_rl: LevelFilter,

    #[arg(short = 'o', long = "logfile")]
    pub log_file: Option<PathBuf>,

    #[arg(short = 's', long = "settings", help = "YAML file with timing, reward, curriculum and network settings")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command{
    /// Train through curriculum, resuming from saved progress.
    Train(TrainOptions),
    /// Play whole level greedily using saved experts.
    Play(PlayOptions),
    /// Read frames without acting and report what the game writes.
    Probe(ProbeOptions),
}

/// Options shared by every command that talks to the game.
#[derive(Args, Clone, Debug)]
pub struct LinkOptions{
    #[arg(long = "segment", help = "Shared memory segment created by the game (GD_RL_Memory on Windows, /dev/shm/GD_RL_Memory elsewhere)")]
    pub segment: Option<PathBuf>,

    #[arg(long = "simulate", help = "Use built-in simulated level instead of the game")]
    pub simulate: bool,

    #[arg(long = "simulate-hazards", value_delimiter = ',', num_args = 1.., default_value = "10,20.5,45,60,80",
        help = "Hazard positions (percent) of simulated level")]
    pub simulate_hazards: Vec<f32>,
}

#[derive(Args, Clone, Debug)]
pub struct TrainOptions{
    #[command(flatten)]
    pub link: LinkOptions,

    #[arg(long = "curriculum", help = "JSON file with slice definitions")]
    pub curriculum: Option<PathBuf>,

    #[arg(long = "checkpoints", help = "Directory with current checkpoints and final_models")]
    pub checkpoints: Option<PathBuf>,

    #[arg(long = "logs", help = "Directory for progress file and episode journal")]
    pub logs: Option<PathBuf>,

    #[arg(short = 'd', long = "device", default_value = "cpu")]
    pub device: ComputeDevice,

    #[arg(short = 'e', long = "episodes", help = "Stop after this many episodes")]
    pub max_episodes: Option<u64>,

    #[arg(long = "learning-rate")]
    pub learning_rate: Option<f64>,

    #[arg(long = "layer-sizes", value_delimiter = ',', num_args = 1..)]
    pub layer_sizes: Option<Vec<i64>>,

    #[arg(long = "tensorboard", help = "Directory to save tensorboard output for episodes")]
    pub tboard: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct PlayOptions{
    #[command(flatten)]
    pub link: LinkOptions,

    #[arg(long = "curriculum")]
    pub curriculum: Option<PathBuf>,

    #[arg(long = "checkpoints")]
    pub checkpoints: Option<PathBuf>,

    #[arg(short = 'd', long = "device", default_value = "cpu")]
    pub device: ComputeDevice,

    #[arg(short = 'a', long = "attempts", help = "Number of attempts at whole level")]
    pub attempts: Option<u32>,
}

#[derive(Args, Clone, Debug)]
pub struct ProbeOptions{
    #[command(flatten)]
    pub link: LinkOptions,

    #[arg(short = 'n', long = "frames", default_value = "120")]
    pub frames: usize,
}
