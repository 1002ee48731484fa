use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use dashrelay_core::channel::{ChannelTiming, SharedChannel, SharedRegion};
use dashrelay_core::curriculum::{CurriculumManager, SliceSet};
use dashrelay_core::demo::{LockstepPeer, ScriptedLevel};
use dashrelay_core::env::{EnvConfig, RunnerEnvironment};
use dashrelay_core::error::DashError;
use dashrelay_core::expert::{CheckpointLayout, ExpertCache};
use dashrelay_core::orchestrator::{Orchestrator, TrainingOutcome};
use dashrelay_core::relay::{RelayNavigator, RelayReport};
use dashrelay_rl::policy::DqnAgent;
use dashrelay_rl::tch::Device;
use dashrelay_rl::weights::TensorWeights;
use crate::error::TrainerError;
use crate::journal::Journal;
use crate::options::{ComputeDevice, LinkOptions, PlayOptions, ProbeOptions, TrainOptions};
use crate::probe::{probe, ProbeReport};
use crate::settings::Settings;

pub fn device(device: ComputeDevice) -> Device{
    match device{
        ComputeDevice::Cpu => Device::Cpu,
        ComputeDevice::Cuda => Device::Cuda(0),
    }
}

/// In-process simulation needs no waiting for the game.
fn simulated_settings(settings: &Settings) -> Settings{
    Settings{env: EnvConfig{settle_delay_ms: 0, ..settings.env.clone()}, ..settings.clone()}
}

fn simulated_channel(link: &LinkOptions) -> SharedChannel<LockstepPeer>{
    let level = ScriptedLevel::flat(0.5).with_hazards(&link.simulate_hazards);
    log::info!("Using simulated level with hazards at {:?}", link.simulate_hazards);
    SharedChannel::new(LockstepPeer::new(level), ChannelTiming::immediate())
}

pub fn run_train(options: &TrainOptions, settings: &Settings, stop: Arc<AtomicBool>) -> Result<TrainingOutcome, TrainerError>{
    let device = device(options.device);
    if options.link.simulate{
        let settings = simulated_settings(settings);
        train_on(simulated_channel(&options.link), &settings, device, options, stop)
    } else {
        let channel = SharedChannel::attach(&settings.paths.segment, settings.channel).map_err(DashError::from)?;
        train_on(channel, settings, device, options, stop)
    }
}

pub fn train_on<R: SharedRegion>(
    channel: SharedChannel<R>,
    settings: &Settings,
    device: Device,
    options: &TrainOptions,
    stop: Arc<AtomicBool>,
) -> Result<TrainingOutcome, TrainerError>{
    let env = RunnerEnvironment::new(channel, settings.env.clone(), settings.rewards.clone());
    let curriculum = CurriculumManager::load(&settings.paths.curriculum, settings.paths.progress_file(), settings.promotion)
        .map_err(DashError::from)?;
    log::info!("Curriculum of {} slices, starting at slice {} (total steps so far: {})",
        curriculum.slices().len(), curriculum.current_slice().id, curriculum.total_steps());
    let agent = DqnAgent::new(env.observation_len(), settings.dqn.clone(), device)?;

    let mut journal = Journal::create(&settings.paths.logs)?;
    if let Some(tb) = &options.tboard{
        journal.add_tboard_directory(tb)?;
    }

    let mut orchestrator = Orchestrator::new(
        env,
        agent,
        curriculum,
        CheckpointLayout::new(&settings.paths.checkpoints),
        settings.relay,
        settings.orchestrator.clone(),
    ).with_observer(Box::new(journal)).with_stop_flag(stop);

    let outcome = orchestrator.train()?;
    log::info!("Training finished: {:?} after {} episodes, {} steps in total", outcome,
        orchestrator.episode(), orchestrator.curriculum().total_steps());
    Ok(outcome)
}

pub fn run_play(options: &PlayOptions, settings: &Settings) -> Result<RelayReport, TrainerError>{
    let device = device(options.device);
    if options.link.simulate{
        let settings = simulated_settings(settings);
        play_on(simulated_channel(&options.link), &settings, device)
    } else {
        let channel = SharedChannel::attach(&settings.paths.segment, settings.channel).map_err(DashError::from)?;
        play_on(channel, settings, device)
    }
}

pub fn play_on<R: SharedRegion>(channel: SharedChannel<R>, settings: &Settings, device: Device) -> Result<RelayReport, TrainerError>{
    let slices = SliceSet::from_file(&settings.paths.curriculum).map_err(DashError::from)?;
    let mut env = RunnerEnvironment::new(channel, settings.env.clone(), settings.rewards.clone());
    env.set_slice(None);
    let mut agent = DqnAgent::new(env.observation_len(), settings.dqn.clone(), device)?;
    let mut experts = ExpertCache::<TensorWeights>::new(&CheckpointLayout::new(&settings.paths.checkpoints));
    let loaded = experts.load_all();
    let missing: Vec<u32> = slices.iter().map(|s| s.id).filter(|id| !experts.contains(*id)).collect();
    if !missing.is_empty(){
        log::warn!("{} experts loaded, slices without expert: {:?}", loaded, missing);
    }
    let report = RelayNavigator::new(settings.relay).play_through(&mut env, &mut agent, &experts, &slices)?;
    log::info!("Level completed in attempt {} with {} hand-offs", report.attempts, report.handoffs.len());
    Ok(report)
}

pub fn run_probe(options: &ProbeOptions, settings: &Settings) -> Result<ProbeReport, TrainerError>{
    let report = if options.link.simulate{
        probe(&mut simulated_channel(&options.link), options.frames)
    } else {
        let mut channel = SharedChannel::attach(&settings.paths.segment, settings.channel).map_err(DashError::from)?;
        probe(&mut channel, options.frames)
    };
    if report.stale_reads > 0{
        log::warn!("{} of {} reads timed out waiting for the game", report.stale_reads, report.frames);
    }
    Ok(report)
}

#[cfg(test)]
mod tests{
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use clap::Parser;
    use dashrelay_core::error::DashError;
    use dashrelay_core::orchestrator::TrainingOutcome;
    use dashrelay_rl::policy::DqnConfig;
    use crate::error::TrainerError;
    use crate::journal::TRAINING_LOG;
    use crate::options::{Command, DashRelayOptions};
    use crate::session::{run_play, run_probe, run_train};
    use crate::settings::{PathSettings, Settings};

    fn settings(root: &Path) -> Settings{
        let curriculum = root.join("curriculum.json");
        fs::write(&curriculum, r#"[
            {"id": 1, "start": 0.0, "end": 50.0, "mode": "cube", "description": "first spikes"},
            {"id": 2, "start": 50.0, "end": 100.0, "mode": 0}
        ]"#).unwrap();
        let mut s = Settings{
            paths: PathSettings{
                segment: root.join("no_such_segment"),
                curriculum,
                checkpoints: root.join("checkpoints"),
                logs: root.join("logs"),
            },
            dqn: DqnConfig{hidden_layers: vec![16], head: 8, batch_size: 8, ..Default::default()},
            ..Default::default()
        };
        s.orchestrator.batch_size = 8;
        s.orchestrator.max_episodes = Some(2);
        s
    }

    #[test]
    fn simulated_training_writes_journal_and_checkpoint(){
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let cli = DashRelayOptions::parse_from(["dashrelay", "train", "--simulate"]);
        let Command::Train(t) = &cli.command else { panic!("expected train command") };
        let outcome = run_train(t, &s, Arc::new(AtomicBool::new(false))).unwrap();
        assert_eq!(outcome, TrainingOutcome::EpisodeLimit);
        let journal = fs::read_to_string(s.paths.logs.join(TRAINING_LOG)).unwrap();
        assert_eq!(journal.lines().count(), 2);
        assert!(s.paths.checkpoints.join("slice_01_current.ot").exists());
        assert!(s.paths.progress_file().exists());
    }

    #[test]
    fn missing_segment_is_fatal(){
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let cli = DashRelayOptions::parse_from(["dashrelay", "probe"]);
        let Command::Probe(p) = &cli.command else { panic!("expected probe command") };
        let err = run_probe(p, &s).unwrap_err();
        assert!(matches!(err, TrainerError::Dash(_)));
        assert!(format!("{err}").contains("no_such_segment"));
    }

    #[test]
    fn play_without_experts_fails_after_attempts(){
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.relay.max_attempts = 2;
        let cli = DashRelayOptions::parse_from(["dashrelay", "play", "--simulate", "--simulate-hazards", "5"]);
        let Command::Play(p) = &cli.command else { panic!("expected play command") };
        // untrained weights may happen to hold through the only hazard
        match run_play(p, &s){
            Ok(report) => assert_eq!(report.reached_percent, 100.0),
            Err(e) => assert!(matches!(e, TrainerError::Dash(DashError::Relay {..})), "{e}"),
        }
    }
}
