use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use anyhow::Context;
use clap::Parser;
use dashrelay_trainer::options::{Command, DashRelayOptions};
use dashrelay_trainer::session::{run_play, run_probe, run_train};
use dashrelay_trainer::settings::Settings;
use dashrelay_trainer::setup::setup_logger;

fn main() -> anyhow::Result<()>{

    let cli = DashRelayOptions::parse();
    setup_logger(&cli)?;

    let mut settings = Settings::load(cli.settings.as_deref())?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            log::warn!("Stop requested, finishing current step and saving checkpoint");
            stop.store(true, Ordering::Relaxed);
        }).context("Installing Ctrl-C handler")?;
    }

    match &cli.command{
        Command::Train(options) => {
            settings.apply_train_options(options);
            log::info!("Training with settings:\n{}", serde_yaml::to_string(&settings)?);
            let outcome = run_train(options, &settings, stop)
                .context("Training session failed")?;
            log::info!("Outcome: {:?}", outcome);
        },
        Command::Play(options) => {
            settings.apply_play_options(options);
            let report = run_play(options, &settings)
                .context("Playback failed")?;
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "attempts": report.attempts,
                "reached_percent": report.reached_percent,
                "handoffs": report.handoffs.iter().map(|h| (h.percent, h.slice_id)).collect::<Vec<_>>(),
            }))?);
        },
        Command::Probe(options) => {
            if let Some(s) = &options.link.segment{
                settings.paths.segment = s.clone();
            }
            let report = run_probe(options, &settings)
                .context("Probe failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
