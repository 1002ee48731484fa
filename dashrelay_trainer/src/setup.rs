use crate::options::DashRelayOptions;

pub fn setup_logger(options: &DashRelayOptions) -> Result<(), fern::InitError> {
    let dispatch  = fern::Dispatch::new()

        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(options.log_level)
        .level_for("dashrelay", options.log_level)
        .level_for("dashrelay_trainer", options.log_level)
        .level_for("dashrelay_core", options.log_level_core)
        .level_for("dashrelay_rl", options.log_level_rl);

    match &options.log_file{
        None => dispatch.chain(std::io::stdout()),
        Some(f) => dispatch.chain(fern::log_file(f)?)
    }

        .apply()?;
    Ok(())
}
