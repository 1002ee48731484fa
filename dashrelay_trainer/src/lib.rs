//! Runnable side of `dashrelay`: command line options, YAML settings, logger setup,
//! episode journal and the `train` / `play` / `probe` sessions.

pub mod options;
pub mod settings;
pub mod setup;
pub mod error;
pub mod journal;
pub mod probe;
pub mod session;
