use std::path::PathBuf;
use thiserror::Error;

/// Error while attaching to shared memory segment.
#[derive(Debug, Error)]
pub enum ChannelError{
    #[error("Shared memory segment {segment:?} could not be attached ({source}). Make sure the game is running with the bridge mod loaded.")]
    SegmentUnavailable{
        segment: PathBuf,
        #[source]
        source: std::io::Error
    },
    #[error("Shared memory segment {segment:?} has {found} bytes, record needs {required}")]
    SegmentTooSmall{
        segment: PathBuf,
        found: u64,
        required: usize,
    },
}
