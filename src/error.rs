use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("could not open video stream: {0}")]
    InputOpen(String),

    #[error("could not create output video: {0}")]
    OutputCreate(String),

    #[error("frame processing failed at frame {frame}: {source}")]
    FrameProcessing {
        frame: u64,
        source: opencv::Error,
    },

    #[error("no frames were processed")]
    NoFramesProcessed,

    /// Non-fatal: the job still delivers the silent render.
    #[error("audio merge failed: {0}")]
    AudioMerge(String),

    /// Admission rejection, not a pipeline failure.
    #[error("another job is already running")]
    JobAlreadyRunning,

    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
