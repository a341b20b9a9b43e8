pub mod audio;
pub mod detection;
pub mod detector;
pub mod effects;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod tracker;

pub use audio::{AudioMerger, FfmpegMerger};
pub use detection::Detection;
pub use detector::{BackendConfig, BackendKind, DetectionBackend, MotionDetector, NeuralDetector};
pub use effects::EffectsRenderer;
pub use error::Error;
pub use pipeline::{JobController, ProcessOptions, VideoPipeline};
pub use progress::{JobHandle, ProgressState};
pub use tracker::{CentroidTracker, TrackedObject};

pub type Result<T> = std::result::Result<T, Error>;
