use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;

use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio,
};
use serde_derive::{Deserialize, Serialize};

use crate::audio::{AudioMerger, FfmpegMerger};
use crate::detector::{BackendConfig, DetectionBackend};
use crate::effects::{EffectsRenderer, DEFAULT_CONNECTION_PROBABILITY};
use crate::progress::JobHandle;
use crate::tracker::CentroidTracker;
use crate::Error;

/// Progress is published every Nth frame to bound update overhead.
const PROGRESS_REPORT_INTERVAL: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    pub use_neural_backend: bool,
    pub confidence: f32,
    pub connection_probability: f32,
    /// ONNX model for the neural backend; without one the job runs on
    /// background subtraction.
    pub model_path: Option<PathBuf>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            use_neural_backend: true,
            confidence: 0.15,
            connection_probability: DEFAULT_CONNECTION_PROBABILITY,
            model_path: None,
        }
    }
}

impl ProcessOptions {
    fn backend_config(&self) -> BackendConfig {
        match (&self.model_path, self.use_neural_backend) {
            (Some(model_path), true) => BackendConfig::neural(model_path, self.confidence),
            _ => BackendConfig::motion(),
        }
    }
}

/// Owns one job end-to-end: decode, detect, track, render, encode, then the
/// audio remux. Synchronous; `JobController` runs it off the caller's thread.
pub struct VideoPipeline {
    options: ProcessOptions,
    audio: Box<dyn AudioMerger + Send + Sync>,
}

impl VideoPipeline {
    pub fn new(options: ProcessOptions) -> Self {
        Self::with_audio_merger(options, Box::new(FfmpegMerger::new()))
    }

    pub fn with_audio_merger(
        options: ProcessOptions,
        audio: Box<dyn AudioMerger + Send + Sync>,
    ) -> Self {
        Self { options, audio }
    }

    /// Runs the whole job and writes the terminal state into `handle` on
    /// every exit path. Returns the delivered artifact path.
    pub fn run(&self, input: &Path, output: &Path, handle: &JobHandle) -> Result<PathBuf, Error> {
        match self.run_inner(input, output, handle) {
            Ok(path) => {
                handle.finish(path.clone());
                Ok(path)
            }
            Err(err) => {
                handle.fail(err.to_string());
                Err(err)
            }
        }
    }

    fn run_inner(
        &self,
        input: &Path,
        output: &Path,
        handle: &JobHandle,
    ) -> Result<PathBuf, Error> {
        log::info!(
            "starting job: input={}, backend={}, confidence={}, connection_probability={}",
            input.display(),
            if self.options.model_path.is_some() && self.options.use_neural_backend {
                "neural"
            } else {
                "motion"
            },
            self.options.confidence,
            self.options.connection_probability,
        );

        handle.publish(5.0, "Opening video file...");

        if !input.exists() {
            return Err(Error::InputNotFound(input.to_path_buf()));
        }

        let mut cap = videoio::VideoCapture::from_file(&input.to_string_lossy(), videoio::CAP_ANY)?;
        if !videoio::VideoCapture::is_opened(&cap)? {
            return Err(Error::InputOpen(format!("{}", input.display())));
        }

        let fps = cap.get(videoio::CAP_PROP_FPS)?;
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        let total_frames = cap.get(videoio::CAP_PROP_FRAME_COUNT)? as i64;

        if total_frames <= 0 {
            return Err(Error::InputOpen("no decodable frames reported".into()));
        }

        handle.set_frames(0, total_frames as u64);
        handle.publish(
            10.0,
            format!("Video loaded: {}x{}, {} frames", width, height, total_frames),
        );

        let silent_path = silent_output_path(output);
        let fourcc = videoio::VideoWriter::fourcc(b'm' as _, b'p' as _, b'4' as _, b'v' as _)?;
        let mut writer = videoio::VideoWriter::new(
            &silent_path.to_string_lossy(),
            fourcc,
            fps,
            Size::new(width, height),
            true,
        )?;
        if !writer.is_opened()? {
            return Err(Error::OutputCreate(format!("{}", silent_path.display())));
        }

        handle.publish(15.0, "Initializing object tracker...");

        let mut backend = self.options.backend_config().build()?;
        let mut tracker = CentroidTracker::new();
        let mut renderer = EffectsRenderer::new(self.options.connection_probability);

        handle.publish(20.0, "Processing frames...");

        let mut frame = Mat::default();
        let mut current: u64 = 0;

        loop {
            let more = process_frame(
                &mut cap,
                &mut writer,
                backend.as_mut(),
                &mut tracker,
                &mut renderer,
                &mut frame,
            )
            .map_err(|source| Error::FrameProcessing {
                frame: current + 1,
                source,
            })?;

            if !more {
                break;
            }

            current += 1;
            handle.set_frames(current, total_frames as u64);

            if current % PROGRESS_REPORT_INTERVAL == 0 || current as i64 == total_frames {
                let percent = 20.0 + (current as f32 / total_frames as f32) * 60.0;
                handle.publish(
                    percent,
                    format!("Processing frame {}/{}", current, total_frames),
                );
            }
        }

        cap.release()?;
        writer.release()?;

        if current == 0 {
            return Err(Error::NoFramesProcessed);
        }

        log::info!("processed {} frames, merging audio", current);
        handle.publish(85.0, "Merging audio...");

        if let Err(err) = self.audio.merge(input, &silent_path, output) {
            // The job still succeeds with a silent artifact.
            log::warn!("{}", err);
        }

        let delivered = if output.exists() {
            output.to_path_buf()
        } else {
            silent_path
        };

        Ok(delivered)
    }
}

fn process_frame(
    cap: &mut videoio::VideoCapture,
    writer: &mut videoio::VideoWriter,
    backend: &mut dyn DetectionBackend,
    tracker: &mut CentroidTracker,
    renderer: &mut EffectsRenderer,
    frame: &mut Mat,
) -> opencv::Result<bool> {
    if !cap.read(frame)? || frame.empty() {
        return Ok(false);
    }

    let detections = backend.detect(frame)?;
    let objects = tracker.update(&detections);
    renderer.render(frame, objects)?;
    writer.write(frame)?;

    Ok(true)
}

fn silent_output_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());

    let mut name = format!("{}_silent", stem);
    if let Some(ext) = output.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }

    output.with_file_name(name)
}

/// Admission control plus the background worker: at most one job in flight,
/// a second start attempt is rejected rather than queued.
#[derive(Default)]
pub struct JobController {
    current: Mutex<Option<JobHandle>>,
}

impl JobController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the most recently started job, if any.
    pub fn current(&self) -> Option<JobHandle> {
        self.lock_current().clone()
    }

    /// Starts a job on a background thread and returns its handle for
    /// polling. Fails with `JobAlreadyRunning` while a previous job is
    /// incomplete; that rejection never touches pipeline state.
    pub fn start(
        &self,
        input: PathBuf,
        output: PathBuf,
        options: ProcessOptions,
    ) -> Result<JobHandle, Error> {
        let mut current = self.lock_current();

        if let Some(handle) = current.as_ref() {
            if !handle.is_completed() {
                return Err(Error::JobAlreadyRunning);
            }
        }

        let handle = JobHandle::new();
        *current = Some(handle.clone());

        let worker = handle.clone();
        thread::Builder::new()
            .name("objectify-job".into())
            .spawn(move || {
                let pipeline = VideoPipeline::new(options);
                // run() already recorded the failure in the handle.
                let _ = pipeline.run(&input, &output, &worker);
            })?;

        Ok(handle)
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<JobHandle>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_path_sits_next_to_the_output() {
        let silent = silent_output_path(Path::new("/tmp/jobs/render.mp4"));
        assert_eq!(silent, Path::new("/tmp/jobs/render_silent.mp4"));

        let no_ext = silent_output_path(Path::new("/tmp/jobs/render"));
        assert_eq!(no_ext, Path::new("/tmp/jobs/render_silent"));
    }

    #[test]
    fn default_options_match_the_job_surface() {
        let options = ProcessOptions::default();
        assert!(options.use_neural_backend);
        assert_eq!(options.confidence, 0.15);
        assert_eq!(options.connection_probability, 0.3);
        assert!(options.model_path.is_none());
    }

    #[test]
    fn second_start_is_rejected_while_incomplete() {
        let controller = JobController::new();

        // Simulate an in-flight job.
        let running = JobHandle::new();
        *controller.lock_current() = Some(running.clone());

        let err = controller
            .start(
                PathBuf::from("in.mp4"),
                PathBuf::from("out.mp4"),
                ProcessOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::JobAlreadyRunning));

        // Once the current job completes, admission opens up again.
        running.fail("boom".into());
        assert!(controller
            .start(
                PathBuf::from("in.mp4"),
                PathBuf::from("out.mp4"),
                ProcessOptions::default(),
            )
            .is_ok());
    }

    #[test]
    fn missing_input_fails_before_any_processing() {
        let handle = JobHandle::new();
        let pipeline = VideoPipeline::new(ProcessOptions {
            use_neural_backend: false,
            ..Default::default()
        });

        let err = pipeline
            .run(
                Path::new("definitely-missing.mp4"),
                Path::new("/tmp/unused-output.mp4"),
                &handle,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InputNotFound(_)));

        let state = handle.snapshot();
        assert!(state.completed);
        assert!(!state.success);
        assert!(state.error.unwrap().contains("not found"));
        assert_eq!(state.current_frame, 0);
    }
}
