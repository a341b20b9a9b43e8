use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_derive::Serialize;

/// One job's mutable status, readable as a snapshot by polling callers.
///
/// Terminal once `completed` is set; a new job gets a fresh handle rather
/// than reusing this one.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressState {
    pub percent: f32,
    pub message: String,
    pub current_frame: u64,
    pub total_frames: u64,
    pub completed: bool,
    pub success: bool,
    pub error: Option<String>,
    pub output_path: Option<PathBuf>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            percent: 0.0,
            message: "Initializing...".into(),
            current_frame: 0,
            total_frames: 0,
            completed: false,
            success: false,
            error: None,
            output_path: None,
        }
    }
}

/// Shared accessor around one job's `ProgressState`.
///
/// Exactly one writer (the running pipeline) and any number of polling
/// readers; readers never mutate.
#[derive(Debug, Clone, Default)]
pub struct JobHandle {
    state: Arc<RwLock<ProgressState>>,
}

impl JobHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressState {
        self.read().clone()
    }

    pub fn is_completed(&self) -> bool {
        self.read().completed
    }

    fn read(&self) -> RwLockReadGuard<'_, ProgressState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ProgressState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn publish(&self, percent: f32, message: impl Into<String>) {
        let message = message.into();
        log::debug!("progress {:.1}%: {}", percent, message);

        let mut state = self.write();
        state.percent = percent.clamp(0.0, 100.0);
        state.message = message;
    }

    pub(crate) fn set_frames(&self, current: u64, total: u64) {
        let mut state = self.write();
        state.current_frame = current;
        state.total_frames = total;
    }

    pub(crate) fn finish(&self, output_path: PathBuf) {
        let mut state = self.write();
        state.percent = 100.0;
        state.message = "Processing complete!".into();
        state.completed = true;
        state.success = true;
        state.output_path = Some(output_path);
    }

    pub(crate) fn fail(&self, error: String) {
        log::error!("job failed: {}", error);

        let mut state = self.write();
        state.completed = true;
        state.success = false;
        state.error = Some(error);
    }
}
