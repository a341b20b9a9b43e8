use std::path::Path;
use std::process::Command;

use crate::Error;

/// Reattaches the original audio track to a silently rendered video.
///
/// The contract is best-effort: implementations must either produce `dest`
/// with audio merged in, or move the silent render into `dest` unchanged.
/// Only failure to deliver any file at all is an error, and the pipeline
/// treats even that as non-fatal.
pub trait AudioMerger {
    fn merge(&self, source: &Path, silent: &Path, dest: &Path) -> Result<(), Error>;
}

/// Remuxes through the `ffmpeg` binary: video stream copied from the silent
/// render, audio (if any) taken from the original source.
pub struct FfmpegMerger {
    binary: String,
}

impl FfmpegMerger {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".into(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioMerger for FfmpegMerger {
    fn merge(&self, source: &Path, silent: &Path, dest: &Path) -> Result<(), Error> {
        let status = Command::new(&self.binary)
            .args(["-v", "error", "-y"])
            .arg("-i")
            .arg(silent)
            .arg("-i")
            .arg(source)
            // "1:a:0?" tolerates sources without any audio track.
            .args(["-map", "0:v:0", "-map", "1:a:0?", "-c:v", "copy", "-c:a", "aac"])
            .arg(dest)
            .status();

        match status {
            Ok(status) if status.success() && dest.exists() => {
                let _ = std::fs::remove_file(silent);
                Ok(())
            }
            Ok(status) => {
                log::warn!("ffmpeg exited with {}; delivering silent render", status);
                deliver_silent(silent, dest)
            }
            Err(err) => {
                log::warn!("ffmpeg unavailable ({}); delivering silent render", err);
                deliver_silent(silent, dest)
            }
        }
    }
}

fn deliver_silent(silent: &Path, dest: &Path) -> Result<(), Error> {
    std::fs::rename(silent, dest)
        .map_err(|err| Error::AudioMerge(format!("could not move silent render into place: {}", err)))
}
