//! Runtime configuration.
//!
//! Every field has a default so an empty JSON object (or no file at all) is a valid config.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{MediaError, MediaResult};

/// Pipeline configuration, loadable from JSON.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Maximum concurrent external-process invocations (throttle weight).
    pub max_processes: usize,
    /// Worker count for the in-process GIF frame pipeline.
    pub gif_workers: usize,
    /// In-memory output cap in bytes; larger outputs spill to a temp file.
    pub memory_cap_bytes: u64,
    /// Outputs at or below this size are attached directly, larger ones are published.
    pub attach_limit_bytes: u64,
    /// Loop length in seconds for still images fed to the edit pipeline.
    pub default_length_secs: u32,
    /// Frame rate used for GIF outputs produced by ffmpeg.
    pub gif_fps: u32,
    /// Encode GIF composites in-process instead of through ffmpeg.
    pub gif_in_process: bool,
    /// `ffmpeg` binary name or path.
    pub ffmpeg: PathBuf,
    /// `ffprobe` binary name or path.
    pub ffprobe: PathBuf,
    /// Directory large outputs are published into.
    pub output_dir: Option<PathBuf>,
    /// Public URL prefix for files in `output_dir`.
    pub output_url: Option<String>,
    /// Directory for temporary and spilled files. `None` uses the OS temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            max_processes: cores * 2,
            gif_workers: cores,
            memory_cap_bytes: 8_000_000,
            attach_limit_bytes: 8_000_000,
            default_length_secs: 15,
            gif_fps: 20,
            gif_in_process: true,
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            output_dir: None,
            output_url: None,
            temp_dir: None,
        }
    }
}

impl Config {
    /// Load and validate a JSON config file.
    pub fn from_path(path: &Path) -> MediaResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_json(&bytes)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(bytes: &[u8]) -> MediaResult<Self> {
        let cfg: Self = serde_json::from_slice(bytes)
            .map_err(|e| MediaError::validation(format!("invalid config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> MediaResult<()> {
        if self.max_processes == 0 {
            return Err(MediaError::validation("max_processes must be >= 1"));
        }
        if self.gif_workers == 0 {
            return Err(MediaError::validation("gif_workers must be >= 1"));
        }
        if self.default_length_secs == 0 {
            return Err(MediaError::validation("default_length_secs must be >= 1"));
        }
        if self.gif_fps == 0 {
            return Err(MediaError::validation("gif_fps must be >= 1"));
        }
        if self.output_dir.is_some() != self.output_url.is_some() {
            return Err(MediaError::validation(
                "output_dir and output_url must be set together",
            ));
        }
        Ok(())
    }

    /// Resolved directory for temporary files.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
