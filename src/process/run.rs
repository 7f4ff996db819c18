use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;

use image::RgbaImage;

use crate::bridge::output::{Collected, collect_bounded};
use crate::bridge::pipe::spawn_png_writer;
use crate::config::Config;
use crate::foundation::error::{MediaError, MediaResult};
use crate::graph::compile::{Cmd, FdInput, FdSource};
use crate::process::throttle::{Permit, Throttle};

/// What a finished invocation left behind.
#[derive(Debug)]
pub struct RunOutput {
    /// Standard output, when the command mapped an output to it.
    pub stdout: Option<Collected>,
    /// Standard error text (warnings on success).
    pub stderr: String,
}

/// Spawns the external tools, each invocation admitted through a shared [`Throttle`].
#[derive(Clone, Debug)]
pub struct Runner {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    throttle: Throttle,
    memory_cap: u64,
    temp_dir: PathBuf,
}

impl Runner {
    /// Runner for the given binaries.
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>, throttle: Throttle) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            throttle,
            memory_cap: 8_000_000,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Runner configured from `cfg`, with a fresh throttle of `cfg.max_processes` slots.
    pub fn from_config(cfg: &Config) -> MediaResult<Self> {
        let throttle = Throttle::new(cfg.max_processes)?;
        Ok(Self {
            ffmpeg: cfg.ffmpeg.clone(),
            ffprobe: cfg.ffprobe.clone(),
            throttle,
            memory_cap: cfg.memory_cap_bytes,
            temp_dir: cfg.temp_dir(),
        })
    }

    /// Shared admission gate.
    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Directory used for temporary files.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// In-memory cap for captured standard output.
    pub fn memory_cap(&self) -> u64 {
        self.memory_cap
    }

    pub(crate) fn ffprobe(&self) -> &Path {
        &self.ffprobe
    }

    /// Run a compiled command once a throttle slot is free.
    #[tracing::instrument(skip_all, fields(fds = cmd.fds().len()))]
    pub fn run(&self, cmd: Cmd) -> MediaResult<RunOutput> {
        let _permit: Permit = self.throttle.acquire();
        self.run_unthrottled(cmd)
    }

    fn run_unthrottled(&self, cmd: Cmd) -> MediaResult<RunOutput> {
        tracing::debug!(program = %self.ffmpeg.display(), args = %cmd.display_args(), "spawning");
        let (args, fds, captures_stdout) = cmd.into_parts();
        let out = spawn_and_wait(&self.ffmpeg, &args, fds, captures_stdout, |stdout| {
            collect_bounded(stdout, self.memory_cap, &self.temp_dir, "out")
        })?;
        if let Some(collected) = &out.stdout {
            tracing::info!(bytes = collected.len(), "ffmpeg finished");
        } else {
            tracing::info!("ffmpeg finished");
        }
        Ok(out)
    }
}

/// Spawn `program`, feed it the extra descriptors, and wait for it.
///
/// Image descriptors are backed by OS pipes whose PNG encoders start only after the child is
/// running. The parent's copies of every mapped descriptor are dropped right after spawn so
/// a reader that exits early turns encoder writes into `BrokenPipe` instead of a hang.
pub(crate) fn spawn_and_wait<F>(
    program: &Path,
    args: &[OsString],
    fds: Vec<FdInput>,
    captures_stdout: bool,
    collect_stdout: F,
) -> MediaResult<RunOutput>
where
    F: FnOnce(std::process::ChildStdout) -> MediaResult<Collected> + Send,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(if captures_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(Stdio::piped());

    let pending = install_fds(&mut command, fds)?;
    let spawned = command.spawn();
    drop(command);
    let mut child = spawned.map_err(|e| {
        MediaError::exec(format!(
            "failed to spawn '{}' (is it installed and on PATH?): {e}",
            program.display()
        ))
    })?;

    let encoders: Vec<JoinHandle<io::Result<()>>> = pending
        .into_iter()
        .map(|(image, writer)| spawn_png_writer(image, writer))
        .collect();

    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::exec("failed to open ffmpeg stderr (unexpected)"))?;
    let stdout = child.stdout.take();

    std::thread::scope(|scope| {
        let stderr_drain = scope.spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes).map(|_| bytes)
        });
        let stdout_drain = stdout.map(|out| scope.spawn(move || collect_stdout(out)));

        let status = child
            .wait()
            .map_err(|e| MediaError::exec(format!("failed to wait for ffmpeg: {e}")));

        let stderr_bytes = stderr_drain
            .join()
            .map_err(|_| MediaError::exec("ffmpeg stderr drain thread panicked"))?
            .map_err(|e| MediaError::exec(format!("ffmpeg stderr read failed: {e}")))?;
        let stderr_text = String::from_utf8_lossy(&stderr_bytes).trim().to_string();
        let stdout_result = match stdout_drain {
            Some(h) => Some(
                h.join()
                    .map_err(|_| MediaError::exec("ffmpeg stdout drain thread panicked"))?,
            ),
            None => None,
        };
        let encoder_results: Vec<io::Result<()>> = encoders
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(io::Error::other("image encoder thread panicked")))
            })
            .collect();

        let status = status?;
        if !status.success() {
            for r in &encoder_results {
                if let Err(e) = r {
                    tracing::warn!(error = %e, "image encoder ended early after ffmpeg failure");
                }
            }
            return Err(MediaError::process(exit_code(status), &stderr_text));
        }
        for r in encoder_results {
            match r {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    tracing::warn!("ffmpeg stopped reading an image input before its end");
                }
                Err(e) => {
                    return Err(MediaError::bridge(format!("encoding image input: {e}")));
                }
            }
        }
        let stdout = stdout_result.transpose()?;
        if !stderr_text.is_empty() {
            tracing::debug!(stderr = %stderr_text, "ffmpeg stderr");
        }
        Ok(RunOutput {
            stdout,
            stderr: stderr_text,
        })
    })
}

fn exit_code(status: ExitStatus) -> String {
    status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| status.to_string())
}

type PendingImage = (Arc<RgbaImage>, io::PipeWriter);

#[cfg(unix)]
fn install_fds(command: &mut Command, fds: Vec<FdInput>) -> MediaResult<Vec<PendingImage>> {
    use anyhow::Context as _;
    use command_fds::{CommandFdExt as _, FdMapping};

    if fds.is_empty() {
        return Ok(Vec::new());
    }
    let mut mappings = Vec::with_capacity(fds.len());
    let mut pending = Vec::new();
    for fd in fds {
        match fd.source {
            FdSource::File(file) => mappings.push(FdMapping {
                parent_fd: file.into(),
                child_fd: fd.child_fd,
            }),
            FdSource::Image(image) => {
                let (reader, writer) = io::pipe().context("create image pipe")?;
                mappings.push(FdMapping {
                    parent_fd: reader.into(),
                    child_fd: fd.child_fd,
                });
                pending.push((image, writer));
            }
        }
    }
    command
        .fd_mappings(mappings)
        .map_err(|e| MediaError::exec(format!("mapping descriptors into ffmpeg: {e}")))?;
    Ok(pending)
}

#[cfg(not(unix))]
fn install_fds(_command: &mut Command, fds: Vec<FdInput>) -> MediaResult<Vec<PendingImage>> {
    if fds.is_empty() {
        return Ok(Vec::new());
    }
    Err(MediaError::exec(
        "handle and in-memory image inputs need a unix platform",
    ))
}

/// Return `true` when `program -version` runs successfully.
pub fn tool_available(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/process/run.rs"]
mod tests;
