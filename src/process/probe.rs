use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::bridge::output::collect_bounded;
use crate::foundation::error::{MediaError, MediaResult};
use crate::graph::compile::{FIRST_CHILD_FD, FdInput, FdSource};
use crate::process::run::{Runner, spawn_and_wait};

/// Media to probe.
#[derive(Debug)]
pub enum ProbeInput<'a> {
    /// File path.
    Path(&'a Path),
    /// Open regular file; the tool reopens it through `/dev/fd`, so the caller's offset is
    /// untouched.
    Handle(&'a File),
}

/// Duration reported for one stream.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct StreamInfo {
    /// `video`, `audio`, `subtitle`, ...
    pub codec_type: String,
    /// Seconds, when the container reports it.
    pub duration: Option<f64>,
}

/// Shape of a media file, enough to decide the filter-graph layout.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ProbeInfo {
    /// Width of the first video stream.
    pub width: u32,
    /// Height of the first video stream.
    pub height: u32,
    /// Whether any audio stream exists.
    pub has_audio: bool,
    /// Container duration in seconds.
    pub duration: Option<f64>,
    /// Per-stream details in container order.
    pub streams: Vec<StreamInfo>,
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Parse `ffprobe -print_format json -show_streams -show_format` output.
pub fn parse_probe_json(bytes: &[u8]) -> MediaResult<ProbeInfo> {
    let parsed: ProbeOut = serde_json::from_slice(bytes)
        .map_err(|e| MediaError::exec(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::validation("no video stream found"))?;
    let width = video
        .width
        .ok_or_else(|| MediaError::exec("missing video width from ffprobe"))?;
    let height = video
        .height
        .ok_or_else(|| MediaError::exec("missing video height from ffprobe"))?;
    let streams: Vec<StreamInfo> = parsed
        .streams
        .iter()
        .map(|s| StreamInfo {
            codec_type: s.codec_type.clone().unwrap_or_default(),
            duration: s.duration.as_deref().and_then(|d| d.parse::<f64>().ok()),
        })
        .collect();
    Ok(ProbeInfo {
        width,
        height,
        has_audio: streams.iter().any(|s| s.codec_type == "audio"),
        duration: parsed
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok()),
        streams,
    })
}

impl Runner {
    /// Probe stream metadata. Holds a throttle slot while `ffprobe` runs.
    #[tracing::instrument(skip(self))]
    pub fn probe(&self, input: ProbeInput<'_>) -> MediaResult<ProbeInfo> {
        let mut args: Vec<OsString> = [
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        let mut fds = Vec::new();
        match input {
            ProbeInput::Path(p) => args.push(PathBuf::from(p).into_os_string()),
            ProbeInput::Handle(f) => {
                let dup = f.try_clone().context("duplicate probe handle")?;
                args.push(format!("/dev/fd/{FIRST_CHILD_FD}").into());
                fds.push(FdInput {
                    child_fd: FIRST_CHILD_FD,
                    source: FdSource::File(dup),
                });
            }
        }

        let _permit = self.throttle().acquire();
        let cap = self.memory_cap();
        let temp_dir = self.temp_dir().to_path_buf();
        let out = spawn_and_wait(self.ffprobe(), &args, fds, true, move |stdout| {
            collect_bounded(stdout, cap, &temp_dir, "json")
        })
        .map_err(|e| match e {
            MediaError::Process { code, stderr } => MediaError::exec(format!(
                "ffprobe exited with status {code}: {stderr}"
            )),
            other => other,
        })?;
        let json = match out.stdout {
            Some(c) => c.into_bytes()?,
            None => Vec::new(),
        };
        let info = parse_probe_json(&json)?;
        tracing::debug!(
            width = info.width,
            height = info.height,
            has_audio = info.has_audio,
            "probed"
        );
        Ok(info)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/process/probe.rs"]
mod tests;
