use std::path::Path;
use std::thread;

use anyhow::Context as _;
use image::{DynamicImage, RgbaImage};

use crate::bridge::output::{Collected, collect_bounded, ensure_parent_dir};
use crate::bridge::pipe::{ChannelWriter, channel_pipe, write_png};
use crate::config::Config;
use crate::foundation::error::{MediaError, MediaResult};
use crate::gif_pipeline::{GifStats, spawn_piped};
use crate::graph::{Cmd, Graph, StreamId, Target};
use crate::process::Runner;
use crate::render::overlay::OverlayRenderer;

/// Chunks buffered between an in-process encoder and the output collector.
const PNG_PIPE_CHUNKS: usize = 16;

/// Collaborators and knobs shared by the media call sites.
#[derive(Clone, Copy)]
pub struct MediaContext<'a> {
    pub runner: &'a Runner,
    pub renderer: &'a dyn OverlayRenderer,
    /// Worker count for the in-process GIF pipeline.
    pub gif_workers: usize,
    /// Frame rate for GIFs produced by ffmpeg.
    pub gif_fps: u32,
    /// Composite GIF inputs in-process rather than through ffmpeg.
    pub gif_in_process: bool,
}

impl std::fmt::Debug for MediaContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaContext")
            .field("runner", self.runner)
            .field("gif_workers", &self.gif_workers)
            .field("gif_fps", &self.gif_fps)
            .field("gif_in_process", &self.gif_in_process)
            .finish_non_exhaustive()
    }
}

impl<'a> MediaContext<'a> {
    /// Context with default GIF settings.
    pub fn new(runner: &'a Runner, renderer: &'a dyn OverlayRenderer) -> Self {
        Self::from_config(&Config::default(), runner, renderer)
    }

    /// Context taking its GIF settings from `cfg`.
    pub fn from_config(cfg: &Config, runner: &'a Runner, renderer: &'a dyn OverlayRenderer) -> Self {
        Self {
            runner,
            renderer,
            gif_workers: cfg.gif_workers,
            gif_fps: cfg.gif_fps,
            gif_in_process: cfg.gif_in_process,
        }
    }
}

/// Finished output of a media job, in memory or spilled to a temp file.
#[derive(Debug)]
pub struct Rendered {
    pub data: Collected,
    /// Container extension, e.g. `gif`.
    pub format: &'static str,
}

impl Rendered {
    /// Conventional attachment name, `out.<format>`.
    pub fn file_name(&self) -> String {
        format!("out.{}", self.format)
    }

    pub fn len(&self) -> u64 {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the output to `dest`, creating parent directories. Returns the byte count.
    pub fn save(self, dest: &Path) -> MediaResult<u64> {
        ensure_parent_dir(dest)?;
        self.data.persist(dest)
    }
}

pub(crate) fn decode_image(path: &Path) -> MediaResult<DynamicImage> {
    let img = image::ImageReader::open(path)
        .with_context(|| format!("open image '{}'", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("read image '{}'", path.display()))?
        .decode()
        .with_context(|| format!("decode image '{}'", path.display()))?;
    Ok(img)
}

/// Encode `image` as PNG on a helper thread, collecting it under the memory cap.
pub(crate) fn encode_png(ctx: &MediaContext<'_>, image: &RgbaImage) -> MediaResult<Rendered> {
    let runner = ctx.runner;
    let (collected, encoded) = thread::scope(|s| {
        let (mut writer, reader) = channel_pipe(PNG_PIPE_CHUNKS);
        let encoder = s.spawn(move || match write_png(image, &mut writer) {
            Ok(()) => writer.close(),
            Err(e) => {
                let msg = e.to_string();
                writer.close_with_error(e);
                Err(std::io::Error::other(msg))
            }
        });
        let collected = collect_bounded(reader, runner.memory_cap(), runner.temp_dir(), "png");
        (collected, encoder.join())
    });
    encoded
        .map_err(|_| MediaError::bridge("png encoder panicked"))?
        .map_err(|e| MediaError::bridge(format!("encoding png: {e}")))?;
    Ok(Rendered {
        data: collected?,
        format: "png",
    })
}

/// Run a GIF pipeline job and collect its output under the memory cap.
///
/// The job holds a throttle slot while it runs, like an external tool. Its own error wins
/// over the read failure it causes on the collector side.
pub(crate) fn collect_gif<J>(ctx: &MediaContext<'_>, job: J) -> MediaResult<Rendered>
where
    J: FnOnce(&mut ChannelWriter) -> MediaResult<GifStats> + Send,
{
    let runner = ctx.runner;
    let _permit = runner.throttle().acquire();
    let (collected, joined) = thread::scope(|s| {
        let (reader, handle) = spawn_piped(s, job);
        let collected = collect_bounded(reader, runner.memory_cap(), runner.temp_dir(), "gif");
        (collected, handle.join())
    });
    joined.map_err(|_| MediaError::gif("gif pipeline panicked"))??;
    Ok(Rendered {
        data: collected?,
        format: "gif",
    })
}

/// `fps`, then the split/palettegen/paletteuse pair for a good GIF palette.
pub(crate) fn gif_palette(g: &mut Graph, v: StreamId, fps: u32) -> StreamId {
    let v = g.filter(v, format!("fps={fps}"));
    let (frames, sample) = g.split(v);
    let palette = g.palette_gen(sample);
    g.palette_use(frames, palette)
}

/// Output options for a GIF written by ffmpeg.
pub(crate) fn gif_output_args() -> [&'static str; 4] {
    ["-f", "gif", "-vsync", "0"]
}

/// Output options for an mp4 streamed to a pipe.
pub(crate) fn mp4_output_args() -> [&'static str; 7] {
    [
        "-f",
        "mp4",
        "-shortest",
        "-pix_fmt",
        "yuv420p",
        "-movflags",
        "frag_keyframe+empty_moov",
    ]
}

/// Map `streams` to the tool's stdout and compile the job.
pub(crate) fn stdout_cmd(mut g: Graph, args: &[&str], streams: &[StreamId]) -> MediaResult<Cmd> {
    g.add_output(Target::Stdout, args.iter().copied(), streams);
    g.cmd()
}

/// Run a job built by [`stdout_cmd`] and collect what it wrote.
pub(crate) fn run_to_stdout(
    ctx: &MediaContext<'_>,
    cmd: Cmd,
    format: &'static str,
) -> MediaResult<Rendered> {
    let out = ctx.runner.run(cmd)?;
    let data = out
        .stdout
        .ok_or_else(|| MediaError::exec("ffmpeg produced no output"))?;
    tracing::info!(format, bytes = data.len(), "media job finished");
    Ok(Rendered { data, format })
}

#[cfg(test)]
#[path = "../../tests/unit/media/context.rs"]
mod tests;
