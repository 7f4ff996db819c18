use std::ffi::OsString;
use std::fs::File;

use anyhow::Context as _;

use crate::edit::args::{EditArgs, MusicResolver, PassthroughResolver};
use crate::foundation::core::fmt_num;
use crate::foundation::error::{MediaError, MediaResult};
use crate::graph::{Cmd, Graph, Input, StreamId, Target};
use crate::process::{ProbeInfo, ProbeInput, RunOutput, Runner};
use crate::render::overlay::{Overlay, OverlayRenderer};

/// Still-image loop length when neither the directives nor the caller choose one.
pub const DEFAULT_LENGTH_SECS: u32 = 15;

/// Cap on how much of a music track is read.
const MUSIC_MAX_SECS: &str = "600";

/// Fade duration used when only a start time is given.
const DEFAULT_FADE_SECS: f64 = 5.0;

/// What kind of media is being edited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputType {
    /// Anything with a time axis.
    Video,
    /// A still image, looped into a clip first.
    Image,
}

/// Collaborators and defaults used while planning an edit.
#[derive(Clone, Copy)]
pub struct EditContext<'a> {
    pub renderer: &'a dyn OverlayRenderer,
    pub music: &'a dyn MusicResolver,
    pub default_length: u32,
}

impl std::fmt::Debug for EditContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditContext")
            .field("default_length", &self.default_length)
            .finish_non_exhaustive()
    }
}

impl<'a> EditContext<'a> {
    /// Context with pass-through music resolution and the default loop length.
    pub fn new(renderer: &'a dyn OverlayRenderer) -> Self {
        Self {
            renderer,
            music: &PassthroughResolver,
            default_length: DEFAULT_LENGTH_SECS,
        }
    }

    pub fn with_music(mut self, music: &'a dyn MusicResolver) -> Self {
        self.music = music;
        self
    }

    pub fn with_default_length(mut self, secs: u32) -> Self {
        self.default_length = secs;
        self
    }
}

/// Probe `input`, plan the edit, and run it.
///
/// The probe and the edit each hold a throttle slot only while their process runs.
#[tracing::instrument(skip_all, fields(input = ?input_type))]
pub fn apply_edits(
    runner: &Runner,
    args: &EditArgs,
    input_type: InputType,
    input: &File,
    output: Target,
    ctx: &EditContext<'_>,
) -> MediaResult<RunOutput> {
    let info = runner.probe(ProbeInput::Handle(input))?;
    let handle = input.try_clone().context("duplicate edit input handle")?;
    let cmd = plan_edit(args, input_type, &info, Input::handle(handle), output, ctx)?;
    runner.run(cmd)
}

/// Build the edit command without running anything.
///
/// Stages are applied in a fixed order: loop (images) → mute → trim → reverse → vibrato →
/// music → muffle/reverb → speed → meme text → caption → volume → spin → fades.
pub fn plan_edit(
    args: &EditArgs,
    input_type: InputType,
    info: &ProbeInfo,
    input: Input,
    output: Target,
    ctx: &EditContext<'_>,
) -> MediaResult<Cmd> {
    let mut g = Graph::new();
    let (mut width, mut height) = (info.width, info.height);

    let (mut v, mut a) = match input_type {
        InputType::Image => {
            let length = args.length.unwrap_or(ctx.default_length);
            let id = g.input(input.option("-stream_loop", "-1"));
            let v = g.video(id);
            let v = g.filter(v, "pad=ceil(iw/2)*2:ceil(ih/2)*2");
            let v = g.filter(v, format!("trim=duration={length}"));
            let silence = g.anullsrc();
            let a = g.filter(silence, format!("atrim=duration={length}"));
            width += width % 2;
            height += height % 2;
            (v, a)
        }
        InputType::Video => {
            let id = g.input(input);
            let v = g.video(id);
            let a = if info.has_audio {
                g.audio(id)
            } else {
                let silence = g.anullsrc();
                match video_duration(info) {
                    Some(d) => g.filter(silence, format!("atrim=duration={}", fmt_num(d))),
                    None => silence,
                }
            };
            (v, a)
        }
    };

    if args.mute {
        a = g.volume(a, 0.0);
    }

    let mut trim = Vec::new();
    if let Some(start) = args.start.filter(|s| *s > 0.0) {
        trim.push(format!("start={}", fmt_num(start)));
    }
    if let Some(end) = args.end.filter(|e| *e > 0.0) {
        trim.push(format!("end={}", fmt_num(end)));
    }
    if !trim.is_empty() {
        let trim = trim.join(":");
        v = g.filter(v, format!("trim={trim}"));
        v = g.filter(v, "setpts=PTS-STARTPTS");
        a = g.filter(a, format!("atrim={trim}"));
        a = g.filter(a, "asetpts=PTS-STARTPTS");
    }

    if args.reverse || args.areverse {
        a = g.filter(a, "areverse");
    }
    if args.reverse || args.vreverse {
        v = g.filter(v, "reverse");
    }
    if args.vibrato {
        a = g.filter(a, "vibrato");
    }

    if let Some(music) = &args.music {
        let url = ctx.music.resolve(music)?;
        let id = g.input(
            Input::path(url)
                .option("-ss", fmt_num(args.music_skip()))
                .option("-t", MUSIC_MAX_SECS),
        );
        let track = g.audio(id);
        a = match args.music_delay.filter(|d| *d > 0.0) {
            Some(delay) => {
                let (head, tail) = g.split(a);
                let head = g.filter(head, format!("atrim=end={}", fmt_num(delay)));
                let head = g.filter(head, "asetpts=PTS-STARTPTS");
                let tail = g.filter(tail, format!("atrim=start={}", fmt_num(delay)));
                let tail = g.filter(tail, "asetpts=PTS-STARTPTS");
                let tail = g.amix(tail, track);
                g.concat(0, 1, vec![head, tail])
                    .into_iter()
                    .next()
                    .ok_or_else(|| MediaError::graph("concat produced no audio stream"))?
            }
            None => g.amix(a, track),
        };
    }

    if args.muffle {
        a = g.filter(a, "lowpass=300");
    }
    if args.reverb {
        a = g.filter(a, "aecho=0.8:0.9:1000:0.1");
    }

    if let Some(speed) = args.speed {
        v = g.multiply_pts(v, 1.0 / speed);
        a = g.atempo(a, speed);
    }

    if args.has_meme_text() {
        let top = args.top_text.as_deref().unwrap_or("");
        let bottom = args.bottom_text.as_deref().unwrap_or("");
        let overlay = ctx.renderer.meme(width, height, top, bottom)?;
        v = overlay_stream(&mut g, v, &overlay);
    }
    if let Some(caption) = &args.caption {
        let overlay = ctx.renderer.caption(width, height, caption)?;
        v = overlay_stream(&mut g, v, &overlay);
    }

    if let Some(volume) = args.volume {
        a = g.volume(a, volume);
    }
    if let Some(spin) = args.spin.filter(|s| *s != 0.0) {
        v = g.filter(v, format!("rotate=t*{}*PI/180", fmt_num(spin)));
    }
    if args.fade_in.is_some() || args.fade_in_start.is_some() {
        v = fade(&mut g, v, "in", args.fade_in, args.fade_in_start);
    }
    if args.fade_out.is_some() || args.fade_out_start.is_some() {
        v = fade(&mut g, v, "out", args.fade_out, args.fade_out_start);
    }

    let mut opts = Vec::from(["-f", "mp4", "-shortest"].map(OsString::from));
    if input_type == InputType::Video && g.is_input_stream(v) {
        opts.extend(["-c:v", "copy"].map(OsString::from));
    } else {
        opts.extend(["-pix_fmt", "yuv420p"].map(OsString::from));
    }
    if matches!(output, Target::Handle(_) | Target::Stdout) {
        opts.extend(["-movflags", "frag_keyframe+empty_moov"].map(OsString::from));
    }
    g.add_output(output, opts, &[v, a]);
    g.cmd()
}

/// Feed `overlay` into the graph as an in-memory image and composite it with `media`.
pub(crate) fn overlay_stream(g: &mut Graph, media: StreamId, overlay: &Overlay) -> StreamId {
    let id = g.input(Input::image(overlay.image.clone()));
    let layer = g.video(id);
    let off = overlay.offset();
    if overlay.under {
        g.overlay(layer, media, off.x, off.y)
    } else {
        g.overlay(media, layer, off.x, off.y)
    }
}

fn fade(
    g: &mut Graph,
    v: StreamId,
    direction: &str,
    duration: Option<f64>,
    start: Option<f64>,
) -> StreamId {
    let duration = duration.filter(|d| *d > 0.0).unwrap_or(DEFAULT_FADE_SECS);
    let start = start.unwrap_or(0.0);
    g.filter(
        v,
        format!(
            "fade={direction}:duration={}:start_time={}",
            fmt_num(duration),
            fmt_num(start)
        ),
    )
}

fn video_duration(info: &ProbeInfo) -> Option<f64> {
    info.streams
        .iter()
        .find(|s| s.codec_type == "video")
        .and_then(|s| s.duration)
        .or(info.duration)
}

#[cfg(test)]
#[path = "../../tests/unit/edit/apply.rs"]
mod tests;
