use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context as _;

use crate::edit::apply::overlay_stream;
use crate::foundation::error::MediaResult;
use crate::gif_pipeline::composite_gif;
use crate::graph::{Cmd, Graph, Input};
use crate::media::context::{
    MediaContext, Rendered, collect_gif, decode_image, encode_png, gif_output_args, gif_palette,
    mp4_output_args, run_to_stdout, stdout_cmd,
};
use crate::media::kind::MediaKind;
use crate::process::{ProbeInfo, ProbeInput};
use crate::render::composite::{Drawable, composite};
use crate::render::overlay::{Overlay, OverlayRenderer};

/// Text laid over (meme) or above (caption) a piece of media.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextLayer {
    /// Top and bottom text drawn over the frame.
    Meme { top: String, bottom: String },
    /// Text in a white bar added above the frame.
    Caption(String),
}

impl TextLayer {
    /// Render the layer for a `width`x`height` frame.
    pub fn render(
        &self,
        renderer: &dyn OverlayRenderer,
        width: u32,
        height: u32,
    ) -> MediaResult<Overlay> {
        match self {
            Self::Meme { top, bottom } => renderer.meme(width, height, top, bottom),
            Self::Caption(text) => renderer.caption(width, height, text),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Meme { .. } => "meme",
            Self::Caption(_) => "caption",
        }
    }
}

/// Composite `layer` onto the media at `input`.
///
/// Still images are drawn in-process and come back as PNG. GIFs go through the frame
/// pipeline unless the context asks for ffmpeg. Everything else is an ffmpeg overlay job.
#[tracing::instrument(skip_all, fields(kind = ?kind, layer = layer.name()))]
pub fn composite_media(
    ctx: &MediaContext<'_>,
    kind: MediaKind,
    input: &Path,
    layer: &TextLayer,
) -> MediaResult<Rendered> {
    match kind {
        MediaKind::Image => {
            let img = decode_image(input)?;
            let overlay = layer.render(ctx.renderer, img.width(), img.height())?;
            let out = composite(Drawable::from_dynamic(img), &overlay);
            encode_png(ctx, &out)
        }
        MediaKind::Gif if ctx.gif_in_process => {
            let file = File::open(input)
                .with_context(|| format!("open gif '{}'", input.display()))?;
            let source = BufReader::new(file);
            let renderer = ctx.renderer;
            let workers = ctx.gif_workers;
            collect_gif(ctx, move |dest| {
                composite_gif(source, dest, |w, h| layer.render(renderer, w, h), workers)
            })
        }
        _ => {
            let info = ctx.runner.probe(ProbeInput::Path(input))?;
            let overlay = layer.render(ctx.renderer, info.width, info.height)?;
            let cmd = plan_overlay(kind, Input::path(input), &info, &overlay, ctx.gif_fps)?;
            run_to_stdout(ctx, cmd, kind.output_format())
        }
    }
}

/// Build the ffmpeg job that composites `overlay` onto `input` and writes to stdout.
///
/// GIF and GIFV inputs come out as palette-mapped GIF at `gif_fps`. Video keeps its audio
/// track when it has one and comes out as fragmented mp4.
pub fn plan_overlay(
    kind: MediaKind,
    input: Input,
    info: &ProbeInfo,
    overlay: &Overlay,
    gif_fps: u32,
) -> MediaResult<Cmd> {
    let mut g = Graph::new();
    let id = g.input(input);
    let v = g.video(id);
    let v = overlay_stream(&mut g, v, overlay);
    match kind {
        MediaKind::Video => {
            let mut streams = vec![v];
            if info.has_audio {
                streams.push(g.audio(id));
            }
            stdout_cmd(g, &mp4_output_args(), &streams)
        }
        _ => {
            let v = gif_palette(&mut g, v, gif_fps);
            stdout_cmd(g, &gif_output_args(), &[v])
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/composite.rs"]
mod tests;
