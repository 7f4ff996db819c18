use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context as _;
use image::RgbaImage;

use crate::foundation::error::{MediaError, MediaResult};
use crate::gif_pipeline::{CropOp, process_gif};
use crate::graph::{Cmd, Graph, Input};
use crate::media::context::{
    MediaContext, Rendered, collect_gif, decode_image, encode_png, gif_output_args, gif_palette,
    mp4_output_args, run_to_stdout, stdout_cmd,
};
use crate::media::kind::MediaKind;
use crate::process::{ProbeInfo, ProbeInput};
use crate::render::composite::caption_height;

const NO_CAPTION: &str = "couldn't find the caption";

/// Remove the white caption bar from the top of the media at `input`.
#[tracing::instrument(skip_all, fields(kind = ?kind, bar = tracing::field::Empty))]
pub fn uncaption(ctx: &MediaContext<'_>, kind: MediaKind, input: &Path) -> MediaResult<Rendered> {
    match kind {
        MediaKind::Image => {
            let img = decode_image(input)?.to_rgba8();
            let top = detect(&img)?;
            tracing::Span::current().record("bar", top);
            let (w, h) = img.dimensions();
            let cropped = image::imageops::crop_imm(&img, 0, top, w, h - top).to_image();
            encode_png(ctx, &cropped)
        }
        MediaKind::Gif if ctx.gif_in_process => {
            let file = File::open(input)
                .with_context(|| format!("open gif '{}'", input.display()))?;
            let source = BufReader::new(file);
            let workers = ctx.gif_workers;
            collect_gif(ctx, move |dest| {
                process_gif(source, dest, &mut CropOp::caption(), workers)
            })
        }
        _ => {
            let info = ctx.runner.probe(ProbeInput::Path(input))?;
            let frame = first_frame(ctx, input)?;
            let top = detect(&frame)?;
            tracing::Span::current().record("bar", top);
            let cmd = plan_crop(kind, Input::path(input), &info, top, ctx.gif_fps)?;
            run_to_stdout(ctx, cmd, kind.output_format())
        }
    }
}

fn detect(img: &RgbaImage) -> MediaResult<u32> {
    caption_height(img).ok_or_else(|| MediaError::validation(NO_CAPTION))
}

fn first_frame(ctx: &MediaContext<'_>, input: &Path) -> MediaResult<RgbaImage> {
    let out = run_to_stdout(ctx, plan_first_frame(Input::path(input))?, "png")?;
    let bytes = out.data.into_bytes()?;
    let img = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)
        .context("decode first frame")?;
    Ok(img.to_rgba8())
}

/// Job that writes the first video frame to stdout as PNG.
pub fn plan_first_frame(input: Input) -> MediaResult<Cmd> {
    let mut g = Graph::new();
    let id = g.input(input);
    let v = g.video(id);
    let v = g.filter(v, r"select=eq(n\,0)");
    stdout_cmd(
        g,
        &["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png"],
        &[v],
    )
}

/// Job that drops the top `top` rows of every frame.
///
/// Video keeps its audio and comes out as mp4, rounded down to an even height for yuv420p.
/// GIF and GIFV come out as GIF.
pub fn plan_crop(
    kind: MediaKind,
    input: Input,
    info: &ProbeInfo,
    top: u32,
    gif_fps: u32,
) -> MediaResult<Cmd> {
    if top >= info.height {
        return Err(MediaError::validation(format!(
            "caption of {top} rows covers the whole {}-row frame",
            info.height
        )));
    }
    let mut g = Graph::new();
    let id = g.input(input);
    let v = g.video(id);
    match kind {
        MediaKind::Video => {
            let v = g.filter(v, format!("crop=iw:trunc((ih-{top})/2)*2:0:{top}"));
            let mut streams = vec![v];
            if info.has_audio {
                streams.push(g.audio(id));
            }
            stdout_cmd(g, &mp4_output_args(), &streams)
        }
        _ => {
            let v = g.filter(v, format!("crop=iw:ih-{top}:0:{top}"));
            let v = gif_palette(&mut g, v, gif_fps);
            stdout_cmd(g, &gif_output_args(), &[v])
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/uncaption.rs"]
mod tests;
