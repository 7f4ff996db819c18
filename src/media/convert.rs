use std::path::Path;

use crate::foundation::error::MediaResult;
use crate::graph::{Cmd, Graph, Input};
use crate::media::context::{
    MediaContext, Rendered, gif_output_args, gif_palette, run_to_stdout, stdout_cmd,
};

/// Re-encode a video as an animated GIF at the context's frame rate.
#[tracing::instrument(skip_all, fields(input = %input.display(), fps = ctx.gif_fps))]
pub fn video_to_gif(ctx: &MediaContext<'_>, input: &Path) -> MediaResult<Rendered> {
    let cmd = plan_video_to_gif(Input::path(input), ctx.gif_fps)?;
    run_to_stdout(ctx, cmd, "gif")
}

/// The conversion job: `fps`, then a generated palette, written to stdout.
pub fn plan_video_to_gif(input: Input, fps: u32) -> MediaResult<Cmd> {
    let mut g = Graph::new();
    let id = g.input(input);
    let v = g.video(id);
    let v = gif_palette(&mut g, v, fps);
    stdout_cmd(g, &gif_output_args(), &[v])
}

#[cfg(test)]
#[path = "../../tests/unit/media/convert.rs"]
mod tests;
