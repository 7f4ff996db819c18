use std::borrow::Cow;
use std::io::{self, Read, Write};
use std::thread;

use anyhow::Context as _;
use image::RgbaImage;
use rayon::prelude::*;

use crate::bridge::pipe::{ChannelReader, ChannelWriter, channel_pipe};
use crate::foundation::error::{MediaError, MediaResult};
use crate::gif_pipeline::quantize::{IndexedFrame, Quantizer};
use crate::render::composite::{caption_height, composite_into, crop_into};
use crate::render::overlay::Overlay;

/// Chunks buffered between the pipeline thread and the consumer of its output.
const PIPE_CHUNKS: usize = 16;

/// Per-frame transformation applied by the pipeline workers.
pub trait FrameOp: Send + Sync {
    /// Output canvas size, given the source canvas and the first fully decoded frame.
    ///
    /// Called once, before any frame is dispatched.
    fn prepare(&mut self, canvas: (u32, u32), first: &RgbaImage) -> MediaResult<(u32, u32)>;

    /// Draw the output frame for `src` into `dst`, which already has the output size.
    fn apply(&self, src: &RgbaImage, dst: &mut RgbaImage) -> MediaResult<()>;
}

/// Composites one static overlay onto every frame.
#[derive(Clone, Debug)]
pub struct OverlayOp {
    overlay: Overlay,
}

impl OverlayOp {
    pub fn new(overlay: Overlay) -> Self {
        Self { overlay }
    }
}

impl FrameOp for OverlayOp {
    fn prepare(&mut self, canvas: (u32, u32), _first: &RgbaImage) -> MediaResult<(u32, u32)> {
        Ok(self.overlay.output_size(canvas))
    }

    fn apply(&self, src: &RgbaImage, dst: &mut RgbaImage) -> MediaResult<()> {
        composite_into(dst, src, &self.overlay);
        Ok(())
    }
}

/// Removes rows from the top of every frame.
#[derive(Clone, Debug, Default)]
pub struct CropOp {
    top: Option<u32>,
}

impl CropOp {
    /// Crop a fixed number of rows.
    pub fn rows(top: u32) -> Self {
        Self { top: Some(top) }
    }

    /// Crop the caption bar detected on the first frame.
    pub fn caption() -> Self {
        Self { top: None }
    }
}

impl FrameOp for CropOp {
    fn prepare(&mut self, canvas: (u32, u32), first: &RgbaImage) -> MediaResult<(u32, u32)> {
        let top = match self.top {
            Some(top) => top,
            None => caption_height(first)
                .ok_or_else(|| MediaError::gif("couldn't find the caption"))?,
        };
        if top >= canvas.1 {
            return Err(MediaError::gif(format!(
                "cannot crop {top} rows from a {}-row canvas",
                canvas.1
            )));
        }
        self.top = Some(top);
        Ok((canvas.0, canvas.1 - top))
    }

    fn apply(&self, src: &RgbaImage, dst: &mut RgbaImage) -> MediaResult<()> {
        crop_into(dst, src, self.top.unwrap_or(0));
        Ok(())
    }
}

/// Summary of a finished GIF pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GifStats {
    /// Frames written.
    pub frames: usize,
    /// Output canvas width.
    pub width: u32,
    /// Output canvas height.
    pub height: u32,
}

/// Composite a static overlay onto every frame of an animated GIF.
///
/// `overlay_fn` receives the source canvas size and is called once, before decoding frames.
pub fn composite_gif<R, W, F>(
    source: R,
    dest: W,
    overlay_fn: F,
    workers: usize,
) -> MediaResult<GifStats>
where
    R: Read,
    W: Write,
    F: FnOnce(u32, u32) -> MediaResult<Overlay>,
{
    let reader = FrameReader::open(source)?;
    let (w, h) = reader.size();
    let mut op = OverlayOp::new(overlay_fn(w, h)?);
    run(reader, dest, &mut op, workers)
}

/// Run `op` over every frame of an animated GIF.
///
/// On failure `dest` may hold a partial stream, never a terminated one.
pub fn process_gif<R: Read, W: Write>(
    source: R,
    dest: W,
    op: &mut dyn FrameOp,
    workers: usize,
) -> MediaResult<GifStats> {
    run(FrameReader::open(source)?, dest, op, workers)
}

/// Run a pipeline job on a scoped thread that writes into an in-process pipe.
///
/// The returned reader yields the encoded GIF. When the job fails the pipe is closed with the
/// error, so the reader fails instead of ending cleanly on a truncated file.
pub fn spawn_piped<'scope, 'env, J>(
    scope: &'scope thread::Scope<'scope, 'env>,
    job: J,
) -> (
    ChannelReader,
    thread::ScopedJoinHandle<'scope, MediaResult<GifStats>>,
)
where
    J: FnOnce(&mut ChannelWriter) -> MediaResult<GifStats> + Send + 'scope,
{
    let (mut writer, reader) = channel_pipe(PIPE_CHUNKS);
    let handle = scope.spawn(move || {
        let result = job(&mut writer);
        match &result {
            Ok(_) => writer
                .close()
                .map_err(|e| MediaError::bridge(format!("closing gif output: {e}")))?,
            Err(e) => writer.close_with_error(e.to_io()),
        }
        result
    });
    (reader, handle)
}

#[tracing::instrument(skip_all, fields(workers = workers, frames = tracing::field::Empty))]
fn run<R: Read, W: Write>(
    mut reader: FrameReader<R>,
    dest: W,
    op: &mut dyn FrameOp,
    workers: usize,
) -> MediaResult<GifStats> {
    let pool = build_thread_pool(workers)?;
    let canvas = reader.size();

    let mut first = RgbaImage::new(canvas.0, canvas.1);
    let Some(first_delay) = reader.next_into(&mut first)? else {
        return Err(MediaError::gif("source has no frames"));
    };
    let out = op.prepare(canvas, &first)?;
    let (out_w, out_h) = gif_dims(out)?;

    let mut encoder = gif::Encoder::new(Sealable::new(dest), out_w, out_h, &[])
        .map_err(|e| MediaError::gif(format!("writing gif header: {e}")))?;

    let mut slots: Vec<Slot> = (0..workers).map(|_| Slot::new(canvas, out)).collect();
    slots[0].source = first;
    slots[0].delay = first_delay;

    let frames = match write_frames(&mut encoder, &mut reader, &mut slots, &pool, op) {
        Ok(frames) => frames,
        Err(e) => {
            // Dropping the encoder would otherwise terminate the partial output.
            encoder.get_mut().seal();
            return Err(e);
        }
    };

    let mut dest = encoder
        .into_inner()
        .map_err(|e| MediaError::gif(format!("finishing gif: {e}")))?;
    dest.flush().context("flush gif output")?;

    tracing::Span::current().record("frames", frames);
    tracing::info!(frames, width = out.0, height = out.1, "gif pipeline finished");
    Ok(GifStats {
        frames,
        width: out.0,
        height: out.1,
    })
}

/// Decode, process and write batches until the source ends. `slots[0]` holds the first frame.
fn write_frames<R: Read, W: Write>(
    encoder: &mut gif::Encoder<W>,
    reader: &mut FrameReader<R>,
    slots: &mut [Slot],
    pool: &rayon::ThreadPool,
    op: &dyn FrameOp,
) -> MediaResult<usize> {
    encoder
        .set_repeat(gif::Repeat::Infinite)
        .map_err(|e| MediaError::gif(format!("writing gif header: {e}")))?;
    let workers = slots.len();
    let mut filled = 1;
    let mut frames = 0usize;
    loop {
        while filled < workers {
            match reader.next_into(&mut slots[filled].source)? {
                Some(delay) => {
                    slots[filled].delay = delay;
                    filled += 1;
                }
                None => break,
            }
        }
        let last_batch = filled < workers;

        let batch = &mut slots[..filled];
        pool.install(|| batch.par_iter_mut().try_for_each(|slot| slot.process(op)))?;

        for slot in &slots[..filled] {
            let (w, h) = slot.scratch.dimensions();
            encoder
                .write_frame(&slot.frame(w as u16, h as u16))
                .map_err(|e| MediaError::gif(format!("writing frame {frames}: {e}")))?;
            frames += 1;
        }

        if last_batch {
            return Ok(frames);
        }
        filled = 0;
    }
}

/// Output writer that refuses all writes once sealed.
///
/// A failed run seals it so nothing, the gif trailer included, follows the partial data.
struct Sealable<W> {
    inner: W,
    sealed: bool,
}

impl<W: Write> Sealable<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            sealed: false,
        }
    }

    fn seal(&mut self) {
        self.sealed = true;
    }

    fn check(&self) -> io::Result<()> {
        if self.sealed {
            return Err(io::Error::other("gif output abandoned after an error"));
        }
        Ok(())
    }
}

impl<W: Write> Write for Sealable<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        self.inner.flush()
    }
}

fn build_thread_pool(workers: usize) -> MediaResult<rayon::ThreadPool> {
    if workers == 0 {
        return Err(MediaError::validation("gif worker count must be >= 1"));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("gif-worker-{i}"))
        .build()
        .map_err(|e| MediaError::gif(format!("failed to build worker pool: {e}")))
}

fn gif_dims((w, h): (u32, u32)) -> MediaResult<(u16, u16)> {
    match (u16::try_from(w), u16::try_from(h)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(MediaError::gif(format!(
            "output canvas {w}x{h} does not fit a gif"
        ))),
    }
}

/// One in-flight frame: decoded source, composed scratch buffer, and indexed output.
struct Slot {
    source: RgbaImage,
    scratch: RgbaImage,
    quantizer: Quantizer,
    indexed: IndexedFrame,
    delay: u16,
}

impl Slot {
    fn new(canvas: (u32, u32), out: (u32, u32)) -> Self {
        Self {
            source: RgbaImage::new(canvas.0, canvas.1),
            scratch: RgbaImage::new(out.0, out.1),
            quantizer: Quantizer::new(),
            indexed: IndexedFrame::default(),
            delay: 0,
        }
    }

    fn process(&mut self, op: &dyn FrameOp) -> MediaResult<()> {
        op.apply(&self.source, &mut self.scratch)?;
        self.quantizer.quantize(self.scratch.as_raw(), &mut self.indexed);
        Ok(())
    }

    fn frame(&self, width: u16, height: u16) -> gif::Frame<'_> {
        gif::Frame {
            width,
            height,
            delay: self.delay,
            dispose: gif::DisposalMethod::Background,
            transparent: self.indexed.transparent,
            palette: Some(self.indexed.palette.clone()),
            buffer: Cow::Borrowed(&self.indexed.indices),
            ..gif::Frame::default()
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Rect {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

/// Decodes frames onto a persistent full-size canvas, applying disposal between frames.
struct FrameReader<R: Read> {
    decoder: gif::Decoder<R>,
    canvas: RgbaImage,
    restore: Option<RgbaImage>,
    pending: Option<(gif::DisposalMethod, Rect)>,
}

impl<R: Read> FrameReader<R> {
    fn open(source: R) -> MediaResult<Self> {
        let mut opts = gif::DecodeOptions::new();
        opts.set_color_output(gif::ColorOutput::RGBA);
        let decoder = opts
            .read_info(source)
            .map_err(|e| MediaError::gif(format!("reading gif header: {e}")))?;
        let (w, h) = (u32::from(decoder.width()), u32::from(decoder.height()));
        if w == 0 || h == 0 {
            return Err(MediaError::gif(format!("source canvas {w}x{h} is empty")));
        }
        Ok(Self {
            decoder,
            canvas: RgbaImage::new(w, h),
            restore: None,
            pending: None,
        })
    }

    fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    /// Decode the next frame and copy the composed canvas into `dst`; returns its delay.
    fn next_into(&mut self, dst: &mut RgbaImage) -> MediaResult<Option<u16>> {
        self.dispose_previous();
        let Some(frame) = self
            .decoder
            .read_next_frame()
            .map_err(|e| MediaError::gif(format!("decoding frame: {e}")))?
        else {
            return Ok(None);
        };

        let rect = Rect {
            left: u32::from(frame.left),
            top: u32::from(frame.top),
            width: u32::from(frame.width),
            height: u32::from(frame.height),
        };
        if frame.dispose == gif::DisposalMethod::Previous {
            self.restore = Some(self.canvas.clone());
        }
        blit(&mut self.canvas, &frame.buffer, rect);
        self.pending = Some((frame.dispose, rect));

        dst.copy_from_slice(self.canvas.as_raw());
        Ok(Some(frame.delay))
    }

    fn dispose_previous(&mut self) {
        match self.pending.take() {
            Some((gif::DisposalMethod::Background, rect)) => clear(&mut self.canvas, rect),
            Some((gif::DisposalMethod::Previous, _)) => {
                if let Some(prev) = self.restore.take() {
                    self.canvas = prev;
                }
            }
            _ => {}
        }
    }
}

/// Draw a frame's RGBA sub-rectangle onto the canvas; fully clear pixels leave it unchanged.
fn blit(canvas: &mut RgbaImage, rgba: &[u8], rect: Rect) {
    let (cw, ch) = canvas.dimensions();
    if rect.width == 0 {
        return;
    }
    for (i, px) in rgba.chunks_exact(4).enumerate() {
        let i = i as u32;
        let (x, y) = (rect.left + i % rect.width, rect.top + i / rect.width);
        if y >= rect.top + rect.height || x >= cw || y >= ch || px[3] == 0 {
            continue;
        }
        canvas.put_pixel(x, y, image::Rgba([px[0], px[1], px[2], px[3]]));
    }
}

fn clear(canvas: &mut RgbaImage, rect: Rect) {
    let (cw, ch) = canvas.dimensions();
    for y in rect.top..(rect.top + rect.height).min(ch) {
        for x in rect.left..(rect.left + rect.width).min(cw) {
            canvas.put_pixel(x, y, image::Rgba([0, 0, 0, 0]));
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/gif_pipeline/pipeline.rs"]
mod tests;
