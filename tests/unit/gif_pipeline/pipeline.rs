use super::*;
use crate::foundation::core::Point;
use crate::render::composite::{Drawable, composite};

const WHITE: [u8; 4] = [255, 255, 255, 255];
const CLEAR: [u8; 4] = [0, 0, 0, 0];

/// Encode solid or patterned frames losslessly (each frame has its own exact palette).
fn encode(frames: &[RgbaImage]) -> Vec<u8> {
    encode_with(frames, gif::DisposalMethod::Keep, None)
}

fn encode_with(
    frames: &[RgbaImage],
    dispose: gif::DisposalMethod,
    sub: Option<(u16, u16)>,
) -> Vec<u8> {
    let (w, h) = frames[0].dimensions();
    let mut out = Vec::new();
    {
        let mut enc = gif::Encoder::new(&mut out, w as u16, h as u16, &[]).unwrap();
        for (i, img) in frames.iter().enumerate() {
            let mut q = Quantizer::new();
            let mut idx = IndexedFrame::default();
            q.quantize(img.as_raw(), &mut idx);
            let (left, top) = if i > 0 { sub.unwrap_or((0, 0)) } else { (0, 0) };
            enc.write_frame(&gif::Frame {
                left,
                top,
                width: img.width() as u16,
                height: img.height() as u16,
                delay: 5 + i as u16,
                dispose,
                transparent: idx.transparent,
                palette: Some(idx.palette.clone()),
                buffer: Cow::Owned(idx.indices.clone()),
                ..gif::Frame::default()
            })
            .unwrap();
        }
    }
    out
}

struct Decoded {
    width: u32,
    height: u32,
    frames: Vec<(RgbaImage, u16)>,
}

fn decode(bytes: &[u8]) -> Decoded {
    let mut opts = gif::DecodeOptions::new();
    opts.set_color_output(gif::ColorOutput::RGBA);
    let mut dec = opts.read_info(bytes).unwrap();
    let (width, height) = (u32::from(dec.width()), u32::from(dec.height()));
    let mut frames = Vec::new();
    while let Some(f) = dec.read_next_frame().unwrap() {
        assert_eq!((u32::from(f.width), u32::from(f.height)), (width, height));
        let img = RgbaImage::from_raw(width, height, f.buffer.to_vec()).unwrap();
        frames.push((img, f.delay));
    }
    Decoded {
        width,
        height,
        frames,
    }
}

fn tagged(i: usize) -> [u8; 4] {
    [(i * 30) as u8, 255 - (i * 30) as u8, 7, 255]
}

fn identity(w: u32, h: u32) -> MediaResult<Overlay> {
    Ok(Overlay::over(RgbaImage::from_pixel(w, h, image::Rgba(CLEAR))))
}

#[test]
fn frames_come_out_in_source_order() {
    let frames: Vec<RgbaImage> = (0..7)
        .map(|i| RgbaImage::from_pixel(4, 4, image::Rgba(tagged(i))))
        .collect();
    let mut out = Vec::new();
    let stats = composite_gif(encode(&frames).as_slice(), &mut out, identity, 3).unwrap();
    assert_eq!(stats.frames, 7);

    let got = decode(&out);
    assert_eq!(got.frames.len(), 7);
    for (i, (img, delay)) in got.frames.iter().enumerate() {
        assert_eq!(img.get_pixel(2, 2).0, tagged(i), "frame {i}");
        assert_eq!(*delay, 5 + i as u16);
    }
}

#[test]
fn frame_count_multiple_of_workers_is_handled() {
    let frames: Vec<RgbaImage> = (0..4)
        .map(|i| RgbaImage::from_pixel(2, 2, image::Rgba(tagged(i))))
        .collect();
    let mut out = Vec::new();
    let stats = composite_gif(encode(&frames).as_slice(), &mut out, identity, 2).unwrap();
    assert_eq!(stats.frames, 4);
    assert_eq!(decode(&out).frames.len(), 4);
}

fn caption_bar(w: u32, h: u32, bar: u32) -> Overlay {
    let mut img = RgbaImage::from_pixel(w, h + bar, image::Rgba(CLEAR));
    for y in 0..bar {
        for x in 0..w {
            img.put_pixel(x, y, image::Rgba(WHITE));
        }
    }
    Overlay::under(img, Point::new(0, -(bar as i32)))
}

#[test]
fn caption_grows_the_canvas_and_shifts_content() {
    let frames: Vec<RgbaImage> = (0..3)
        .map(|i| {
            let mut img = RgbaImage::from_pixel(10, 10, image::Rgba(tagged(i)));
            img.put_pixel(9, 9, image::Rgba([1, 2, 3, 255]));
            img
        })
        .collect();
    let mut out = Vec::new();
    let stats = composite_gif(
        encode(&frames).as_slice(),
        &mut out,
        |w, h| Ok(caption_bar(w, h, 4)),
        2,
    )
    .unwrap();
    assert_eq!((stats.width, stats.height), (10, 14));

    let got = decode(&out);
    assert_eq!((got.width, got.height), (10, 14));
    assert_eq!(got.frames.len(), 3);
    let first = &got.frames[0].0;
    assert_eq!(first.get_pixel(0, 4), frames[0].get_pixel(0, 0));
    assert_eq!(first.get_pixel(0, 0).0, WHITE);
    assert_eq!(first.get_pixel(9, 13).0, [1, 2, 3, 255]);

    let reference = composite(Drawable::Mutable(frames[0].clone()), &caption_bar(10, 10, 4));
    assert_eq!(first.as_raw(), reference.as_raw());
}

#[test]
fn keep_disposal_accumulates_partial_frames() {
    let base = RgbaImage::from_pixel(4, 4, image::Rgba(tagged(1)));
    let patch = RgbaImage::from_pixel(2, 2, image::Rgba(tagged(2)));
    let src = encode_with(&[base, patch], gif::DisposalMethod::Keep, Some((1, 1)));
    let mut out = Vec::new();
    composite_gif(src.as_slice(), &mut out, identity, 2).unwrap();

    let got = decode(&out);
    let second = &got.frames[1].0;
    assert_eq!(second.get_pixel(0, 0).0, tagged(1));
    assert_eq!(second.get_pixel(1, 1).0, tagged(2));
    assert_eq!(second.get_pixel(3, 3).0, tagged(1));
}

#[test]
fn background_disposal_clears_the_previous_frame() {
    let base = RgbaImage::from_pixel(4, 4, image::Rgba(tagged(1)));
    let patch = RgbaImage::from_pixel(2, 2, image::Rgba(tagged(2)));
    let src = encode_with(&[base, patch], gif::DisposalMethod::Background, Some((1, 1)));
    let mut out = Vec::new();
    composite_gif(src.as_slice(), &mut out, identity, 1).unwrap();

    let second = &decode(&out).frames[1].0;
    assert_eq!(second.get_pixel(0, 0).0[3], 0);
    assert_eq!(second.get_pixel(2, 2).0, tagged(2));
}

#[test]
fn crop_removes_a_detected_caption() {
    let frames: Vec<RgbaImage> = (0..2)
        .map(|i| {
            let mut img = RgbaImage::from_pixel(6, 9, image::Rgba(tagged(i + 1)));
            for y in 0..3 {
                for x in 0..6 {
                    img.put_pixel(x, y, image::Rgba(WHITE));
                }
            }
            img
        })
        .collect();
    let mut out = Vec::new();
    let stats = process_gif(encode(&frames).as_slice(), &mut out, &mut CropOp::caption(), 2)
        .unwrap();
    assert_eq!((stats.width, stats.height), (6, 6));

    let got = decode(&out);
    assert_eq!(got.frames[0].0.get_pixel(0, 0).0, tagged(1));
    assert_eq!(got.frames[1].0.get_pixel(5, 5).0, tagged(2));
}

#[test]
fn crop_without_a_caption_fails() {
    let frames = vec![RgbaImage::from_pixel(4, 4, image::Rgba(tagged(3)))];
    let err = process_gif(
        encode(&frames).as_slice(),
        Vec::new(),
        &mut CropOp::caption(),
        2,
    )
    .unwrap_err();
    assert!(err.to_string().contains("couldn't find the caption"), "{err}");
}

#[test]
fn zero_workers_are_rejected() {
    let frames = vec![RgbaImage::from_pixel(2, 2, image::Rgba(tagged(0)))];
    let err = composite_gif(encode(&frames).as_slice(), Vec::new(), identity, 0).unwrap_err();
    assert!(matches!(err, MediaError::Validation(_)));
}

#[test]
fn overlay_errors_abort_before_decoding() {
    let frames = vec![RgbaImage::from_pixel(2, 2, image::Rgba(tagged(0)))];
    let err = composite_gif(
        encode(&frames).as_slice(),
        Vec::new(),
        |_, _| Err(MediaError::validation("no fonts")),
        2,
    )
    .unwrap_err();
    assert!(err.to_string().contains("no fonts"));
}

#[test]
fn piped_failures_reach_the_reader() {
    let garbage = b"definitely not a gif".to_vec();
    let (read, joined) = thread::scope(|s| {
        let (mut reader, handle) =
            spawn_piped(s, |w| composite_gif(garbage.as_slice(), w, identity, 2));
        let mut buf = Vec::new();
        let read = reader.read_to_end(&mut buf);
        (read, handle.join().unwrap())
    });
    assert!(read.is_err());
    assert!(matches!(joined, Err(MediaError::Gif(_))));
}

#[test]
fn piped_success_yields_a_complete_gif() {
    let frames: Vec<RgbaImage> = (0..3)
        .map(|i| RgbaImage::from_pixel(3, 3, image::Rgba(tagged(i))))
        .collect();
    let src = encode(&frames);
    let bytes = thread::scope(|s| {
        let (mut reader, handle) = spawn_piped(s, |w| composite_gif(src.as_slice(), w, identity, 2));
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        handle.join().unwrap().unwrap();
        buf
    });
    assert_eq!(decode(&bytes).frames.len(), 3);
}

/// Fails on the frame tagged `fail_at` and records every frame it was handed.
struct FailAt {
    fail_at: usize,
    seen: std::sync::Mutex<Vec<usize>>,
}

impl FailAt {
    fn new(fail_at: usize) -> Self {
        Self {
            fail_at,
            seen: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl FrameOp for FailAt {
    fn prepare(&mut self, canvas: (u32, u32), _first: &RgbaImage) -> MediaResult<(u32, u32)> {
        Ok(canvas)
    }

    fn apply(&self, src: &RgbaImage, dst: &mut RgbaImage) -> MediaResult<()> {
        let frame = usize::from(src.get_pixel(0, 0).0[0]) / 30;
        self.seen.lock().unwrap().push(frame);
        if frame == self.fail_at {
            return Err(MediaError::gif("boom"));
        }
        dst.copy_from_slice(src.as_raw());
        Ok(())
    }
}

fn seven_frames() -> Vec<u8> {
    let frames: Vec<RgbaImage> = (0..7)
        .map(|i| RgbaImage::from_pixel(3, 3, image::Rgba(tagged(i))))
        .collect();
    encode(&frames)
}

#[test]
fn late_failures_leave_the_output_unterminated() {
    let src = seven_frames();
    let mut out = Vec::new();
    let err = process_gif(src.as_slice(), &mut out, &mut FailAt::new(4), 2).unwrap_err();
    assert!(err.to_string().contains("boom"), "{err}");
    assert!(out.starts_with(b"GIF89a"));
    assert_ne!(out.last(), Some(&0x3B), "failed output must not end with a trailer");
}

#[test]
fn piped_failure_after_written_batches_stops_the_run() {
    let src = seven_frames();
    let mut op = FailAt::new(4);
    let (read, joined) = thread::scope(|s| {
        let (mut reader, handle) =
            spawn_piped(s, |w| process_gif(src.as_slice(), w, &mut op, 2));
        let mut buf = Vec::new();
        let read = reader.read_to_end(&mut buf);
        (read, handle.join().unwrap())
    });
    let err = read.unwrap_err();
    assert!(err.to_string().contains("boom"), "{err}");
    assert!(matches!(joined, Err(MediaError::Gif(_))));

    let seen = op.seen.into_inner().unwrap();
    assert!(seen.contains(&3), "earlier batches ran: {seen:?}");
    assert!(!seen.contains(&6), "no batch after the failing one: {seen:?}");
}
