use std::borrow::Cow;

use image::Rgba;

use super::*;
use crate::foundation::error::MediaResult;
use crate::gif_pipeline::{IndexedFrame, Quantizer};
use crate::process::{Runner, StreamInfo, Throttle};
use crate::render::overlay::{Overlay, OverlayRenderer};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

struct NoText;

impl OverlayRenderer for NoText {
    fn meme(&self, w: u32, h: u32, _: &str, _: &str) -> MediaResult<Overlay> {
        Ok(Overlay::over(RgbaImage::new(w, h)))
    }

    fn caption(&self, w: u32, h: u32, _: &str) -> MediaResult<Overlay> {
        Ok(Overlay::over(RgbaImage::new(w, h)))
    }
}

fn runner() -> Runner {
    Runner::new("ffmpeg", "ffprobe", Throttle::new(1).unwrap())
}

fn scratch(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("mediaforge-uncaption-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

/// `bar` white rows above a blue picture.
fn captioned(w: u32, h: u32, bar: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |_, y| if y < bar { WHITE } else { BLUE })
}

fn write_gif(path: &Path, frames: &[RgbaImage]) {
    let (w, h) = frames[0].dimensions();
    let mut out = Vec::new();
    {
        let mut enc = gif::Encoder::new(&mut out, w as u16, h as u16, &[]).unwrap();
        for img in frames {
            let mut q = Quantizer::new();
            let mut idx = IndexedFrame::default();
            q.quantize(img.as_raw(), &mut idx);
            enc.write_frame(&gif::Frame {
                width: w as u16,
                height: h as u16,
                delay: 3,
                transparent: idx.transparent,
                palette: Some(idx.palette.clone()),
                buffer: Cow::Owned(idx.indices.clone()),
                ..gif::Frame::default()
            })
            .unwrap();
        }
    }
    std::fs::write(path, out).unwrap();
}

fn info(has_audio: bool) -> ProbeInfo {
    ProbeInfo {
        width: 10,
        height: 20,
        has_audio,
        duration: Some(2.0),
        streams: vec![StreamInfo {
            codec_type: "video".into(),
            duration: Some(2.0),
        }],
    }
}

#[test]
fn image_caption_is_cropped_in_process() {
    let path = scratch("captioned.png");
    captioned(6, 9, 3).save(&path).unwrap();
    let r = runner();
    let ctx = MediaContext::new(&r, &NoText);

    let out = uncaption(&ctx, MediaKind::Image, &path).unwrap();
    assert_eq!(out.format, "png");
    let img = image::load_from_memory(&out.data.into_bytes().unwrap())
        .unwrap()
        .to_rgba8();
    assert_eq!(img, RgbaImage::from_pixel(6, 6, BLUE));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn image_without_a_bar_is_rejected() {
    let path = scratch("plain.png");
    RgbaImage::from_pixel(4, 4, BLUE).save(&path).unwrap();
    let r = runner();
    let ctx = MediaContext::new(&r, &NoText);

    let err = uncaption(&ctx, MediaKind::Image, &path).unwrap_err();
    assert!(err.to_string().contains("couldn't find the caption"), "{err}");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn gif_caption_is_cropped_on_every_frame() {
    let path = scratch("captioned.gif");
    write_gif(&path, &[captioned(5, 8, 2), captioned(5, 8, 2), captioned(5, 8, 2)]);
    let r = runner();
    let mut ctx = MediaContext::new(&r, &NoText);
    ctx.gif_in_process = true;
    ctx.gif_workers = 2;

    let out = uncaption(&ctx, MediaKind::Gif, &path).unwrap();
    let bytes = out.data.into_bytes().unwrap();
    let mut opts = gif::DecodeOptions::new();
    opts.set_color_output(gif::ColorOutput::RGBA);
    let mut dec = opts.read_info(bytes.as_slice()).unwrap();
    assert_eq!((dec.width(), dec.height()), (5, 6));
    let mut frames = 0;
    while let Some(f) = dec.read_next_frame().unwrap() {
        assert!(f.buffer.chunks(4).all(|px| px == BLUE.0));
        frames += 1;
    }
    assert_eq!(frames, 3);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn first_frame_is_selected_and_piped_as_png() {
    let cmd = plan_first_frame(Input::path("in.mp4")).unwrap();
    assert_eq!(cmd.filter_complex().unwrap(), r"[0:v]select=eq(n\,0)[s0]");
    assert_eq!(cmd.arg_after("-frames:v").unwrap(), "1");
    assert_eq!(cmd.arg_after("-f").unwrap(), "image2pipe");
    assert_eq!(cmd.arg_after("-vcodec").unwrap(), "png");
    assert!(cmd.captures_stdout());
}

#[test]
fn video_crop_keeps_audio() {
    let cmd = plan_crop(MediaKind::Video, Input::path("in.mp4"), &info(true), 7, 20).unwrap();
    let fc = cmd.filter_complex().unwrap();
    assert_eq!(fc, "[0:v]crop=iw:trunc((ih-7)/2)*2:0:7[s0]");
    let args: Vec<String> = cmd
        .args()
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    assert!(args.iter().any(|a| a == "0:a"), "{args:?}");
    assert_eq!(cmd.arg_after("-f").unwrap(), "mp4");
}

#[test]
fn gifv_crop_is_palette_mapped() {
    let cmd = plan_crop(MediaKind::Gifv, Input::path("in.mp4"), &info(false), 4, 20).unwrap();
    assert_eq!(
        cmd.filter_complex().unwrap(),
        "[0:v]crop=iw:ih-4:0:4,fps=20,split[s0][s1];[s1]palettegen[s2];[s0][s2]paletteuse[s3]"
    );
    assert_eq!(cmd.arg_after("-f").unwrap(), "gif");
}

#[test]
fn crop_taller_than_the_frame_is_rejected() {
    let err = plan_crop(MediaKind::Video, Input::path("in.mp4"), &info(false), 20, 20).unwrap_err();
    assert!(matches!(err, MediaError::Validation(_)), "{err}");
}
