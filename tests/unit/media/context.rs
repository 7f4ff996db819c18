use super::*;
use crate::gif_pipeline::composite_gif;
use crate::graph::Input;
use crate::process::Throttle;
use crate::render::overlay::Overlay;

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

#[test]
fn png_encoding_goes_through_the_bounded_collector() {
    let r = runner();
    let ctx = MediaContext::new(&r, &NoText);
    let img = RgbaImage::from_pixel(7, 5, image::Rgba([9, 8, 7, 255]));
    let out = encode_png(&ctx, &img).unwrap();
    assert_eq!(out.format, "png");
    assert_eq!(out.file_name(), "out.png");
    assert!(!out.data.is_spilled());

    let back = image::load_from_memory(&out.data.into_bytes().unwrap()).unwrap();
    assert_eq!(back.to_rgba8(), img);
}

#[test]
fn gif_job_errors_win_over_collector_errors() {
    let r = runner();
    let ctx = MediaContext::new(&r, &NoText);
    let err = collect_gif(&ctx, |w| {
        composite_gif(&b"nope"[..], w, |w, h| Ok(Overlay::over(RgbaImage::new(w, h))), 2)
    })
    .unwrap_err();
    assert!(matches!(err, MediaError::Gif(_)), "{err}");
}

#[test]
fn gif_jobs_hold_a_throttle_slot() {
    let r = runner();
    let ctx = MediaContext::new(&r, &NoText);
    let mut src = Vec::new();
    {
        let mut enc = gif::Encoder::new(&mut src, 2, 2, &[]).unwrap();
        let mut pixels = [1u8, 2, 3, 255].repeat(4);
        enc.write_frame(&gif::Frame::from_rgba(2, 2, &mut pixels))
            .unwrap();
    }

    let mut held = None;
    let out = collect_gif(&ctx, |dest| {
        held = Some(r.throttle().in_use());
        composite_gif(src.as_slice(), dest, |w, h| Ok(Overlay::over(RgbaImage::new(w, h))), 2)
    })
    .unwrap();
    assert_eq!(out.format, "gif");
    assert_eq!(held, Some(1));
    assert_eq!(r.throttle().in_use(), 0);
}

#[test]
fn gif_palette_chain_shares_one_decode() {
    let mut g = Graph::new();
    let id = g.input(Input::path("in.mp4"));
    let v = g.video(id);
    let out = gif_palette(&mut g, v, 20);
    let cmd = stdout_cmd(g, &gif_output_args(), &[out]).unwrap();
    assert_eq!(
        cmd.filter_complex().unwrap(),
        "[0:v]fps=20,split[s0][s1];[s1]palettegen[s2];[s0][s2]paletteuse[s3]"
    );
    let args: Vec<String> = cmd
        .args()
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    assert!(args.ends_with(&[
        "-map".to_string(),
        "[s3]".to_string(),
        "-f".to_string(),
        "gif".to_string(),
        "-vsync".to_string(),
        "0".to_string(),
        "pipe:1".to_string(),
    ]));
}

#[test]
fn rendered_output_can_be_saved() {
    let dir = std::env::temp_dir().join(format!("mediaforge-save-{}", std::process::id()));
    let dest = dir.join("nested").join("out.gif");
    let rendered = Rendered {
        data: Collected::Memory(b"GIF89a".to_vec()),
        format: "gif",
    };
    assert_eq!(rendered.len(), 6);
    assert_eq!(rendered.save(&dest).unwrap(), 6);
    assert_eq!(std::fs::read(&dest).unwrap(), b"GIF89a");
    let _ = std::fs::remove_dir_all(&dir);
}
