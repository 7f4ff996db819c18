use image::{DynamicImage, RgbaImage};

use crate::render::overlay::Overlay;

/// A decoded image tagged with whether it can be drawn into directly.
#[derive(Debug)]
pub enum Drawable {
    /// RGBA8 buffer that can be mutated in place.
    Mutable(RgbaImage),
    /// Any other pixel layout; copied before composition.
    ReadOnly(DynamicImage),
}

impl Drawable {
    /// Tag a decoded image.
    pub fn from_dynamic(img: DynamicImage) -> Self {
        match img {
            DynamicImage::ImageRgba8(buf) => Self::Mutable(buf),
            other => Self::ReadOnly(other),
        }
    }

    /// RGBA8 buffer, copying read-only images.
    pub fn into_mutable(self) -> RgbaImage {
        match self {
            Self::Mutable(buf) => buf,
            Self::ReadOnly(img) => img.to_rgba8(),
        }
    }
}

/// Composite `media` with `overlay` into a new buffer.
pub fn composite(media: Drawable, overlay: &Overlay) -> RgbaImage {
    let media = media.into_mutable();
    if overlay.under {
        let mut out = RgbaImage::new(overlay.image.width(), overlay.image.height());
        composite_into(&mut out, &media, overlay);
        out
    } else {
        let mut out = media;
        let off = overlay.offset();
        image::imageops::overlay(&mut out, overlay.image.as_ref(), off.x.into(), off.y.into());
        out
    }
}

/// Composite `media` with `overlay` into `dst`, which must already have the output size.
///
/// Every pixel of `dst` is overwritten, so the buffer can be reused across frames.
pub fn composite_into(dst: &mut RgbaImage, media: &RgbaImage, overlay: &Overlay) {
    let off = overlay.offset();
    if overlay.under {
        copy_or_clear(dst, overlay.image.as_ref());
        image::imageops::overlay(dst, media, off.x.into(), off.y.into());
    } else {
        copy_or_clear(dst, media);
        image::imageops::overlay(dst, overlay.image.as_ref(), off.x.into(), off.y.into());
    }
}

fn copy_or_clear(dst: &mut RgbaImage, src: &RgbaImage) {
    if dst.dimensions() == src.dimensions() {
        dst.copy_from_slice(src.as_raw());
    } else {
        dst.fill(0);
        image::imageops::replace(dst, src, 0, 0);
    }
}

/// Copy the `width`x`height` region of `src` starting at row `top` into `dst`.
pub fn crop_into(dst: &mut RgbaImage, src: &RgbaImage, top: u32) {
    let (w, h) = dst.dimensions();
    let view = image::imageops::crop_imm(src, 0, top, w, h);
    let sub = view.to_image();
    if sub.dimensions() == dst.dimensions() {
        dst.copy_from_slice(sub.as_raw());
    } else {
        dst.fill(0);
        image::imageops::replace(dst, &sub, 0, 0);
    }
}

/// Left-edge luma at or above this counts as caption background.
const CAPTION_LUMA: f32 = 248.0;

/// Height of a white caption bar at the top of `img`, if there is one.
///
/// The bar ends at the first row whose left-edge pixel is darker than near-white. An image
/// that is already dark at row 0, or never gets dark, has no detectable caption.
pub fn caption_height(img: &RgbaImage) -> Option<u32> {
    let row = (0..img.height()).find(|&y| luma(img.get_pixel(0, y)) < CAPTION_LUMA)?;
    (row > 0).then_some(row)
}

fn luma(px: &image::Rgba<u8>) -> f32 {
    let [r, g, b, _] = px.0;
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
