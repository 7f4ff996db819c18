use std::sync::Arc;

use image::RgbaImage;

use crate::foundation::core::Point;
use crate::foundation::error::MediaResult;

/// A rendered text layer and where it goes relative to the media.
///
/// Placement: the secondary image is drawn at `-anchor`. When `under` is false the media is
/// the canvas and `image` is drawn on top of it. When `under` is true `image` is the canvas
/// (e.g. a caption bar with room for the media) and the media is drawn onto it.
#[derive(Clone, Debug)]
pub struct Overlay {
    /// Straight-alpha RGBA layer, shared read-only between workers.
    pub image: Arc<RgbaImage>,
    /// Anchor whose negation is the placement offset.
    pub anchor: Point,
    /// Whether `image` sits underneath the media.
    pub under: bool,
}

impl Overlay {
    /// Layer drawn over the media at its top-left corner.
    pub fn over(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
            anchor: Point::zero(),
            under: false,
        }
    }

    /// Canvas drawn under the media, which lands at `-anchor`.
    pub fn under(image: RgbaImage, anchor: Point) -> Self {
        Self {
            image: Arc::new(image),
            anchor,
            under: true,
        }
    }

    /// Offset at which the secondary image is drawn.
    pub fn offset(&self) -> Point {
        -self.anchor
    }

    /// Output canvas size for media of `base` size.
    pub fn output_size(&self, base: (u32, u32)) -> (u32, u32) {
        if self.under {
            self.image.dimensions()
        } else {
            base
        }
    }
}

/// Text renderer used for meme and caption layers.
///
/// Implementations must be pure: the same size and text always give the same pixels.
pub trait OverlayRenderer: Send + Sync {
    /// Top/bottom meme text over a `width`x`height` frame.
    fn meme(&self, width: u32, height: u32, top: &str, bottom: &str) -> MediaResult<Overlay>;

    /// Caption bar above a `width`x`height` frame.
    fn caption(&self, width: u32, height: u32, text: &str) -> MediaResult<Overlay>;
}
