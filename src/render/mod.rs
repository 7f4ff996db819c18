//! In-process image composition and the text overlay contract.

/// Alpha-over composition of media and overlay layers.
pub mod composite;
/// Overlay layers and the renderer trait.
pub mod overlay;
/// Default SVG-based text renderer.
pub mod text;

pub use composite::{Drawable, caption_height, composite, composite_into, crop_into};
pub use overlay::{Overlay, OverlayRenderer};
pub use text::SvgTextRenderer;
