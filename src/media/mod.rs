//! Media-level jobs: text composites, GIF conversion and caption removal.
//!
//! Each job picks a path by [`MediaKind`](kind::MediaKind): still images stay in-process,
//! GIFs go through the frame pipeline, and everything with a time axis becomes one ffmpeg
//! invocation whose output is collected from stdout.

/// Meme and caption composites.
pub mod composite;
/// Shared collaborators and output helpers.
pub mod context;
/// Video to GIF conversion.
pub mod convert;
/// Media classification by extension.
pub mod kind;
/// Caption bar removal.
pub mod uncaption;

pub use composite::{TextLayer, composite_media, plan_overlay};
pub use context::{MediaContext, Rendered};
pub use convert::{plan_video_to_gif, video_to_gif};
pub use kind::MediaKind;
pub use uncaption::{plan_crop, plan_first_frame, uncaption};
