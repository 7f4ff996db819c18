#![forbid(unsafe_code)]

pub mod bridge;
pub mod config;
pub mod edit;
pub mod foundation;
pub mod gif_pipeline;
pub mod graph;
pub mod media;
pub mod process;
pub mod render;

pub use bridge::{Collected, Delivery, Publisher};
pub use config::Config;
pub use edit::{EditArgs, EditContext, InputType, apply_edits, parse_edit_arguments, plan_edit};
pub use foundation::core::{Point, Size};
pub use foundation::error::{MediaError, MediaResult};
pub use gif_pipeline::{CropOp, FrameOp, GifStats, OverlayOp, composite_gif, process_gif};
pub use graph::{Cmd, Graph, Input, StreamId, Target};
pub use media::{MediaContext, MediaKind, Rendered, TextLayer};
pub use process::{ProbeInfo, ProbeInput, Runner, Throttle};
pub use render::{Overlay, OverlayRenderer, SvgTextRenderer};
