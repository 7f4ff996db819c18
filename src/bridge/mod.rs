//! Moving bytes between in-process producers, the external tool and the final destination.

/// Bounded in-memory collection with spill-to-disk.
pub mod output;
/// Image-to-pipe encoding and the in-process channel pipe.
pub mod pipe;
/// Attach-or-link delivery of finished files.
pub mod publish;

pub use output::{Collected, TempFile, collect_bounded};
pub use pipe::{ChannelReader, ChannelWriter, channel_pipe, spawn_png_writer};
pub use publish::{Delivery, Publisher};
