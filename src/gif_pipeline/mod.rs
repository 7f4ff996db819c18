//! In-process animated GIF re-encoder.
//!
//! Frames are decoded one at a time onto a full canvas, handed to a fixed pool of workers in
//! batches of at most `workers` frames, composed and quantized in parallel, then written back
//! in source order once the whole batch has returned.

/// Decode, batch dispatch, and ordered re-encode.
pub mod pipeline;
/// Per-frame palette quantization.
pub mod quantize;

pub use pipeline::{
    CropOp, FrameOp, GifStats, OverlayOp, composite_gif, process_gif, spawn_piped,
};
pub use quantize::{IndexedFrame, Quantizer};
