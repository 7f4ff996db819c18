//! Running the external tools.
//!
//! Every invocation (including metadata probes) holds a [`Throttle`](throttle::Throttle)
//! slot for its whole lifetime.

/// `ffprobe` metadata.
pub mod probe;
/// Spawning, descriptor passing and exit handling.
pub mod run;
/// Counting admission gate.
pub mod throttle;

pub use probe::{ProbeInfo, ProbeInput, StreamInfo};
pub use run::{RunOutput, Runner, tool_available};
pub use throttle::{Permit, Throttle};
