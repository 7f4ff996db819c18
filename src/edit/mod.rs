//! Comma-separated edit directives and the ffmpeg job they compile to.

/// Planning and running an edit job.
pub mod apply;
/// Directive parsing.
pub mod args;

pub use apply::{DEFAULT_LENGTH_SECS, EditContext, InputType, apply_edits, plan_edit};
pub use args::{EditArgs, MusicResolver, PassthroughResolver, parse_edit_arguments, parse_timestamp};
