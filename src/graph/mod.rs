//! Builder for one external-tool invocation.
//!
//! Streams are stored in an arena owned by a [`Graph`](stream::Graph) and referenced by
//! integer handles. Nothing is validated while building; [`Graph::cmd`](stream::Graph::cmd)
//! walks every output, checks pad wiring and renders the `-filter_complex` argument.

/// Compilation of a graph into a [`Cmd`](compile::Cmd).
pub mod compile;
/// Job inputs and their per-input options.
pub mod input;
/// Stream nodes and builder operations.
pub mod stream;

pub use compile::{Cmd, FdInput, FdSource};
pub use input::{Input, InputSource};
pub use stream::{Graph, InputId, StreamId, StreamKind, Target};
